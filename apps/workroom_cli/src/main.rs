use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, normalize_error, AuthTokenProvider, FileTokenStore, LiveSessionEvent,
    MemoryTokenStore, MissingTokenProvider, NoopAnnouncer, RemoteDataClient, Settings,
    StoredTokenProvider, WorkroomSession, DEFAULT_FALLBACK,
};
use shared::{
    domain::{SessionState, WorkroomId},
    error::ControllerError,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "workroom", about = "Inspect workrooms and run the go-live countdown")]
struct Args {
    /// Settings file; `workroom.toml` is read when present and this is omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Bearer token to use instead of the configured token store.
    #[arg(long, global = true)]
    token: Option<String>,
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one workroom's details.
    Details { workroom: String },
    /// Fetch a page of tasks.
    Tasks {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Ask a suggestion endpoint for completions of the given terms.
    Suggest {
        #[arg(long)]
        endpoint: String,
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Count down and take a workroom live. Ctrl-C cancels the countdown.
    GoLive {
        workroom: String,
        /// Go live locally without notifying the backend.
        #[arg(long)]
        no_announce: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref()).context("loading settings")?;
    if let Some(base_url) = &args.base_url {
        settings.base_url = Some(base_url.clone());
    }
    if let Some(token_file) = &args.token_file {
        settings.token_file = Some(token_file.clone());
    }

    let tokens = token_provider(args.token.as_deref(), &settings);
    let client = Arc::new(RemoteDataClient::from_settings(&settings, tokens)?);

    if let Err(err) = run(args.command, client, &settings).await {
        match err.downcast_ref::<ControllerError>() {
            Some(controller_err) => {
                tracing::debug!(error = %controller_err, "cli: command failed");
                let normalized = normalize_error(controller_err, DEFAULT_FALLBACK);
                eprintln!("error: {}", normalized.message);
            }
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
    Ok(())
}

fn token_provider(token: Option<&str>, settings: &Settings) -> Arc<dyn AuthTokenProvider> {
    if let Some(token) = token {
        let store = MemoryTokenStore::with_entry(settings.token_key.clone(), token);
        return Arc::new(StoredTokenProvider::with_key(
            Arc::new(store),
            settings.token_key.clone(),
        ));
    }
    match &settings.token_file {
        Some(path) => Arc::new(StoredTokenProvider::with_key(
            Arc::new(FileTokenStore::new(path.clone())),
            settings.token_key.clone(),
        )),
        None => Arc::new(MissingTokenProvider),
    }
}

async fn run(command: Command, client: Arc<RemoteDataClient>, settings: &Settings) -> Result<()> {
    match command {
        Command::Details { workroom } => {
            let session = WorkroomSession::new(client, settings);
            session.open(WorkroomId::from(workroom)).await?;
            let details = session.refresh_details().await?;
            println!("{}", serde_json::to_string_pretty(&*details)?);
        }
        Command::Tasks { page, page_size } => {
            let page_size = page_size.unwrap_or(settings.task_page_size);
            let tasks = client.fetch_tasks_page(page, page_size).await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        Command::Suggest { endpoint, terms } => {
            let suggestions = client.fetch_suggestions(&terms, &endpoint).await?;
            println!("{}", serde_json::to_string_pretty(&suggestions)?);
        }
        Command::GoLive {
            workroom,
            no_announce,
        } => {
            let session = if no_announce {
                WorkroomSession::with_announcer(
                    client,
                    settings.countdown(),
                    settings.task_page_size,
                    Arc::new(NoopAnnouncer),
                )
            } else {
                WorkroomSession::new(client, settings)
            };
            session.open(WorkroomId::from(workroom)).await?;
            go_live(&session).await?;
        }
    }
    Ok(())
}

async fn go_live(session: &WorkroomSession) -> Result<()> {
    let mut events = session.subscribe_live();
    let outcome = session.trigger_go_live().await?;
    tracing::info!(?outcome, "cli: go-live requested");

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                if session.cancel_go_live().await {
                    eprintln!("countdown cancelled");
                    return Ok(());
                }
                continue;
            }
        };
        match event {
            Ok(LiveSessionEvent::Tick { remaining }) => eprintln!("going live in {remaining}"),
            Ok(LiveSessionEvent::StateChanged(SessionState::Live)) => println!("live"),
            Ok(LiveSessionEvent::StateChanged(_)) => {}
            Ok(LiveSessionEvent::Announced) => return Ok(()),
            Ok(LiveSessionEvent::AnnounceFailed(normalized)) => {
                eprintln!("live locally, but the announcement failed: {}", normalized.message);
                return Ok(());
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "cli: missed live session events");
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}
