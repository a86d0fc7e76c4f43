use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

use crate::{auth::DEFAULT_TOKEN_KEY, remote::DEFAULT_TASK_PAGE_SIZE};

pub const DEFAULT_CONFIG_PATH: &str = "workroom.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: Option<String>,
    pub token_key: String,
    pub token_file: Option<PathBuf>,
    pub countdown_seconds: u64,
    pub task_page_size: u32,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: None,
            token_key: DEFAULT_TOKEN_KEY.into(),
            token_file: None,
            countdown_seconds: 3,
            task_page_size: DEFAULT_TASK_PAGE_SIZE,
            request_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// One tick per second of countdown.
    pub fn countdown(&self) -> Countdown {
        Countdown {
            ticks: self.countdown_seconds.min(u64::from(u32::MAX)) as u32,
            tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub ticks: u32,
    pub tick: Duration,
}

impl Default for Countdown {
    fn default() -> Self {
        Settings::default().countdown()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    base_url: Option<String>,
    token_key: Option<String>,
    token_file: Option<PathBuf>,
    countdown_seconds: Option<u64>,
    task_page_size: Option<u32>,
    request_timeout_secs: Option<u64>,
}

/// Defaults, then the TOML file (if present), then process environment.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let explicit = path.is_some();
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    match fs::read_to_string(path) {
        Ok(raw) => {
            apply_file_settings(&mut settings, &raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
        }
        Err(err) if explicit => {
            return Err(err)
                .with_context(|| format!("failed to read config file {}", path.display()));
        }
        Err(_) => {}
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file_settings(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.base_url {
        settings.base_url = Some(v);
    }
    if let Some(v) = file_cfg.token_key {
        settings.token_key = v;
    }
    if let Some(v) = file_cfg.token_file {
        settings.token_file = Some(v);
    }
    if let Some(v) = file_cfg.countdown_seconds {
        settings.countdown_seconds = v;
    }
    if let Some(v) = file_cfg.task_page_size {
        settings.task_page_size = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    Ok(())
}

pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("WORKROOM_BASE_URL") {
        settings.base_url = Some(v);
    }
    if let Some(v) = lookup("APP__BASE_URL") {
        settings.base_url = Some(v);
    }

    if let Some(v) = lookup("WORKROOM_TOKEN_KEY") {
        settings.token_key = v;
    }
    if let Some(v) = lookup("WORKROOM_TOKEN_FILE") {
        settings.token_file = Some(PathBuf::from(v));
    }

    if let Some(v) = lookup("APP__COUNTDOWN_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.countdown_seconds = parsed;
        }
    }
    if let Some(v) = lookup("APP__TASK_PAGE_SIZE") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.task_page_size = parsed;
        }
    }
    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
