use std::sync::Arc;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use shared::{
    domain::{Suggestion, SuggestionPayload, Task, TaskListPayload, WorkroomDetails, WorkroomId},
    error::{ControllerError, ControllerResult},
};
use tracing::{info, warn};
use url::Url;

use crate::{
    auth::{AuthTokenProvider, BearerToken},
    config::Settings,
};

pub const DEFAULT_TASK_PAGE_SIZE: u32 = 1000;
pub const SUGGESTION_QUERY_KEY: &str = "query";
const BODY_EXCERPT_LIMIT: usize = 2048;
const USER_AGENT: &str = concat!("workroom-client/", env!("CARGO_PKG_VERSION"));

pub struct RemoteDataClient {
    http: Client,
    base_url: Option<String>,
    tokens: Arc<dyn AuthTokenProvider>,
}

impl RemoteDataClient {
    pub fn new(base_url: Option<String>, tokens: Arc<dyn AuthTokenProvider>) -> Self {
        Self::with_http_client(Client::new(), base_url, tokens)
    }

    pub fn with_http_client(
        http: Client,
        base_url: Option<String>,
        tokens: Arc<dyn AuthTokenProvider>,
    ) -> Self {
        Self {
            http,
            base_url,
            tokens,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        tokens: Arc<dyn AuthTokenProvider>,
    ) -> ControllerResult<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| {
                ControllerError::Transport(format!("failed to initialize HTTP client: {err}"))
            })?;
        Ok(Self::with_http_client(
            http,
            settings.base_url.clone(),
            tokens,
        ))
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn bearer(&self) -> ControllerResult<BearerToken> {
        self.tokens.token().ok_or(ControllerError::Unauthenticated)
    }

    /// `GET {base}/api/v1/workrooms/{id}`. Every precondition is checked before
    /// the request is sent.
    pub async fn fetch_workroom_details(
        &self,
        workroom_id: &WorkroomId,
        base_url: Option<&str>,
    ) -> ControllerResult<WorkroomDetails> {
        if workroom_id.is_blank() {
            return Err(ControllerError::MissingWorkroom);
        }
        let url = workroom_url(base_url, workroom_id)?;
        let token = self.bearer()?;

        let details: WorkroomDetails = self
            .get_json(url, &token, "fetch_workroom_details")
            .await?;
        info!(
            workroom_id = %workroom_id,
            tasks = details.tasks.len(),
            members = details.members.len(),
            "workroom: details fetched"
        );
        Ok(details)
    }

    pub async fn fetch_tasks(&self, page_size: u32) -> ControllerResult<Vec<Task>> {
        self.fetch_tasks_page(1, page_size).await
    }

    /// `GET {base}/api/v1/tasks?page=&page_size=`; pages are 1-based.
    pub async fn fetch_tasks_page(&self, page: u32, page_size: u32) -> ControllerResult<Vec<Task>> {
        if page == 0 || page_size == 0 {
            return Err(ControllerError::InvalidInput(format!(
                "page and page_size must be positive (page={page}, page_size={page_size})"
            )));
        }
        let url = tasks_url(self.base_url(), page, page_size)?;
        let token = self.bearer()?;

        let payload: TaskListPayload = self.get_json(url, &token, "fetch_tasks").await?;
        let tasks = payload.into_tasks();
        info!(page, page_size, tasks = tasks.len(), "workroom: tasks fetched");
        Ok(tasks)
    }

    /// Replaces `tasks` wholesale on success. On failure `tasks` is left empty
    /// and the error is returned.
    pub async fn refresh_tasks(
        &self,
        tasks: &mut Vec<Task>,
        page_size: u32,
    ) -> ControllerResult<usize> {
        match self.fetch_tasks(page_size).await {
            Ok(fetched) => {
                *tasks = fetched;
                Ok(tasks.len())
            }
            Err(err) => {
                tasks.clear();
                Err(err)
            }
        }
    }

    pub async fn fetch_suggestions<S: AsRef<str>>(
        &self,
        seed_terms: &[S],
        endpoint: &str,
    ) -> ControllerResult<Vec<Suggestion>> {
        let url = suggestions_url(self.base_url(), endpoint, seed_terms)?;
        let token = self.bearer()?;

        let payload: Vec<SuggestionPayload> =
            self.get_json(url, &token, "fetch_suggestions").await?;
        Ok(payload.into_iter().map(Suggestion::from).collect())
    }

    /// `POST {base}/api/v1/workrooms/{id}/live`.
    pub async fn announce_live(&self, workroom_id: &WorkroomId) -> ControllerResult<()> {
        if workroom_id.is_blank() {
            return Err(ControllerError::MissingWorkroom);
        }
        let mut url = workroom_url(self.base_url(), workroom_id)?;
        push_segments(&mut url, ["live"])?;
        let token = self.bearer()?;

        let response = self
            .http
            .post(url.clone())
            .bearer_auth(token.expose())
            .json(&json!({ "live": true }))
            .send()
            .await
            .map_err(|err| transport_error("announce_live", &url, err))?;
        ensure_success(response, &url, "announce_live").await?;
        info!(workroom_id = %workroom_id, "workroom: live status announced");
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &BearerToken,
        operation: &'static str,
    ) -> ControllerResult<T> {
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|err| transport_error(operation, &url, err))?;
        let body = ensure_success(response, &url, operation).await?;
        serde_json::from_str(&body).map_err(|err| {
            warn!(operation, %url, %err, "remote: response did not decode");
            ControllerError::DecodeFailure(format!("{operation}: {err}"))
        })
    }
}

fn transport_error(operation: &'static str, url: &Url, err: reqwest::Error) -> ControllerError {
    warn!(operation, %url, %err, "remote: request could not be sent");
    ControllerError::Transport(format!("{operation}: {err}"))
}

/// Returns the body on 2xx; otherwise logs and returns `RemoteFailure` with a
/// body excerpt for diagnostics.
async fn ensure_success(
    response: Response,
    url: &Url,
    operation: &'static str,
) -> ControllerResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| transport_error(operation, url, err))?;

    if !status.is_success() {
        let excerpt = truncate_for_error(&body);
        warn!(
            operation,
            %url,
            status = status.as_u16(),
            body = %excerpt,
            "remote: request failed"
        );
        return Err(ControllerError::RemoteFailure {
            status: status.as_u16(),
            body: excerpt,
        });
    }
    Ok(body)
}

fn truncate_for_error(body: &str) -> String {
    if body.chars().count() <= BODY_EXCERPT_LIMIT {
        body.to_owned()
    } else {
        format!(
            "{}...",
            body.chars().take(BODY_EXCERPT_LIMIT).collect::<String>()
        )
    }
}

fn parse_base_url(base_url: Option<&str>) -> ControllerResult<Url> {
    let raw = base_url
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ControllerError::MissingConfig("backend base URL is not set".into()))?;
    let url = Url::parse(raw).map_err(|err| {
        ControllerError::MissingConfig(format!("invalid backend base URL '{raw}': {err}"))
    })?;
    if url.cannot_be_a_base() {
        return Err(ControllerError::MissingConfig(format!(
            "backend base URL '{raw}' cannot carry a path"
        )));
    }
    Ok(url)
}

fn push_segments<I>(url: &mut Url, segments: I) -> ControllerResult<()>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut path = url.path_segments_mut().map_err(|()| {
        ControllerError::MissingConfig("backend base URL cannot carry a path".into())
    })?;
    path.pop_if_empty().extend(segments);
    Ok(())
}

pub fn workroom_url(base_url: Option<&str>, workroom_id: &WorkroomId) -> ControllerResult<Url> {
    let mut url = parse_base_url(base_url)?;
    push_segments(&mut url, ["api", "v1", "workrooms", workroom_id.as_str()])?;
    Ok(url)
}

pub fn tasks_url(base_url: Option<&str>, page: u32, page_size: u32) -> ControllerResult<Url> {
    let mut url = parse_base_url(base_url)?;
    push_segments(&mut url, ["api", "v1", "tasks"])?;
    url.query_pairs_mut()
        .append_pair("page", &page.to_string())
        .append_pair("page_size", &page_size.to_string());
    Ok(url)
}

/// Every seed term is appended under the same `query` key, keeping order and
/// duplicates.
pub fn suggestions_url<S: AsRef<str>>(
    base_url: Option<&str>,
    endpoint: &str,
    seed_terms: &[S],
) -> ControllerResult<Url> {
    let endpoint = endpoint.trim().trim_matches('/');
    if endpoint.is_empty() {
        return Err(ControllerError::InvalidInput(
            "suggestion endpoint must not be empty".into(),
        ));
    }
    if seed_terms.is_empty() {
        return Err(ControllerError::InvalidInput(
            "at least one seed term is required".into(),
        ));
    }

    let mut url = parse_base_url(base_url)?;
    push_segments(&mut url, endpoint.split('/').filter(|segment| !segment.is_empty()))?;
    {
        let mut query = url.query_pairs_mut();
        for term in seed_terms {
            query.append_pair(SUGGESTION_QUERY_KEY, term.as_ref());
        }
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
