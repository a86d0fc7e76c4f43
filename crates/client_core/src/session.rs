use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{SessionState, Suggestion, Task, WorkroomDetails, WorkroomId},
    error::{ControllerError, ControllerResult, NormalizedError},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    config::{Countdown, Settings},
    error_normalizer::{normalize_error, DEFAULT_FALLBACK},
    live_session::{GoLiveOutcome, LiveAnnouncer, LiveSessionCoordinator, LiveSessionEvent},
    remote::RemoteDataClient,
    session_cache::SessionCache,
};

#[async_trait]
impl LiveAnnouncer for RemoteDataClient {
    async fn announce_live(&self, workroom_id: &WorkroomId) -> ControllerResult<()> {
        RemoteDataClient::announce_live(self, workroom_id).await
    }
}

/// One logical session context: a cache and a go-live coordinator that are
/// never shared with another session.
pub struct WorkroomSession {
    client: Arc<RemoteDataClient>,
    cache: Arc<SessionCache>,
    coordinator: Arc<LiveSessionCoordinator>,
    task_page_size: u32,
    /// Serializes workroom switches against go-live triggers.
    switch: Mutex<()>,
}

impl WorkroomSession {
    pub fn new(client: Arc<RemoteDataClient>, settings: &Settings) -> Self {
        let announcer: Arc<dyn LiveAnnouncer> = client.clone();
        Self::from_parts(
            client,
            settings.countdown(),
            settings.task_page_size,
            announcer,
        )
    }

    pub fn with_announcer(
        client: Arc<RemoteDataClient>,
        countdown: Countdown,
        task_page_size: u32,
        announcer: Arc<dyn LiveAnnouncer>,
    ) -> Self {
        Self::from_parts(client, countdown, task_page_size, announcer)
    }

    fn from_parts(
        client: Arc<RemoteDataClient>,
        countdown: Countdown,
        task_page_size: u32,
        announcer: Arc<dyn LiveAnnouncer>,
    ) -> Self {
        Self {
            client,
            cache: Arc::new(SessionCache::new()),
            coordinator: LiveSessionCoordinator::new(countdown, announcer),
            task_page_size,
            switch: Mutex::new(()),
        }
    }

    /// Makes `workroom_id` the active workroom. Switching ids drops the previous
    /// workroom's cached data, orphans its in-flight fetches and returns the
    /// go-live state to `Idle`, cancelling a pending countdown. Returns whether
    /// the id changed.
    pub async fn open(&self, workroom_id: WorkroomId) -> ControllerResult<bool> {
        if workroom_id.is_blank() {
            return Err(ControllerError::MissingWorkroom);
        }
        let _switch = self.switch.lock().await;
        if self.cache.active_workroom().await.as_ref() == Some(&workroom_id) {
            return Ok(false);
        }

        let previous = self.coordinator.reset().await;
        if previous == SessionState::CountingDown {
            warn!(
                workroom_id = %workroom_id,
                "session: pending go-live cancelled by workroom switch"
            );
        }
        let changed = self.cache.activate(workroom_id.clone()).await;
        info!(workroom_id = %workroom_id, "session: workroom opened");
        Ok(changed)
    }

    pub async fn active_workroom(&self) -> Option<WorkroomId> {
        self.cache.active_workroom().await
    }

    /// The fetched value is always returned; it only reaches the cache if no
    /// newer fetch or workroom switch overtook it.
    pub async fn refresh_details(&self) -> ControllerResult<Arc<WorkroomDetails>> {
        let ticket = self
            .cache
            .begin_fetch()
            .await
            .ok_or(ControllerError::MissingWorkroom)?;
        let details = Arc::new(
            self.client
                .fetch_workroom_details(&ticket.workroom_id, self.client.base_url())
                .await?,
        );
        self.cache.store_details(&ticket, Arc::clone(&details)).await;
        Ok(details)
    }

    /// On failure the cached task list is reset to empty before the error is
    /// returned.
    pub async fn refresh_tasks(&self) -> ControllerResult<Arc<[Task]>> {
        let ticket = self
            .cache
            .begin_fetch()
            .await
            .ok_or(ControllerError::MissingWorkroom)?;
        match self.client.fetch_tasks(self.task_page_size).await {
            Ok(tasks) => {
                let tasks: Arc<[Task]> = Arc::from(tasks);
                self.cache.store_tasks(&ticket, Arc::clone(&tasks)).await;
                Ok(tasks)
            }
            Err(err) => {
                self.cache.reset_tasks(&ticket).await;
                Err(err)
            }
        }
    }

    /// Explicit refresh: clears the cache, then refetches details and tasks.
    pub async fn refresh(&self) -> ControllerResult<()> {
        self.cache.invalidate().await;
        let (details, tasks) = tokio::join!(self.refresh_details(), self.refresh_tasks());
        details?;
        tasks?;
        Ok(())
    }

    pub async fn suggestions<S: AsRef<str>>(
        &self,
        seed_terms: &[S],
        endpoint: &str,
    ) -> ControllerResult<Vec<Suggestion>> {
        self.client.fetch_suggestions(seed_terms, endpoint).await
    }

    pub async fn details(&self) -> Option<Arc<WorkroomDetails>> {
        self.cache.details().await
    }

    pub async fn tasks(&self) -> Arc<[Task]> {
        self.cache.tasks().await
    }

    /// Starts the countdown for the workroom open right now; that id is the one
    /// announced even if it completes later.
    pub async fn trigger_go_live(&self) -> ControllerResult<GoLiveOutcome> {
        let _switch = self.switch.lock().await;
        let workroom_id = self
            .cache
            .active_workroom()
            .await
            .ok_or(ControllerError::MissingWorkroom)?;
        Ok(self.coordinator.trigger_go_live(workroom_id).await)
    }

    pub async fn cancel_go_live(&self) -> bool {
        self.coordinator.cancel_go_live().await
    }

    pub async fn live_state(&self) -> SessionState {
        self.coordinator.state().await
    }

    pub fn subscribe_live(&self) -> broadcast::Receiver<LiveSessionEvent> {
        self.coordinator.subscribe()
    }

    pub fn normalize(&self, err: &ControllerError) -> NormalizedError {
        normalize_error(err, DEFAULT_FALLBACK)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
