use std::sync::Arc;

use shared::domain::{Task, WorkroomDetails, WorkroomId};
use tokio::sync::RwLock;
use tracing::debug;

/// Tag attached to a fetch when it is dispatched. A response is only written
/// back if its ticket is still current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub workroom_id: WorkroomId,
    epoch: u64,
    seq: u64,
}

struct CacheState {
    active: Option<WorkroomId>,
    epoch: u64,
    next_seq: u64,
    details_seq: u64,
    tasks_seq: u64,
    details: Option<Arc<WorkroomDetails>>,
    tasks: Arc<[Task]>,
}

impl Default for CacheState {
    fn default() -> Self {
        Self {
            active: None,
            epoch: 0,
            next_seq: 0,
            details_seq: 0,
            tasks_seq: 0,
            details: None,
            tasks: Arc::from(Vec::new()),
        }
    }
}

impl CacheState {
    fn clear(&mut self) {
        self.epoch += 1;
        self.details_seq = 0;
        self.tasks_seq = 0;
        self.details = None;
        self.tasks = Arc::from(Vec::new());
    }

    fn accepts(&self, ticket: &FetchTicket, last_applied: u64) -> bool {
        self.active.as_ref() == Some(&ticket.workroom_id)
            && ticket.epoch == self.epoch
            && ticket.seq > last_applied
    }
}

#[derive(Default)]
pub struct SessionCache {
    inner: RwLock<CacheState>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switching to a different id drops everything cached for the old one and
    /// orphans its in-flight tickets. Returns whether the id changed.
    pub async fn activate(&self, workroom_id: WorkroomId) -> bool {
        let mut guard = self.inner.write().await;
        if guard.active.as_ref() == Some(&workroom_id) {
            return false;
        }
        debug!(
            previous = ?guard.active,
            next = %workroom_id,
            "cache: active workroom changed"
        );
        guard.clear();
        guard.active = Some(workroom_id);
        true
    }

    pub async fn invalidate(&self) {
        let mut guard = self.inner.write().await;
        guard.clear();
    }

    pub async fn active_workroom(&self) -> Option<WorkroomId> {
        self.inner.read().await.active.clone()
    }

    pub async fn begin_fetch(&self) -> Option<FetchTicket> {
        let mut guard = self.inner.write().await;
        let workroom_id = guard.active.clone()?;
        guard.next_seq += 1;
        Some(FetchTicket {
            workroom_id,
            epoch: guard.epoch,
            seq: guard.next_seq,
        })
    }

    pub async fn store_details(
        &self,
        ticket: &FetchTicket,
        details: impl Into<Arc<WorkroomDetails>>,
    ) -> bool {
        let mut guard = self.inner.write().await;
        if !guard.accepts(ticket, guard.details_seq) {
            debug!(
                workroom_id = %ticket.workroom_id,
                seq = ticket.seq,
                "cache: stale details discarded"
            );
            return false;
        }
        guard.details_seq = ticket.seq;
        guard.details = Some(details.into());
        true
    }

    pub async fn store_tasks(
        &self,
        ticket: &FetchTicket,
        tasks: impl Into<Arc<[Task]>>,
    ) -> bool {
        let mut guard = self.inner.write().await;
        if !guard.accepts(ticket, guard.tasks_seq) {
            debug!(
                workroom_id = %ticket.workroom_id,
                seq = ticket.seq,
                "cache: stale tasks discarded"
            );
            return false;
        }
        guard.tasks_seq = ticket.seq;
        guard.tasks = tasks.into();
        true
    }

    /// Failed task refresh: the cached list becomes empty rather than stale.
    pub async fn reset_tasks(&self, ticket: &FetchTicket) -> bool {
        self.store_tasks(ticket, Vec::<Task>::new()).await
    }

    pub async fn details(&self) -> Option<Arc<WorkroomDetails>> {
        self.inner.read().await.details.clone()
    }

    pub async fn tasks(&self) -> Arc<[Task]> {
        self.inner.read().await.tasks.clone()
    }
}

#[cfg(test)]
#[path = "tests/session_cache_tests.rs"]
mod tests;
