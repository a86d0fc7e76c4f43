//! Single-flight go-live state machine: `Idle -> CountingDown -> Live`.
//!
//! The read-then-mark step on leaving `Idle` happens under one lock, so at most
//! one countdown exists no matter how many triggers race. Triggers that arrive
//! while a countdown is running (or after going live) are dropped. Each
//! countdown is bound to the workroom it was triggered for, and that id is the
//! one announced.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{SessionState, WorkroomId},
    error::{ControllerResult, NormalizedError},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{config::Countdown, error_normalizer::normalize_error};

const ANNOUNCE_FALLBACK: &str = "Could not announce that the workroom is live.";

#[async_trait]
pub trait LiveAnnouncer: Send + Sync {
    async fn announce_live(&self, workroom_id: &WorkroomId) -> ControllerResult<()>;
}

pub struct NoopAnnouncer;

#[async_trait]
impl LiveAnnouncer for NoopAnnouncer {
    async fn announce_live(&self, _workroom_id: &WorkroomId) -> ControllerResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveSessionEvent {
    StateChanged(SessionState),
    Tick { remaining: u32 },
    Announced,
    AnnounceFailed(NormalizedError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoLiveOutcome {
    Started,
    /// Dropped because the coordinator was not idle.
    Ignored(SessionState),
}

struct CoordinatorState {
    state: SessionState,
    epoch: u64,
    countdown_task: Option<JoinHandle<()>>,
}

pub struct LiveSessionCoordinator {
    countdown: Countdown,
    announcer: Arc<dyn LiveAnnouncer>,
    inner: Mutex<CoordinatorState>,
    events: broadcast::Sender<LiveSessionEvent>,
}

impl LiveSessionCoordinator {
    pub fn new(countdown: Countdown, announcer: Arc<dyn LiveAnnouncer>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            countdown,
            announcer,
            inner: Mutex::new(CoordinatorState {
                state: SessionState::Idle,
                epoch: 0,
                countdown_task: None,
            }),
            events,
        })
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveSessionEvent> {
        self.events.subscribe()
    }

    pub async fn trigger_go_live(self: &Arc<Self>, workroom_id: WorkroomId) -> GoLiveOutcome {
        let mut guard = self.inner.lock().await;
        if guard.state != SessionState::Idle {
            debug!(
                state = %guard.state,
                workroom_id = %workroom_id,
                "live: go-live trigger ignored"
            );
            return GoLiveOutcome::Ignored(guard.state);
        }

        guard.state = SessionState::CountingDown;
        guard.epoch += 1;
        let epoch = guard.epoch;
        let _ = self
            .events
            .send(LiveSessionEvent::StateChanged(SessionState::CountingDown));

        let coordinator = Arc::clone(self);
        info!(
            epoch,
            workroom_id = %workroom_id,
            ticks = self.countdown.ticks,
            "live: countdown started"
        );
        guard.countdown_task = Some(tokio::spawn(async move {
            coordinator.run_countdown(epoch, workroom_id).await;
        }));
        GoLiveOutcome::Started
    }

    /// Only meaningful while counting down; returns whether anything was cancelled.
    pub async fn cancel_go_live(&self) -> bool {
        let mut guard = self.inner.lock().await;
        if guard.state != SessionState::CountingDown {
            debug!(state = %guard.state, "live: cancel ignored");
            return false;
        }

        if let Some(task) = guard.countdown_task.take() {
            task.abort();
        }
        guard.state = SessionState::Idle;
        guard.epoch += 1;
        let _ = self
            .events
            .send(LiveSessionEvent::StateChanged(SessionState::Idle));
        info!("live: countdown cancelled");
        true
    }

    /// Returns to `Idle` from any state, dropping a pending countdown. Used when
    /// the coordinator is handed to a different workroom. Returns the state that
    /// was left.
    pub async fn reset(&self) -> SessionState {
        let mut guard = self.inner.lock().await;
        let previous = guard.state;
        if let Some(task) = guard.countdown_task.take() {
            task.abort();
        }
        guard.epoch += 1;
        if previous != SessionState::Idle {
            guard.state = SessionState::Idle;
            let _ = self
                .events
                .send(LiveSessionEvent::StateChanged(SessionState::Idle));
            info!(previous = %previous, "live: state reset");
        }
        previous
    }

    async fn run_countdown(&self, epoch: u64, workroom_id: WorkroomId) {
        for remaining in (1..=self.countdown.ticks).rev() {
            let _ = self.events.send(LiveSessionEvent::Tick { remaining });
            tokio::time::sleep(self.countdown.tick).await;
        }
        self.finish_countdown(epoch, &workroom_id).await;
    }

    async fn finish_countdown(&self, epoch: u64, workroom_id: &WorkroomId) {
        {
            let mut guard = self.inner.lock().await;
            if guard.epoch != epoch || guard.state != SessionState::CountingDown {
                return;
            }
            guard.state = SessionState::Live;
            guard.countdown_task = None;
            let _ = self
                .events
                .send(LiveSessionEvent::StateChanged(SessionState::Live));
        }
        info!(epoch, workroom_id = %workroom_id, "live: workroom is live");

        match self.announcer.announce_live(workroom_id).await {
            Ok(()) => {
                let _ = self.events.send(LiveSessionEvent::Announced);
            }
            Err(err) => {
                warn!(
                    %err,
                    workroom_id = %workroom_id,
                    "live: announcement failed; staying live locally"
                );
                let _ = self.events.send(LiveSessionEvent::AnnounceFailed(normalize_error(
                    &err,
                    ANNOUNCE_FALLBACK,
                )));
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/live_session_tests.rs"]
mod tests;
