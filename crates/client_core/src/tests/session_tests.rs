use super::*;
use crate::{
    auth::{AuthTokenProvider, MemoryTokenStore, StoredTokenProvider},
    live_session::NoopAnnouncer,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use shared::error::ErrorKind;
use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Backend {
    fail_tasks: Arc<AtomicBool>,
    announcements: Arc<tokio::sync::Mutex<Vec<String>>>,
    task_calls: Arc<AtomicUsize>,
}

fn workroom_body(id: &str, name: &str) -> String {
    format!(
        r#"{{"id":"{id}","name":"{name}","created_by":7,"tasks":[{{"id":1,"title":"Plan"}}],"members":[{{"id":3,"email":"m@x.test","xp":40}}],"metrics":[],"performance_metrics":[{{"kpi_name":"focus","metric_value":8,"weight":2.5}}]}}"#
    )
}

async fn workroom(Path(id): Path<String>) -> (StatusCode, String) {
    match id.as_str() {
        "slow-room" => {
            tokio::time::sleep(Duration::from_millis(300)).await;
            (StatusCode::OK, workroom_body("slow-room", "Slow"))
        }
        "room-42" => (StatusCode::OK, workroom_body("room-42", "Sprint")),
        _ => (
            StatusCode::NOT_FOUND,
            r#"{"message":"Workroom not found"}"#.to_string(),
        ),
    }
}

async fn tasks(State(backend): State<Backend>) -> (StatusCode, String) {
    backend.task_calls.fetch_add(1, Ordering::SeqCst);
    if backend.fail_tasks.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"error":"tasks temporarily unavailable"}"#.to_string(),
        );
    }
    (
        StatusCode::OK,
        r#"{"count":2,"results":[{"id":1,"title":"Plan"},{"id":2,"title":"Build"}]}"#.to_string(),
    )
}

async fn live(State(backend): State<Backend>, Path(id): Path<String>) -> StatusCode {
    backend.announcements.lock().await.push(id);
    StatusCode::NO_CONTENT
}

async fn spawn_backend() -> (String, Backend) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let backend = Backend::default();
    let app = Router::new()
        .route("/api/v1/workrooms/:id", get(workroom))
        .route("/api/v1/workrooms/:id/live", post(live))
        .route("/api/v1/tasks", get(tasks))
        .with_state(backend.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), backend)
}

fn client_for(base_url: &str) -> Arc<RemoteDataClient> {
    let tokens: Arc<dyn AuthTokenProvider> = Arc::new(StoredTokenProvider::new(Arc::new(
        MemoryTokenStore::with_entry("token", "session-token"),
    )));
    Arc::new(RemoteDataClient::new(Some(base_url.to_string()), tokens))
}

#[derive(Default)]
struct RecordingAnnouncer {
    announced: std::sync::Mutex<Vec<WorkroomId>>,
}

impl RecordingAnnouncer {
    fn announced(&self) -> Vec<WorkroomId> {
        self.announced.lock().expect("announced").clone()
    }
}

#[async_trait]
impl LiveAnnouncer for RecordingAnnouncer {
    async fn announce_live(&self, workroom_id: &WorkroomId) -> ControllerResult<()> {
        self.announced
            .lock()
            .expect("announced")
            .push(workroom_id.clone());
        Ok(())
    }
}

fn recorded_session(announcer: Arc<RecordingAnnouncer>) -> WorkroomSession {
    WorkroomSession::with_announcer(
        client_for("http://127.0.0.1:9"),
        Countdown {
            ticks: 3,
            tick: Duration::from_secs(1),
        },
        10,
        announcer,
    )
}

fn fast_settings(base_url: &str) -> Settings {
    Settings {
        base_url: Some(base_url.to_string()),
        countdown_seconds: 0,
        ..Settings::default()
    }
}

#[tokio::test]
async fn operations_require_an_open_workroom() {
    let session = WorkroomSession::with_announcer(
        client_for("http://127.0.0.1:9"),
        Countdown::default(),
        10,
        Arc::new(NoopAnnouncer),
    );
    let err = session.refresh_details().await.expect_err("no workroom");
    assert_eq!(err.kind(), ErrorKind::MissingWorkroom);
    let err = session.trigger_go_live().await.expect_err("no workroom");
    assert_eq!(err.kind(), ErrorKind::MissingWorkroom);
    let err = session
        .open(WorkroomId::from(" "))
        .await
        .expect_err("blank id");
    assert_eq!(err.kind(), ErrorKind::MissingWorkroom);
}

#[tokio::test]
async fn refresh_populates_cache_with_passthrough_metrics() {
    let (base_url, _backend) = spawn_backend().await;
    let session = WorkroomSession::new(client_for(&base_url), &fast_settings(&base_url));

    assert!(session.open(WorkroomId::from("room-42")).await.expect("open"));
    session.refresh().await.expect("refresh");

    let details = session.details().await.expect("cached details");
    assert_eq!(details.name, "Sprint");
    assert_eq!(details.created_by.as_deref(), Some("7"));
    assert_eq!(details.task_count(), 1);
    assert_eq!(details.member_count(), 1);
    assert_eq!(details.performance_metrics[0].weight, 2.5);
    assert_eq!(details.performance_metrics[0].metric_value, 8.0);
    assert_eq!(session.tasks().await.len(), 2);
}

#[tokio::test]
async fn failed_task_refresh_empties_cached_tasks() {
    let (base_url, backend) = spawn_backend().await;
    let session = WorkroomSession::new(client_for(&base_url), &fast_settings(&base_url));
    session.open(WorkroomId::from("room-42")).await.expect("open");

    session.refresh_tasks().await.expect("tasks");
    assert_eq!(session.tasks().await.len(), 2);

    backend.fail_tasks.store(true, Ordering::SeqCst);
    let err = session.refresh_tasks().await.expect_err("tasks fail");
    assert_eq!(err.status(), Some(503));
    assert!(session.tasks().await.is_empty());
    assert_eq!(
        session.normalize(&err).message,
        "tasks temporarily unavailable"
    );
    assert_eq!(backend.task_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn slow_response_for_abandoned_workroom_is_discarded() {
    let (base_url, _backend) = spawn_backend().await;
    let session = Arc::new(WorkroomSession::new(
        client_for(&base_url),
        &fast_settings(&base_url),
    ));

    session.open(WorkroomId::from("slow-room")).await.expect("open");
    let in_flight = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.refresh_details().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    session.open(WorkroomId::from("room-42")).await.expect("switch");
    let fresh = session.refresh_details().await.expect("fresh");
    assert_eq!(fresh.name, "Sprint");

    let late = in_flight.await.expect("join").expect("slow details");
    assert_eq!(late.name, "Slow", "caller still receives its own result");

    let cached = session.details().await.expect("cached");
    assert_eq!(cached.id, WorkroomId::from("room-42"));
}

#[tokio::test]
async fn remote_failure_leaves_previous_details_and_normalizes() {
    let (base_url, _backend) = spawn_backend().await;
    let session = WorkroomSession::new(client_for(&base_url), &fast_settings(&base_url));
    session.open(WorkroomId::from("room-404")).await.expect("open");

    let err = session.refresh_details().await.expect_err("404");
    assert_eq!(err.kind(), ErrorKind::RemoteFailure);
    assert!(session.details().await.is_none());
    assert_eq!(session.normalize(&err).message, "Workroom not found");
}

#[tokio::test]
async fn going_live_announces_the_active_workroom() {
    let (base_url, backend) = spawn_backend().await;
    let session = WorkroomSession::new(client_for(&base_url), &fast_settings(&base_url));
    session.open(WorkroomId::from("room-42")).await.expect("open");
    let mut events = session.subscribe_live();

    assert_eq!(
        session.trigger_go_live().await.expect("trigger"),
        GoLiveOutcome::Started
    );
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("event")
        {
            LiveSessionEvent::Announced => break,
            LiveSessionEvent::AnnounceFailed(err) => panic!("announce failed: {err:?}"),
            _ => continue,
        }
    }
    assert_eq!(session.live_state().await, SessionState::Live);
    assert_eq!(*backend.announcements.lock().await, vec!["room-42".to_string()]);
}

#[tokio::test]
async fn switching_workroom_cancels_pending_countdown() {
    let session = WorkroomSession::with_announcer(
        client_for("http://127.0.0.1:9"),
        Countdown {
            ticks: 3,
            tick: Duration::from_secs(1),
        },
        10,
        Arc::new(NoopAnnouncer),
    );
    session.open(WorkroomId::from("room-1")).await.expect("open");
    session.trigger_go_live().await.expect("trigger");
    assert_eq!(session.live_state().await, SessionState::CountingDown);

    session.open(WorkroomId::from("room-2")).await.expect("switch");
    assert_eq!(session.live_state().await, SessionState::Idle);
    assert!(!session.cancel_go_live().await);
}

#[tokio::test(start_paused = true)]
async fn live_state_does_not_follow_a_workroom_switch() {
    let announcer = Arc::new(RecordingAnnouncer::default());
    let session = recorded_session(Arc::clone(&announcer));
    session.open(WorkroomId::from("room-1")).await.expect("open");
    session.trigger_go_live().await.expect("trigger");
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(session.live_state().await, SessionState::Live);

    assert!(!session.open(WorkroomId::from("room-1")).await.expect("reopen"));
    assert_eq!(session.live_state().await, SessionState::Live);

    session.open(WorkroomId::from("room-2")).await.expect("switch");
    assert_eq!(session.live_state().await, SessionState::Idle);
    assert_eq!(
        session.trigger_go_live().await.expect("trigger"),
        GoLiveOutcome::Started
    );
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(session.live_state().await, SessionState::Live);
    assert_eq!(
        announcer.announced(),
        vec![WorkroomId::from("room-1"), WorkroomId::from("room-2")]
    );
}

#[tokio::test(start_paused = true)]
async fn countdown_cut_short_by_switch_announces_nothing() {
    let announcer = Arc::new(RecordingAnnouncer::default());
    let session = recorded_session(Arc::clone(&announcer));
    session.open(WorkroomId::from("room-1")).await.expect("open");
    session.trigger_go_live().await.expect("trigger");

    tokio::time::sleep(Duration::from_millis(2999)).await;
    session.open(WorkroomId::from("room-2")).await.expect("switch");
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(session.live_state().await, SessionState::Idle);
    assert!(announcer.announced().is_empty());
}
