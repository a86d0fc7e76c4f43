//! Client-side controller for workroom state: authenticated fetches, a
//! per-workroom cache, the go-live coordinator and the user-facing error
//! vocabulary.

pub mod auth;
pub mod config;
pub mod error_normalizer;
pub mod live_session;
pub mod remote;
pub mod session;
pub mod session_cache;

pub use auth::{
    AuthTokenProvider, BearerToken, FileTokenStore, MemoryTokenStore, MissingTokenProvider,
    StoredTokenProvider, TokenStore,
};
pub use config::{load_settings, Countdown, Settings};
pub use error_normalizer::{normalize, normalize_error, RawFailure, DEFAULT_FALLBACK};
pub use live_session::{
    GoLiveOutcome, LiveAnnouncer, LiveSessionCoordinator, LiveSessionEvent, NoopAnnouncer,
};
pub use remote::{RemoteDataClient, DEFAULT_TASK_PAGE_SIZE};
pub use session::WorkroomSession;
pub use session_cache::{FetchTicket, SessionCache};
