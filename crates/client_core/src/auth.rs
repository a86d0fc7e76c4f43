use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use tracing::debug;

pub const DEFAULT_TOKEN_KEY: &str = "token";

/// Bearer credential read from a token store. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Scoped key/value storage the credential lives in.
pub trait TokenStore: Send + Sync {
    fn read(&self, key: &str) -> Option<String>;
}

pub trait AuthTokenProvider: Send + Sync {
    fn token(&self) -> Option<BearerToken>;
}

pub struct MissingTokenProvider;

impl AuthTokenProvider for MissingTokenProvider {
    fn token(&self) -> Option<BearerToken> {
        None
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::new();
        store.insert(key, value);
        store
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), value.into());
        }
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.write().ok()?.remove(key)
    }
}

impl TokenStore for MemoryTokenStore {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }
}

/// JSON object of `{ "key": "value" }` pairs, re-read on every lookup so an
/// external sign-in flow can rotate the token underneath a running client.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn read(&self, key: &str) -> Option<String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %self.path.display(), %err, "auth: token file unreadable");
                return None;
            }
        };
        let entries: HashMap<String, serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(path = %self.path.display(), %err, "auth: token file is not a JSON object");
                return None;
            }
        };
        entries
            .get(key)
            .and_then(|value| value.as_str())
            .map(str::to_string)
    }
}

pub struct StoredTokenProvider {
    store: Arc<dyn TokenStore>,
    key: String,
}

impl StoredTokenProvider {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self::with_key(store, DEFAULT_TOKEN_KEY)
    }

    pub fn with_key(store: Arc<dyn TokenStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

impl AuthTokenProvider for StoredTokenProvider {
    fn token(&self) -> Option<BearerToken> {
        let raw = self.store.read(&self.key)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(BearerToken::new(trimmed))
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
