use super::*;

#[test]
fn stored_provider_reads_token_under_configured_key() {
    let store = Arc::new(MemoryTokenStore::with_entry("session_token", "abc123"));
    let provider = StoredTokenProvider::with_key(store, "session_token");
    assert_eq!(
        provider.token().map(|token| token.expose().to_string()),
        Some("abc123".to_string())
    );
}

#[test]
fn blank_or_missing_token_reads_as_absent() {
    let store = Arc::new(MemoryTokenStore::with_entry(DEFAULT_TOKEN_KEY, "   "));
    let provider = StoredTokenProvider::new(store.clone());
    assert!(provider.token().is_none());

    store.remove(DEFAULT_TOKEN_KEY);
    assert!(provider.token().is_none());
    assert!(MissingTokenProvider.token().is_none());
}

#[test]
fn bearer_token_debug_is_redacted() {
    let token = BearerToken::new("super-secret");
    assert!(!format!("{token:?}").contains("super-secret"));
}

#[test]
fn file_store_rereads_rotated_tokens() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tokens.json");
    let provider = StoredTokenProvider::new(Arc::new(FileTokenStore::new(&path)));

    assert!(provider.token().is_none(), "missing file reads as absent");

    fs::write(&path, r#"{"token":"first"}"#).expect("write");
    assert_eq!(provider.token().expect("token").expose(), "first");

    fs::write(&path, r#"{"token":"second"}"#).expect("rewrite");
    assert_eq!(provider.token().expect("token").expose(), "second");

    fs::write(&path, "not json").expect("corrupt");
    assert!(provider.token().is_none());
}
