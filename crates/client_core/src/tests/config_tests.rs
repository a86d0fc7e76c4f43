use super::*;

use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_leave_base_url_unset() {
    let settings = Settings::default();
    assert_eq!(settings.base_url, None);
    assert_eq!(settings.token_key, "token");
    assert_eq!(settings.task_page_size, 1000);
    assert_eq!(settings.countdown().ticks, 3);
    assert_eq!(settings.countdown().tick, Duration::from_secs(1));
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file_settings(
        &mut settings,
        r#"
base_url = "https://api.test"
token_key = "access"
countdown_seconds = 5
task_page_size = 50
"#,
    )
    .expect("parse");
    assert_eq!(settings.base_url.as_deref(), Some("https://api.test"));
    assert_eq!(settings.token_key, "access");
    assert_eq!(settings.countdown_seconds, 5);
    assert_eq!(settings.task_page_size, 50);
    assert_eq!(settings.request_timeout_secs, 30);
}

#[test]
fn env_overrides_file_and_app_prefix_wins() {
    let mut settings = Settings {
        base_url: Some("https://file.test".into()),
        ..Settings::default()
    };
    apply_env_overrides(
        &mut settings,
        lookup_from(&[
            ("WORKROOM_BASE_URL", "https://env.test"),
            ("APP__BASE_URL", "https://app.test"),
            ("WORKROOM_TOKEN_FILE", "/tmp/tokens.json"),
            ("APP__COUNTDOWN_SECONDS", "10"),
        ]),
    );
    assert_eq!(settings.base_url.as_deref(), Some("https://app.test"));
    assert_eq!(
        settings.token_file.as_deref(),
        Some(Path::new("/tmp/tokens.json"))
    );
    assert_eq!(settings.countdown_seconds, 10);
}

#[test]
fn unparseable_numeric_overrides_are_ignored() {
    let mut settings = Settings::default();
    apply_env_overrides(
        &mut settings,
        lookup_from(&[
            ("APP__COUNTDOWN_SECONDS", "soon"),
            ("APP__TASK_PAGE_SIZE", "-1"),
        ]),
    );
    assert_eq!(settings, Settings::default());
}

#[test]
fn explicit_missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.toml");
    let err = load_settings(Some(&missing)).expect_err("must fail");
    assert!(err.to_string().contains("failed to read config file"));
}

#[test]
fn malformed_config_file_reports_its_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("workroom.toml");
    fs::write(&path, "countdown_seconds = \"three\"").expect("write");
    let err = load_settings(Some(&path)).expect_err("must fail");
    assert!(err.to_string().contains("workroom.toml"));
}
