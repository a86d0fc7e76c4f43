//! Turns any failure shape into a short user-facing sentence.
//!
//! Raw failures are first classified into a [`RawFailure`] variant by an ordered
//! matcher table, a message is extracted from the variant, and the message is
//! rewritten through [`KEYWORD_RULES`]. Text that matches no rule is only shown
//! when it is short and free of markup.

use serde_json::Value;
use shared::error::{ControllerError, NormalizedError};

pub const DEFAULT_FALLBACK: &str = "Something went wrong. Please try again.";

const VERBATIM_MAX_CHARS: usize = 200;
const MARKUP_CHARS: [char; 4] = ['<', '>', '{', '}'];

#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    /// Fetch-style response: an `ok` flag plus a body that may decode as JSON.
    Response {
        ok: bool,
        status: Option<u16>,
        body: String,
    },
    /// Native error value.
    Exception { message: String },
    /// Alternate client shape carrying the payload under `response.data`.
    Wrapped { data: Value },
    Text(String),
    Opaque,
}

type Matcher = fn(&Value) -> Option<RawFailure>;

/// Evaluated in order; the first match wins.
const MATCHERS: [Matcher; 4] = [
    match_response,
    match_exception,
    match_wrapped,
    match_text,
];

fn match_response(value: &Value) -> Option<RawFailure> {
    let object = value.as_object()?;
    let ok = object.get("ok")?.as_bool()?;
    let body = match object.get("body")? {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    let status = object
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|status| u16::try_from(status).ok());
    Some(RawFailure::Response { ok, status, body })
}

fn match_exception(value: &Value) -> Option<RawFailure> {
    let object = value.as_object()?;
    let message = object.get("message")?.as_str()?;
    if !object.contains_key("name") && !object.contains_key("stack") {
        return None;
    }
    Some(RawFailure::Exception {
        message: message.to_string(),
    })
}

fn match_wrapped(value: &Value) -> Option<RawFailure> {
    let data = value.pointer("/response/data")?;
    Some(RawFailure::Wrapped { data: data.clone() })
}

fn match_text(value: &Value) -> Option<RawFailure> {
    value.as_str().map(|text| RawFailure::Text(text.to_string()))
}

impl RawFailure {
    pub fn classify(value: &Value) -> Self {
        MATCHERS
            .iter()
            .find_map(|matcher| matcher(value))
            .unwrap_or(RawFailure::Opaque)
    }

    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        RawFailure::Exception {
            message: err.to_string(),
        }
    }

    fn message(&self) -> Option<String> {
        match self {
            RawFailure::Response { body, .. } => {
                let decoded: Value = serde_json::from_str(body).ok()?;
                message_from_payload(&decoded)
            }
            RawFailure::Exception { message } => Some(message.clone()),
            RawFailure::Wrapped { data } => message_from_payload(data),
            RawFailure::Text(text) => Some(text.clone()),
            RawFailure::Opaque => None,
        }
    }
}

impl From<&ControllerError> for RawFailure {
    fn from(err: &ControllerError) -> Self {
        match err {
            ControllerError::RemoteFailure { status, body } => RawFailure::Response {
                ok: false,
                status: Some(*status),
                body: body.clone(),
            },
            // Carry request URLs and decoder internals; never user text.
            ControllerError::Transport(_) | ControllerError::DecodeFailure(_) => {
                RawFailure::Opaque
            }
            other => RawFailure::Exception {
                message: other.to_string(),
            },
        }
    }
}

impl From<&str> for RawFailure {
    fn from(text: &str) -> Self {
        RawFailure::Text(text.to_string())
    }
}

impl From<String> for RawFailure {
    fn from(text: String) -> Self {
        RawFailure::Text(text)
    }
}

fn message_from_payload(payload: &Value) -> Option<String> {
    match payload {
        Value::String(text) => Some(text.clone()),
        Value::Object(object) => ["message", "error"].iter().find_map(|field| {
            match object.get(*field)? {
                Value::String(text) => Some(text.clone()),
                nested @ Value::Object(_) => message_from_payload(nested),
                _ => None,
            }
        }),
        _ => None,
    }
}

struct KeywordRule {
    /// Every group must match; a group matches when any of its needles occurs.
    all_of: &'static [&'static [&'static str]],
    message: &'static str,
}

impl KeywordRule {
    fn matches(&self, lowered: &str) -> bool {
        self.all_of
            .iter()
            .all(|group| group.iter().any(|needle| lowered.contains(needle)))
    }
}

const KEYWORD_RULES: [KeywordRule; 6] = [
    KeywordRule {
        all_of: &[&["invalid"], &["credential"]],
        message: "Invalid email or password.",
    },
    KeywordRule {
        all_of: &[&["not found"], &["user"]],
        message: "No account found with that email address.",
    },
    KeywordRule {
        all_of: &[&["already"], &["exists"]],
        message: "An account with this email already exists.",
    },
    KeywordRule {
        all_of: &[&["password"]],
        message: "Password must be at least 8 characters long.",
    },
    KeywordRule {
        all_of: &[&["token", "expired"]],
        message: "Your session has expired. Please sign in again.",
    },
    KeywordRule {
        all_of: &[&["verification", "verify"]],
        message: "Please verify your email address before continuing.",
    },
];

fn humanize(raw: &str, fallback: &str) -> String {
    let lowered = raw.to_lowercase();
    if let Some(rule) = KEYWORD_RULES.iter().find(|rule| rule.matches(&lowered)) {
        return rule.message.to_string();
    }

    let trimmed = raw.trim();
    if is_presentable(trimmed) {
        trimmed.to_string()
    } else {
        fallback.to_string()
    }
}

fn is_presentable(text: &str) -> bool {
    !text.is_empty()
        && text.chars().count() < VERBATIM_MAX_CHARS
        && !text.contains(MARKUP_CHARS)
}

/// Total: always yields a string, whatever the input.
pub fn normalize(raw: &RawFailure, fallback: &str) -> String {
    match raw.message() {
        Some(message) => humanize(&message, fallback),
        None => fallback.to_string(),
    }
}

pub fn normalize_value(raw: &Value, fallback: &str) -> String {
    normalize(&RawFailure::classify(raw), fallback)
}

pub fn normalize_error(err: &ControllerError, fallback: &str) -> NormalizedError {
    NormalizedError::new(err.kind(), normalize(&RawFailure::from(err), fallback))
}

#[cfg(test)]
#[path = "tests/error_normalizer_tests.rs"]
mod tests;
