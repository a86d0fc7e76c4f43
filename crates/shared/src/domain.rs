use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Blank ids are treated as missing by every caller.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(WorkroomId);
id_newtype!(TaskId);
id_newtype!(MemberId);

/// Backends emit ids as either JSON strings or integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Int(value) => value.to_string(),
        Raw::Float(value) => value.to_string(),
    })
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Int(value) => value.to_string(),
    }))
}

/// `null` decodes to the field's default instead of failing the whole record.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// RFC 3339, a zone-less datetime (read as UTC) or a bare date.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

/// A bare date, or the date part of any timestamp [`parse_timestamp`] accepts.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| parse_timestamp(raw).map(|timestamp| timestamp.date_naive()))
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<serde_json::Value>::deserialize(deserializer)?
        .and_then(|value| value.as_str().map(str::to_owned)))
}

/// Unparseable timestamps decode to `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_text(deserializer)?.as_deref().and_then(parse_timestamp))
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_text(deserializer)?.as_deref().and_then(parse_date))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub xp: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub level: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub productivity: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub average_task_time: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub daily_active_minutes: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub teamwork_collaborations: i64,
}

impl Member {
    pub fn member_id(&self) -> MemberId {
        MemberId(self.id.clone())
    }

    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub assigned_to: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub points: i64,
}

impl Task {
    pub fn task_id(&self) -> TaskId {
        TaskId(self.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub metric_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metric_value: f64,
}

/// Weighted KPI contribution. `weight` is conventionally in `[0, 10]` but is
/// carried exactly as the backend sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub kpi_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metric_value: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkroomDetails {
    pub id: WorkroomId,
    pub name: String,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub kpis: Option<String>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub performance_metrics: Vec<PerformanceMetric>,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl WorkroomDetails {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(alias = "suggestion", alias = "value")]
    pub text: String,
    #[serde(default, alias = "query")]
    pub term: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Suggestion endpoints answer with bare strings or records; both decode to
/// [`Suggestion`] in the order received.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SuggestionPayload {
    Text(String),
    Record(Suggestion),
}

impl From<SuggestionPayload> for Suggestion {
    fn from(value: SuggestionPayload) -> Self {
        match value {
            SuggestionPayload::Text(text) => Suggestion {
                text,
                term: None,
                score: None,
            },
            SuggestionPayload::Record(record) => record,
        }
    }
}

/// Task listings come back bare or inside a paginated envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TaskListPayload {
    Plain(Vec<Task>),
    Paged {
        results: Vec<Task>,
        #[serde(default)]
        count: Option<u64>,
    },
}

impl TaskListPayload {
    pub fn into_tasks(self) -> Vec<Task> {
        match self {
            TaskListPayload::Plain(tasks) => tasks,
            TaskListPayload::Paged { results, .. } => results,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    CountingDown,
    Live,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::CountingDown => "counting_down",
            SessionState::Live => "live",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
