//! Past searches and document analyses as returned by the history endpoint.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A completed search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// The query text.
    pub query: String,
    /// The full result text.
    pub results: String,
    /// Model that produced the result.
    pub model_used: String,
    /// When the search ran.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// A completed document analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Name of the uploaded file.
    pub filename: String,
    /// The analysis text.
    pub analysis: String,
    /// Model that produced the analysis.
    pub model_used: String,
    /// When the analysis ran.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// The user's history: two independent lists in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Past searches.
    #[serde(default)]
    pub searches: Vec<SearchRecord>,
    /// Past document analyses.
    #[serde(default)]
    pub analyses: Vec<AnalysisRecord>,
}

impl History {
    /// Whether both lists are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.searches.is_empty() && self.analyses.is_empty()
    }
}

/// Paging window for the history endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPage {
    /// Records to skip.
    pub skip: u32,
    /// Maximum records per list.
    pub limit: u32,
}

impl Default for HistoryPage {
    fn default() -> Self {
        Self { skip: 0, limit: 10 }
    }
}

/// Accept RFC 3339, naive ISO-8601 (taken as UTC) or epoch milliseconds.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => {
            let ms = n.as_i64().ok_or_else(|| Error::custom("invalid timestamp"))?;
            DateTime::from_timestamp_millis(ms).ok_or_else(|| Error::custom("timestamp out of range"))
        }
        Value::String(s) => {
            if let Ok(ts) = s.parse::<DateTime<Utc>>() {
                return Ok(ts);
            }
            s.parse::<NaiveDateTime>()
                .map(|naive| naive.and_utc())
                .map_err(|e| Error::custom(format!("invalid timestamp {s:?}: {e}")))
        }
        _ => Err(Error::custom("timestamp must be a number or string")),
    }
}
