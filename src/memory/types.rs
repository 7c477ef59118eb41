//! Memory log record types.
//!
//! Defines [`Source`] (the fixed set of sync producers) and [`MemoryEntry`]
//! (one line of a day-file), plus the timestamp (de)serialization used by
//! the JSONL format.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Producers that write into the memory log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Ticket tracker (issues, comments).
    Backlog,
    /// Chat messages.
    Slack,
    /// Email.
    Gmail,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Backlog, Source::Slack, Source::Gmail];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Slack => "slack",
            Self::Gmail => "gmail",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(Self::Backlog),
            "slack" => Ok(Self::Slack),
            "gmail" => Ok(Self::Gmail),
            _ => Err(format!("unknown source: {s}")),
        }
    }
}

/// One event in the memory log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Caller-chosen id, unique within a (source, day-file).
    pub id: String,
    pub source: Source,
    /// Event time; its local calendar date selects the day-file.
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Local>,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Ingestion time, filled in on append when absent.
    #[serde(default, with = "timestamp::option")]
    pub synced_at: Option<DateTime<Local>>,
}

impl MemoryEntry {
    pub fn new(
        id: impl Into<String>,
        source: Source,
        timestamp: DateTime<Local>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            timestamp,
            content: content.into(),
            metadata: serde_json::Map::new(),
            synced_at: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Calendar date of the event timestamp; names the day-file.
    pub fn event_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Parse an ISO-8601 timestamp. Values with an offset are converted to local
/// time; naive values (no offset) are taken as local time already.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Local.from_local_datetime(&naive).earliest()
}

/// Parse a timestamp stored by the metadata database (RFC 3339, UTC).
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    parse_timestamp(raw).map(|dt| dt.with_timezone(&Utc))
}

/// Serde adapter: RFC 3339 out, [`parse_timestamp`] in.
pub mod timestamp {
    use chrono::{DateTime, Local};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Local};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<DateTime<Local>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Local>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::super::parse_timestamp(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
                None => Ok(None),
            }
        }
    }
}
