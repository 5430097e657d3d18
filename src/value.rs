//! The small family of value objects passed across the request/response
//! boundary: query filters, history/changelog payloads, extended metadata,
//! and event records.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serde_with::skip_serializing_none;

/// A point in time accepted by the encoder: either a `chrono` value (always
/// rendered as RFC 3339 / ISO 8601), or a pre-formatted string passed through
/// verbatim. Mirrors the original implementation's duck-typed
/// `isoformat()`-or-pass-through handling of `start`/`end`/`stamp` fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Timestamp {
    Parsed(DateTime<FixedOffset>),
    Raw(String),
}

impl Timestamp {
    pub fn to_wire(&self) -> String {
        match self {
            Self::Parsed(dt) => dt.to_rfc3339(),
            Self::Raw(s) => s.clone(),
        }
    }
}

impl<Tz: chrono::TimeZone> From<DateTime<Tz>> for Timestamp
where
    Tz::Offset: std::fmt::Display,
{
    fn from(value: DateTime<Tz>) -> Self {
        Self::Raw(value.to_rfc3339())
    }
}

impl From<String> for Timestamp {
    fn from(value: String) -> Self {
        Self::Raw(value)
    }
}

impl From<&str> for Timestamp {
    fn from(value: &str) -> Self {
        Self::Raw(value.to_owned())
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_wire())
    }
}

/// Parses a `stamp` field the way every response/event kind does: ISO 8601
/// on success, `None` on an absent or unparseable value (the "null
/// sentinel" — datapoints without a stamp, or a DMS that just restarted,
/// legitimately send this).
pub fn parse_stamp(raw: Option<&str>) -> Option<DateTime<FixedOffset>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Optional filter attached to a `get` or `subscribe` command, and echoed
/// back on `subscribe`/`unsubscribe` responses.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "regExPath")]
    pub reg_ex_path: Option<String>,
    #[serde(rename = "regExValue")]
    pub reg_ex_value: Option<String>,
    #[serde(rename = "regExStamp")]
    pub reg_ex_stamp: Option<String>,
    #[serde(rename = "isType")]
    pub is_type: Option<String>,
    #[serde(rename = "hasHistData")]
    pub has_hist_data: Option<bool>,
    #[serde(rename = "hasChangelog")]
    pub has_changelog: Option<bool>,
    #[serde(rename = "hasAlarmData")]
    pub has_alarm_data: Option<bool>,
    #[serde(rename = "maxDepth")]
    pub max_depth: Option<i64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, depth: i64) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_reg_ex_path(mut self, pattern: impl Into<String>) -> Self {
        self.reg_ex_path = Some(pattern.into());
        self
    }
}

/// `histData` request option (`spec.md` §4.2): `start` is mandatory, the
/// rest optional.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct HistDataQuery {
    pub start: Timestamp,
    pub end: Option<Timestamp>,
    pub interval: Option<i64>,
    pub format: Option<String>,
}

impl HistDataQuery {
    pub fn new(start: impl Into<Timestamp>) -> Self {
        Self {
            start: start.into(),
            end: None,
            interval: None,
            format: None,
        }
    }

    pub fn with_end(mut self, end: impl Into<Timestamp>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn with_interval(mut self, interval: i64) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// `changelog` request option on `get`.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct ChangelogQuery {
    pub start: Timestamp,
    pub end: Option<Timestamp>,
}

impl ChangelogQuery {
    pub fn new(start: impl Into<Timestamp>) -> Self {
        Self {
            start: start.into(),
            end: None,
        }
    }

    pub fn with_end(mut self, end: impl Into<Timestamp>) -> Self {
        self.end = Some(end.into());
        self
    }
}

/// Extended metadata about a datapoint, requested via `showExtInfos`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtInfos {
    pub state: Option<String>,
    pub acc_type: Option<String>,
    pub name: Option<String>,
    pub template: Option<String>,
    pub unit: Option<String>,
    pub comment: Option<String>,
    pub changelog_group: Option<String>,
}

impl ExtInfos {
    pub(crate) fn from_json(value: &Json) -> Self {
        let get = |key: &str| {
            value
                .get(key)
                .and_then(Json::as_str)
                .map(str::to_owned)
        };
        Self {
            state: get("state"),
            acc_type: get("accType"),
            name: get("name"),
            template: get("template"),
            unit: get("unit"),
            comment: get("comment"),
            changelog_group: get("changelogGroup"),
        }
    }
}

/// One record of a `histData` response in the "detail" shape.
#[derive(Debug, Clone, PartialEq)]
pub struct HistPoint {
    pub stamp: Option<DateTime<FixedOffset>>,
    pub value: Json,
    pub state: Json,
    pub rec: Json,
}

/// One record of a `histData` response in the "compact" shape: a bare
/// `(stamp, value)` pair synthesized from the single key/value of each
/// wire object.
#[derive(Debug, Clone, PartialEq)]
pub struct Trendpoint {
    pub stamp: Option<DateTime<FixedOffset>>,
    pub value: Json,
}

/// History data in a `get` response, shape-sniffed at decode time: the
/// "detail" shape is used when the first record carries a `stamp` field,
/// otherwise the "compact" shape.
#[derive(Debug, Clone, PartialEq)]
pub enum HistData {
    Detail(Vec<HistPoint>),
    Compact(Vec<Trendpoint>),
}

impl HistData {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Detail(v) => v.is_empty(),
            Self::Compact(v) => v.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Detail(v) => v.len(),
            Self::Compact(v) => v.len(),
        }
    }
}

/// One entry of a `changelog` response in the "protocol" shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogProtocolEntry {
    pub path: Option<String>,
    pub stamp: Option<DateTime<FixedOffset>>,
    pub text: String,
}

/// One entry of a `changelog` response in the "alarm" shape: a protocol
/// entry plus the alarm-specific fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogAlarmEntry {
    pub protocol: ChangelogProtocolEntry,
    pub state: String,
    pub priority: i64,
    pub priority_bacnet: i64,
    pub alarm_group: i64,
    pub alarm_collect_group: i64,
    pub site_group: i64,
    pub screen: Option<String>,
}

/// Changelog data in a `get`/`changelogRead` response, shape-sniffed at
/// decode time: the "alarm" shape is used when the first record carries a
/// `state` field, otherwise "protocol".
#[derive(Debug, Clone, PartialEq)]
pub enum Changelog {
    Protocol(Vec<ChangelogProtocolEntry>),
    Alarm(Vec<ChangelogAlarmEntry>),
}

impl Changelog {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Protocol(v) => v.is_empty(),
            Self::Alarm(v) => v.is_empty(),
        }
    }
}
