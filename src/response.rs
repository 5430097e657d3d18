//! Decoding of inbound frames: the handful of typed responses a command can
//! receive, the events a subscription can receive, and the shape-sniffing
//! and tag-correlation glue that turns one raw JSON frame into a batch of
//! both.
//!
//! Grounded on `_MessageHandler.handle()` in the original implementation:
//! a single inbound frame can carry completions for several in-flight
//! commands *and* a batch of subscription events side by side, so decoding
//! happens once per frame and fans results out to whoever is waiting.

use chrono::{DateTime, FixedOffset};
use serde_json::Value as Json;

use crate::tag::Tag;
use crate::value::{
    Changelog, ChangelogAlarmEntry, ChangelogProtocolEntry, ExtInfos, HistData, HistPoint, Query,
    Trendpoint, parse_stamp,
};

/// Status code carried by every response and most events. `Unknown`
/// preserves whatever string the server sent so callers can still see it
/// (and so we never have to reject a frame just because a server added a
/// new code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    NoPerm,
    NotFound,
    Error,
    Unknown(String),
}

impl ResponseCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub(crate) fn from_wire(raw: &str) -> Self {
        match raw {
            "ok" => Self::Ok,
            "no perm" => Self::NoPerm,
            "not found" => Self::NotFound,
            "error" => Self::Error,
            other => {
                tracing::warn!(code = other, "server sent an unrecognized response code");
                Self::Unknown(other.to_owned())
            }
        }
    }
}

/// The reason a datapoint, subscription, or history/changelog event fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventCode {
    OnChange,
    OnSet,
    OnCreate,
    OnRename,
    OnDelete,
    Unknown(String),
}

impl EventCode {
    pub(crate) fn from_wire(raw: &str) -> Self {
        match raw {
            "onChange" => Self::OnChange,
            "onSet" => Self::OnSet,
            "onCreate" => Self::OnCreate,
            "onRename" => Self::OnRename,
            "onDelete" => Self::OnDelete,
            other => {
                tracing::warn!(code = other, "server sent an unrecognized event code");
                Self::Unknown(other.to_owned())
            }
        }
    }

    /// Decodes the `event` bitmask used on `subscribe` requests (see
    /// [`crate::command`]). Bit 16 is `onDelete`: the original
    /// implementation mapped it to `onRename` by mistake, which this
    /// corrects.
    pub(crate) fn from_bit(bit: u8) -> Option<Self> {
        match bit {
            1 => Some(Self::OnChange),
            2 => Some(Self::OnSet),
            4 => Some(Self::OnCreate),
            8 => Some(Self::OnRename),
            16 => Some(Self::OnDelete),
            _ => None,
        }
    }
}

/// A single datapoint record inside a `get` response.
#[derive(Debug, Clone, PartialEq)]
pub struct DpRecord {
    pub path: String,
    pub value: Option<Json>,
    pub stamp: Option<DateTime<FixedOffset>>,
    pub state: Option<String>,
    pub ext_infos: Option<ExtInfos>,
    pub hist_data: Option<HistData>,
    pub changelog: Option<Changelog>,
}

impl DpRecord {
    fn from_json(value: &Json) -> Self {
        Self {
            path: value
                .get("path")
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_owned(),
            value: value.get("value").cloned(),
            stamp: parse_stamp(value.get("stamp").and_then(Json::as_str)),
            state: value
                .get("state")
                .and_then(Json::as_str)
                .map(str::to_owned),
            ext_infos: value.get("extInfos").map(ExtInfos::from_json),
            hist_data: value.get("histData").and_then(Json::as_array).map(decode_hist_data),
            changelog: value
                .get("changelog")
                .and_then(Json::as_array)
                .map(decode_changelog),
        }
    }
}

/// A response carrying no payload beyond the status code, for `set`,
/// `rename`, `delete`, and `unsubscribe`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainResponse {
    pub code: ResponseCode,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetResponse {
    pub code: ResponseCode,
    pub message: Option<String>,
    pub records: Vec<DpRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeResponse {
    pub code: ResponseCode,
    pub message: Option<String>,
    pub query: Option<Query>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogGetGroupsResponse {
    pub code: ResponseCode,
    pub message: Option<String>,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogReadResponse {
    pub code: ResponseCode,
    pub message: Option<String>,
    pub changelog: Option<Changelog>,
}

/// Every shape a completed command can resolve to.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Get(GetResponse),
    Set(PlainResponse),
    Rename(PlainResponse),
    Delete(PlainResponse),
    Subscribe(SubscribeResponse),
    Unsubscribe(PlainResponse),
    ChangelogGetGroups(ChangelogGetGroupsResponse),
    ChangelogRead(ChangelogReadResponse),
}

impl Response {
    pub fn code(&self) -> &ResponseCode {
        match self {
            Self::Get(r) => &r.code,
            Self::Set(r) | Self::Rename(r) | Self::Delete(r) | Self::Unsubscribe(r) => &r.code,
            Self::Subscribe(r) => &r.code,
            Self::ChangelogGetGroups(r) => &r.code,
            Self::ChangelogRead(r) => &r.code,
        }
    }
}

/// A subscription event, carrying the tag of the subscription it belongs
/// to (the dispatcher uses this to route it; see [`crate::dispatcher`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub tag: Tag,
    pub path: String,
    pub code: EventCode,
    pub value: Option<Json>,
    pub stamp: Option<DateTime<FixedOffset>>,
    pub state: Option<String>,
}

/// The result of decoding one inbound frame: zero or more command
/// completions (routed by tag to a waiting caller) and zero or more
/// subscription events (routed by tag to the dispatcher).
#[derive(Debug, Default)]
pub struct DecodedFrame {
    pub completions: Vec<(Tag, Response)>,
    pub events: Vec<Event>,
}

fn plain_response(entry: &Json) -> PlainResponse {
    PlainResponse {
        code: entry
            .get("code")
            .and_then(Json::as_str)
            .map(ResponseCode::from_wire)
            .unwrap_or(ResponseCode::Error),
        message: entry
            .get("message")
            .and_then(Json::as_str)
            .map(str::to_owned),
    }
}

fn decode_hist_data(records: &[Json]) -> HistData {
    let detail_shape = records
        .first()
        .is_some_and(|r| r.get("stamp").is_some() && r.as_object().is_some_and(|o| o.len() > 1));

    if detail_shape {
        HistData::Detail(
            records
                .iter()
                .map(|r| HistPoint {
                    stamp: parse_stamp(r.get("stamp").and_then(Json::as_str)),
                    value: r.get("value").cloned().unwrap_or(Json::Null),
                    state: r.get("state").cloned().unwrap_or(Json::Null),
                    rec: r.get("rec").cloned().unwrap_or(Json::Null),
                })
                .collect(),
        )
    } else {
        HistData::Compact(
            records
                .iter()
                .map(|r| {
                    let obj = r.as_object();
                    let (stamp_raw, value) = obj
                        .and_then(|o| o.iter().next())
                        .map(|(k, v)| (Some(k.as_str()), v.clone()))
                        .unwrap_or((None, Json::Null));
                    Trendpoint {
                        stamp: parse_stamp(stamp_raw),
                        value,
                    }
                })
                .collect(),
        )
    }
}

fn decode_changelog(records: &[Json]) -> Changelog {
    let alarm_shape = records.first().is_some_and(|r| r.get("state").is_some());

    if alarm_shape {
        Changelog::Alarm(
            records
                .iter()
                .map(|r| ChangelogAlarmEntry {
                    protocol: changelog_protocol_entry(r),
                    state: r
                        .get("state")
                        .and_then(Json::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    priority: r.get("priority").and_then(Json::as_i64).unwrap_or(0),
                    priority_bacnet: r
                        .get("priorityBacnet")
                        .and_then(Json::as_i64)
                        .unwrap_or(0),
                    alarm_group: r.get("alarmGroup").and_then(Json::as_i64).unwrap_or(0),
                    alarm_collect_group: r
                        .get("alarmCollectGroup")
                        .and_then(Json::as_i64)
                        .unwrap_or(0),
                    site_group: r.get("siteGroup").and_then(Json::as_i64).unwrap_or(0),
                    screen: r
                        .get("screen")
                        .and_then(Json::as_str)
                        .map(str::to_owned),
                })
                .collect(),
        )
    } else {
        Changelog::Protocol(records.iter().map(changelog_protocol_entry).collect())
    }
}

fn changelog_protocol_entry(r: &Json) -> ChangelogProtocolEntry {
    ChangelogProtocolEntry {
        path: r.get("path").and_then(Json::as_str).map(str::to_owned),
        stamp: parse_stamp(r.get("stamp").and_then(Json::as_str)),
        text: r
            .get("text")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_owned(),
    }
}

fn decode_query(entry: &Json) -> Option<Query> {
    entry
        .get("query")
        .map(|q| serde_json::from_value(q.clone()).unwrap_or_default())
}

/// Decodes one raw inbound text frame into completions and events.
///
/// Most verb keys carry a per-entry `tag`. The exception is
/// `changelogGetGroups`, which never tags its individual entries; instead
/// the envelope carries a sibling `tag` object mapping the verb name to an
/// array of tags, positionally matched to the entries below it.
pub fn decode_frame(text: &str) -> serde_json::Result<DecodedFrame> {
    let root: Json = serde_json::from_str(text)?;
    let mut frame = DecodedFrame::default();

    let tag_helper = root.get("tag").and_then(Json::as_object);

    if let Some(entries) = root.get("get").and_then(Json::as_array) {
        for entry in entries {
            let Some(tag) = entry.get("tag").and_then(Json::as_str) else {
                continue;
            };
            let records = entry
                .get("data")
                .and_then(Json::as_array)
                .map(|v| v.iter().map(DpRecord::from_json).collect())
                .unwrap_or_default();
            frame.completions.push((
                Tag::from(tag),
                Response::Get(GetResponse {
                    code: entry
                        .get("code")
                        .and_then(Json::as_str)
                        .map(ResponseCode::from_wire)
                        .unwrap_or(ResponseCode::Error),
                    message: entry
                        .get("message")
                        .and_then(Json::as_str)
                        .map(str::to_owned),
                    records,
                }),
            ));
        }
    }

    let plain_verbs: [(&str, fn(PlainResponse) -> Response); 4] = [
        ("set", Response::Set),
        ("rename", Response::Rename),
        ("delete", Response::Delete),
        ("unsubscribe", Response::Unsubscribe),
    ];
    for (key, ctor) in plain_verbs {
        if let Some(entries) = root.get(key).and_then(Json::as_array) {
            for entry in entries {
                let Some(tag) = entry.get("tag").and_then(Json::as_str) else {
                    continue;
                };
                frame
                    .completions
                    .push((Tag::from(tag), ctor(plain_response(entry))));
            }
        }
    }

    if let Some(entries) = root.get("subscribe").and_then(Json::as_array) {
        for entry in entries {
            let Some(tag) = entry.get("tag").and_then(Json::as_str) else {
                continue;
            };
            let plain = plain_response(entry);
            frame.completions.push((
                Tag::from(tag),
                Response::Subscribe(SubscribeResponse {
                    code: plain.code,
                    message: plain.message,
                    query: decode_query(entry),
                }),
            ));
        }
    }

    if let Some(entries) = root.get("changelogRead").and_then(Json::as_array) {
        for entry in entries {
            let Some(tag) = entry.get("tag").and_then(Json::as_str) else {
                continue;
            };
            let plain = plain_response(entry);
            let changelog = entry.get("data").and_then(Json::as_array).map(decode_changelog);
            frame.completions.push((
                Tag::from(tag),
                Response::ChangelogRead(ChangelogReadResponse {
                    code: plain.code,
                    message: plain.message,
                    changelog,
                }),
            ));
        }
    }

    if let Some(entries) = root.get("changelogGetGroups").and_then(Json::as_array) {
        let tags: Vec<&str> = tag_helper
            .and_then(|m| m.get("changelogGetGroups"))
            .and_then(Json::as_array)
            .map(|v| v.iter().filter_map(Json::as_str).collect())
            .unwrap_or_default();

        for (idx, entry) in entries.iter().enumerate() {
            let Some(tag) = tags.get(idx) else {
                tracing::warn!(
                    index = idx,
                    "changelogGetGroups entry has no corresponding tag in the envelope helper map"
                );
                continue;
            };
            let plain = plain_response(entry);
            let groups = entry
                .get("data")
                .and_then(Json::as_array)
                .map(|v| {
                    v.iter()
                        .filter_map(Json::as_str)
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default();
            frame.completions.push((
                Tag::from(*tag),
                Response::ChangelogGetGroups(ChangelogGetGroupsResponse {
                    code: plain.code,
                    message: plain.message,
                    groups,
                }),
            ));
        }
    }

    if let Some(entries) = root.get("event").and_then(Json::as_array) {
        for entry in entries {
            let Some(tag) = entry.get("tag").and_then(Json::as_str) else {
                tracing::warn!("dropping event frame with no subscription tag");
                continue;
            };
            frame.events.push(Event {
                tag: Tag::from(tag),
                path: entry
                    .get("path")
                    .and_then(Json::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                code: entry
                    .get("code")
                    .and_then(Json::as_str)
                    .map(EventCode::from_wire)
                    .unwrap_or(EventCode::Unknown(String::new())),
                value: entry.get("value").cloned(),
                stamp: parse_stamp(entry.get("stamp").and_then(Json::as_str)),
                state: entry
                    .get("state")
                    .and_then(Json::as_str)
                    .map(str::to_owned),
            });
        }
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_plain_set_completion() {
        let frame = decode_frame(r#"{"set":[{"tag":"t1","code":"ok"}]}"#).unwrap();
        assert_eq!(frame.completions.len(), 1);
        assert!(matches!(frame.completions[0].1, Response::Set(ref r) if r.code == ResponseCode::Ok));
    }

    #[test]
    fn sniffs_detail_hist_data_shape() {
        let frame = decode_frame(
            r#"{"get":[{"tag":"t1","code":"ok","data":[
                {"path":"/a","histData":[{"stamp":"2024-01-01T00:00:00Z","value":1,"state":"ok","rec":"raw"}]}
            ]}]}"#,
        )
        .unwrap();
        let Response::Get(resp) = &frame.completions[0].1 else {
            panic!("expected Get response");
        };
        assert!(matches!(resp.records[0].hist_data, Some(HistData::Detail(_))));
    }

    #[test]
    fn sniffs_compact_hist_data_shape() {
        let frame = decode_frame(
            r#"{"get":[{"tag":"t1","code":"ok","data":[
                {"path":"/a","histData":[{"2024-01-01T00:00:00Z":1}]}
            ]}]}"#,
        )
        .unwrap();
        let Response::Get(resp) = &frame.completions[0].1 else {
            panic!("expected Get response");
        };
        assert!(matches!(resp.records[0].hist_data, Some(HistData::Compact(_))));
    }

    #[test]
    fn correlates_changelog_get_groups_by_position() {
        let frame = decode_frame(
            r#"{"changelogGetGroups":[{"code":"ok","data":["g1","g2"]}],"tag":{"changelogGetGroups":["t1"]}}"#,
        )
        .unwrap();
        assert_eq!(frame.completions.len(), 1);
        assert_eq!(frame.completions[0].0, Tag::from("t1"));
    }

    #[test]
    fn event_code_bit16_maps_to_on_delete() {
        assert_eq!(EventCode::from_bit(16), Some(EventCode::OnDelete));
    }
}
