//! Outgoing command encoding: per-verb option structs (replacing the
//! original implementation's `**kwargs` + runtime `assert`), the bitmask
//! helpers for `showExtInfos` and subscription `event` filters, and the
//! envelope builder that handles the `changelogGetGroups` tag-less
//! exception.

use serde_json::{Map, Value as Json, json};

use crate::error::{DmsError, Result};
use crate::tag::Tag;
use crate::value::{ChangelogQuery, HistDataQuery, Query, Timestamp};

/// `showExtInfos` bitmask (1-127, 7 flags). Mirrors the original
/// implementation's `_ExtInfos` integer flags, re-expressed as a small
/// value type instead of bare ints so invalid combinations cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtInfoFlags(u8);

impl ExtInfoFlags {
    pub const STATE: Self = Self(1);
    pub const ACC_TYPE: Self = Self(2);
    pub const NAME: Self = Self(4);
    pub const TEMPLATE: Self = Self(8);
    pub const UNIT: Self = Self(16);
    pub const COMMENT: Self = Self(32);
    pub const CHANGELOG_GROUP: Self = Self(64);
    pub const ALL: Self = Self(127);

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn names(self) -> Vec<&'static str> {
        [
            (Self::STATE, "state"),
            (Self::ACC_TYPE, "accType"),
            (Self::NAME, "name"),
            (Self::TEMPLATE, "template"),
            (Self::UNIT, "unit"),
            (Self::COMMENT, "comment"),
            (Self::CHANGELOG_GROUP, "changelogGroup"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

impl std::ops::BitOr for ExtInfoFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Subscription `event` bitmask (1-31, 5 flags). `31` (all flags set)
/// serializes as the literal wildcard `"*"` rather than an exhaustive
/// array, matching the original implementation's shorthand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventFlags(u8);

impl EventFlags {
    pub const ON_CHANGE: Self = Self(1);
    pub const ON_SET: Self = Self(2);
    pub const ON_CREATE: Self = Self(4);
    pub const ON_RENAME: Self = Self(8);
    /// Bit 16. The original implementation's `_CmdSub.eventcode_as_str`
    /// mapped this bit to `onRename` by mistake; this crate emits the
    /// correct `onDelete`.
    pub const ON_DELETE: Self = Self(16);
    pub const ALL: Self = Self(31);

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn names(self) -> Vec<&'static str> {
        [
            (Self::ON_CHANGE, "onChange"),
            (Self::ON_SET, "onSet"),
            (Self::ON_CREATE, "onCreate"),
            (Self::ON_RENAME, "onRename"),
            (Self::ON_DELETE, "onDelete"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }

    /// `"*"` when every flag is set, otherwise the flag names joined by
    /// commas into a single string — matching `','.join(strings_list)` in
    /// the original implementation's `eventcode_as_str`.
    fn to_wire(self) -> Json {
        if self == Self::ALL {
            json!("*")
        } else {
            json!(self.names().join(","))
        }
    }
}

impl std::ops::BitOr for EventFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub query: Option<Query>,
    pub hist_data: Option<HistDataQuery>,
    pub changelog: Option<ChangelogQuery>,
    pub show_ext_infos: Option<ExtInfoFlags>,
}

/// The datapoint type a `set` may declare when creating a new datapoint.
/// A closed set rather than a free-form string, so an invalid type is
/// rejected at compile time instead of by a server round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int,
    Double,
    String,
    Bool,
}

impl DataType {
    fn as_wire(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
            Self::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetOptions {
    pub value: Json,
    pub stamp: Option<Timestamp>,
    /// Whether the server should create the datapoint if it doesn't exist
    /// yet. Always sent, matching the original `_CmdSet`'s required
    /// (defaulting to `false`) `create` argument.
    pub create: bool,
    pub data_type: Option<DataType>,
}

impl SetOptions {
    pub fn new(value: impl Into<Json>) -> Self {
        Self {
            value: value.into(),
            stamp: None,
            create: false,
            data_type: None,
        }
    }

    pub fn with_stamp(mut self, stamp: impl Into<Timestamp>) -> Self {
        self.stamp = Some(stamp.into());
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }
}

/// Options for `delete`. `recursive` is always sent, matching the
/// original `_CmdDel`'s required (defaulting to `false`) argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    pub recursive: bool,
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub query: Option<Query>,
    pub event: Option<EventFlags>,
}

#[derive(Debug, Clone)]
pub struct ChangelogReadOptions {
    pub query: ChangelogQuery,
    pub groups: Option<Vec<String>>,
}

impl ChangelogReadOptions {
    pub fn new(query: ChangelogQuery) -> Self {
        Self {
            query,
            groups: None,
        }
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = Some(groups);
        self
    }
}

/// One outgoing verb, paired with the path it addresses (all verbs except
/// `changelogGetGroups`, which is path-less).
#[derive(Debug, Clone)]
pub enum Command {
    Get(String, GetOptions),
    Set(String, SetOptions),
    Rename(String, String),
    Delete(String, DeleteOptions),
    Subscribe(String, SubscribeOptions),
    Unsubscribe(String),
    ChangelogGetGroups,
    ChangelogRead(ChangelogReadOptions),
}

impl Command {
    /// The envelope key this command is nested under on the wire.
    fn verb(&self) -> &'static str {
        match self {
            Self::Get(..) => "get",
            Self::Set(..) => "set",
            Self::Rename(..) => "rename",
            Self::Delete(..) => "delete",
            Self::Subscribe(..) => "subscribe",
            Self::Unsubscribe(..) => "unsubscribe",
            Self::ChangelogGetGroups => "changelogGetGroups",
            Self::ChangelogRead(..) => "changelogRead",
        }
    }

    fn body(&self) -> Result<Json> {
        let mut body = Map::new();
        match self {
            Self::Get(path, opts) => {
                body.insert("path".into(), json!(path));
                if let Some(q) = &opts.query {
                    body.insert("query".into(), serde_json::to_value(q).expect("Query always serializes"));
                }
                if let Some(h) = &opts.hist_data {
                    body.insert(
                        "histData".into(),
                        serde_json::to_value(h).expect("HistDataQuery always serializes"),
                    );
                }
                if let Some(c) = &opts.changelog {
                    body.insert(
                        "changelog".into(),
                        serde_json::to_value(c).expect("ChangelogQuery always serializes"),
                    );
                }
                if let Some(flags) = opts.show_ext_infos {
                    body.insert("showExtInfos".into(), json!(flags.names()));
                }
            }
            Self::Set(path, opts) => {
                body.insert("path".into(), json!(path));
                body.insert("value".into(), opts.value.clone());
                if let Some(stamp) = &opts.stamp {
                    body.insert("stamp".into(), json!(stamp.to_wire()));
                }
                body.insert("create".into(), json!(opts.create));
                if let Some(data_type) = opts.data_type {
                    body.insert("type".into(), json!(data_type.as_wire()));
                }
            }
            Self::Rename(path, new_path) => {
                if new_path.is_empty() {
                    return Err(DmsError::Encoding {
                        field: "new_path",
                        reason: "must not be empty".into(),
                    });
                }
                body.insert("path".into(), json!(path));
                body.insert("newPath".into(), json!(new_path));
            }
            Self::Delete(path, opts) => {
                body.insert("path".into(), json!(path));
                body.insert("recursive".into(), json!(opts.recursive));
            }
            Self::Subscribe(path, opts) => {
                body.insert("path".into(), json!(path));
                if let Some(q) = &opts.query {
                    body.insert("query".into(), serde_json::to_value(q).expect("Query always serializes"));
                }
                if let Some(flags) = opts.event {
                    body.insert("event".into(), flags.to_wire());
                }
            }
            Self::Unsubscribe(path) => {
                body.insert("path".into(), json!(path));
            }
            Self::ChangelogGetGroups => {}
            Self::ChangelogRead(opts) => {
                body.insert("start".into(), json!(opts.query.start.to_wire()));
                if let Some(end) = &opts.query.end {
                    body.insert("end".into(), json!(end.to_wire()));
                }
                if let Some(groups) = &opts.groups {
                    body.insert("groups".into(), json!(groups));
                }
            }
        }
        Ok(Json::Object(body))
    }

    /// `unsubscribe` requires a caller-supplied tag identifying the
    /// subscription to cancel; every other verb mints a fresh one.
    pub fn requires_caller_tag(&self) -> bool {
        matches!(self, Self::Unsubscribe(_))
    }

    /// Builds the one-frame-per-request envelope for this command. Every
    /// verb nests a one-element array under its verb key, with the tag
    /// alongside the body — except `changelogGetGroups`, which carries no
    /// per-entry tag and instead gets a sibling `tag` object keyed by verb
    /// name, holding the tags of the batch positionally.
    pub fn encode(&self, tag: &Tag) -> Result<Json> {
        let mut entry = match self.body()? {
            Json::Object(map) => map,
            _ => unreachable!("body() always returns an object"),
        };

        let mut envelope = Map::new();
        if matches!(self, Self::ChangelogGetGroups) {
            envelope.insert(self.verb().into(), json!([Json::Object(entry)]));
            let mut tag_map = Map::new();
            tag_map.insert(self.verb().into(), json!([tag.as_str()]));
            envelope.insert("tag".into(), Json::Object(tag_map));
        } else {
            entry.insert("tag".into(), json!(tag.as_str()));
            envelope.insert(self.verb().into(), json!([Json::Object(entry)]));
        }

        Ok(Json::Object(envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_info_flags_all_lists_every_name() {
        assert_eq!(
            ExtInfoFlags::ALL.names(),
            vec!["state", "accType", "name", "template", "unit", "comment", "changelogGroup"]
        );
    }

    #[test]
    fn event_flags_all_serializes_as_wildcard() {
        assert_eq!(EventFlags::ALL.to_wire(), json!("*"));
    }

    #[test]
    fn event_flags_partial_serializes_as_comma_joined_string() {
        let flags = EventFlags::ON_CHANGE | EventFlags::ON_DELETE;
        assert_eq!(flags.to_wire(), json!("onChange,onDelete"));
    }

    #[test]
    fn rename_rejects_empty_new_path() {
        let cmd = Command::Rename("/a".into(), String::new());
        assert!(cmd.encode(&Tag::from("t1")).is_err());
    }

    #[test]
    fn changelog_get_groups_uses_envelope_level_tag_map() {
        let cmd = Command::ChangelogGetGroups;
        let encoded = cmd.encode(&Tag::from("t1")).unwrap();
        assert_eq!(encoded["tag"]["changelogGetGroups"], json!(["t1"]));
        assert!(encoded["changelogGetGroups"][0].get("tag").is_none());
    }

    #[test]
    fn set_includes_value_and_path() {
        let cmd = Command::Set("/a/b".into(), SetOptions::new(json!(42)));
        let encoded = cmd.encode(&Tag::from("t1")).unwrap();
        assert_eq!(encoded["set"][0]["path"], json!("/a/b"));
        assert_eq!(encoded["set"][0]["value"], json!(42));
        assert_eq!(encoded["set"][0]["tag"], json!("t1"));
        assert_eq!(encoded["set"][0]["create"], json!(false));
    }

    #[test]
    fn set_carries_create_and_type() {
        let cmd = Command::Set(
            "/a/b".into(),
            SetOptions::new(json!(1)).with_create(true).with_type(DataType::Int),
        );
        let encoded = cmd.encode(&Tag::from("t1")).unwrap();
        assert_eq!(encoded["set"][0]["create"], json!(true));
        assert_eq!(encoded["set"][0]["type"], json!("int"));
    }

    #[test]
    fn delete_always_sends_recursive() {
        let cmd = Command::Delete("/a".into(), DeleteOptions::new().with_recursive(false));
        let encoded = cmd.encode(&Tag::from("t1")).unwrap();
        assert_eq!(encoded["delete"][0]["recursive"], json!(false));
    }
}
