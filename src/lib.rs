//! Async client for the DMS JSON Data Exchange v1.4 protocol: a
//! bidirectional JSON-over-WebSocket RPC spoken with a building-automation
//! server.
//!
//! The core is a tag-correlated request/response engine ([`pending`]) and
//! a subscription event dispatcher ([`dispatcher`]) sharing one
//! multiplexed connection, fronted by [`Client`].

pub mod client;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod pending;
pub mod response;
pub mod subscription;
pub mod tag;
pub mod transport;
pub mod value;

pub use client::Client;
pub use command::{
    ChangelogReadOptions, DataType, DeleteOptions, EventFlags, ExtInfoFlags, GetOptions,
    SetOptions, SubscribeOptions,
};
pub use config::ClientConfig;
pub use error::{DmsError, Result};
pub use response::{
    ChangelogGetGroupsResponse, ChangelogReadResponse, DpRecord, Event, EventCode, GetResponse,
    PlainResponse, Response, ResponseCode, SubscribeResponse,
};
pub use subscription::Subscription;
pub use tag::Tag;
pub use transport::FakeTransport;
pub use value::{
    Changelog, ChangelogAlarmEntry, ChangelogProtocolEntry, ChangelogQuery, ExtInfos, HistData,
    HistDataQuery, HistPoint, Query, Timestamp, Trendpoint,
};
