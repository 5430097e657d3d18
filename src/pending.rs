//! The pending-response table: one rendezvous slot per in-flight command,
//! keyed by its correlation tag.
//!
//! Grounded on the `PendingRequests` map and `send_request`/`notify_pending`
//! pair in the teacher's websocket client, adapted from an `mpsc`-based
//! rendezvous to a one-shot `tokio::sync::oneshot` slot (each tag resolves
//! exactly once) and from a `Mutex<HashMap<..>>` to a `DashMap` so the
//! receive task never blocks on a lock held by a caller.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time;

use crate::error::{DmsError, Result};
use crate::response::Response;
use crate::tag::Tag;

/// Table of in-flight commands awaiting a response.
#[derive(Default)]
pub struct PendingTable {
    slots: DashMap<Tag, oneshot::Sender<Response>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a slot for `tag` before the request is sent, so a reply
    /// racing ahead of the caller's own `take` call is never missed.
    pub fn reserve(&self, tag: Tag) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.slots.insert(tag, tx);
        rx
    }

    /// Delivers a completion to whoever is waiting on `tag`. Returns
    /// `false` when nothing was waiting — the slot already timed out and
    /// was pruned, or the server echoed a tag we never reserved.
    pub fn complete(&self, tag: &Tag, response: Response) -> bool {
        match self.slots.remove(tag) {
            Some((_, tx)) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Awaits the reserved slot, eagerly removing it on timeout so a late
    /// server reply can never resurrect a call the caller has given up on.
    pub async fn take(
        &self,
        tag: &Tag,
        rx: oneshot::Receiver<Response>,
        timeout: Duration,
    ) -> Result<Response> {
        match time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_canceled)) => Err(DmsError::ConnectionClosed),
            Err(_elapsed) => {
                self.slots.remove(tag);
                Err(DmsError::Timeout(timeout))
            }
        }
    }

    /// Drops every pending slot, e.g. on disconnect. Every caller still
    /// waiting observes a closed channel and surfaces
    /// [`DmsError::ConnectionClosed`].
    pub fn close(&self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{PlainResponse, ResponseCode};

    fn ok() -> Response {
        Response::Set(PlainResponse {
            code: ResponseCode::Ok,
            message: None,
        })
    }

    #[tokio::test]
    async fn completes_a_reserved_slot() {
        let table = PendingTable::new();
        let tag = Tag::new();
        let rx = table.reserve(tag.clone());
        assert!(table.complete(&tag, ok()));
        let response = table.take(&tag, rx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(response.code(), &ResponseCode::Ok);
    }

    #[tokio::test]
    async fn completing_an_unknown_tag_is_a_noop() {
        let table = PendingTable::new();
        assert!(!table.complete(&Tag::new(), ok()));
    }

    #[tokio::test]
    async fn timeout_prunes_the_slot() {
        let table = PendingTable::new();
        let tag = Tag::new();
        let rx = table.reserve(tag.clone());
        let err = table
            .take(&tag, rx, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DmsError::Timeout(_)));
        assert!(table.is_empty());
        assert!(!table.complete(&tag, ok()));
    }

    #[tokio::test]
    async fn close_wakes_every_waiter_with_connection_closed() {
        let table = PendingTable::new();
        let tag = Tag::new();
        let rx = table.reserve(tag.clone());
        table.close();
        let err = table.take(&tag, rx, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, DmsError::ConnectionClosed));
    }
}
