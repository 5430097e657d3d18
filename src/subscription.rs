//! Subscription handles and the listener registry the dispatcher drains
//! against.
//!
//! The original implementation's subscription object holds a strong
//! back-reference to its owning connector. A literal port of that shape
//! into Rust makes `Subscription` and `Client` own each other — a cycle
//! neither `Arc` nor the borrow checker tolerates cleanly. Per the
//! redesign noted in the project's open questions, `Subscription` instead
//! holds only its `{tag, path}` and a cheap-clone [`Client`] handle; it
//! never reaches back into the registry directly.

use std::sync::Arc;

use dashmap::DashMap;

use crate::client::Client;
use crate::command::SubscribeOptions;
use crate::error::Result;
use crate::response::Event;
use crate::tag::Tag;

/// A callback invoked for every event delivered to a subscription. Must
/// not block: the dispatcher runs all listeners for one subscription on
/// its single worker task (see [`crate::dispatcher`]).
pub type Listener = Arc<dyn Fn(Event) + Send + Sync>;

/// Maps each live subscription's tag to its registered listeners. Owned by
/// the dispatcher; the registry itself never touches the transport.
#[derive(Default)]
pub struct SubscriptionRegistry {
    listeners: DashMap<Tag, Vec<Listener>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tag: Tag) {
        self.listeners.entry(tag).or_default();
    }

    pub fn add_listener(&self, tag: &Tag, listener: Listener) {
        if let Some(mut entry) = self.listeners.get_mut(tag) {
            entry.push(listener);
        }
    }

    pub fn remove(&self, tag: &Tag) {
        self.listeners.remove(tag);
    }

    pub fn listeners_for(&self, tag: &Tag) -> Vec<Listener> {
        self.listeners
            .get(tag)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.listeners.contains_key(tag)
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }
}

/// A live server-side subscription. Dropping this handle does not
/// unsubscribe — call [`Subscription::unsubscribe`] explicitly, the same
/// way the original implementation requires an explicit `unsubscribe`
/// call with the subscription's tag.
#[derive(Clone)]
pub struct Subscription {
    tag: Tag,
    path: String,
    client: Client,
}

impl Subscription {
    pub(crate) fn new(tag: Tag, path: String, client: Client) -> Self {
        Self { tag, path, client }
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Registers an additional listener for this subscription's events.
    pub fn on_event(&self, listener: impl Fn(Event) + Send + Sync + 'static) {
        self.client.add_listener(&self.tag, Arc::new(listener));
    }

    /// Cancels this subscription on the server, using this subscription's
    /// own tag (the `unsubscribe` verb requires a caller-supplied tag
    /// naming the subscription to cancel).
    pub async fn unsubscribe(self) -> Result<()> {
        self.client.unsubscribe(self.tag.clone(), &self.path).await
    }

    /// Updates this subscription's query/event filter by reissuing
    /// `subscribe` with the same tag and path, so the server rebinds the
    /// existing subscription in place instead of creating a new one.
    /// `options` carries only the filter (`query`/`event`) — the path and
    /// tag always come from this subscription, so a caller has no way to
    /// retarget it through `update`.
    pub async fn update(&self, options: SubscribeOptions) -> Result<()> {
        self.client
            .update_subscription(&self.tag, &self.path, options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_for_unregistered_tag_is_empty() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.listeners_for(&Tag::new()).is_empty());
    }

    #[test]
    fn registers_and_clears() {
        let registry = SubscriptionRegistry::new();
        let tag = Tag::new();
        registry.register(tag.clone());
        assert!(registry.contains(&tag));
        registry.remove(&tag);
        assert!(!registry.contains(&tag));
    }
}
