//! The public client facade: connects, sends commands and awaits their
//! correlated responses, and hands out subscription handles whose events
//! flow through the dispatcher.
//!
//! Grounded on `WebsocketClient` in the teacher's websocket client —
//! `connect_ws`/`send_request`/the background `reader_handle` task — with
//! the request/response correlation now delegated to [`crate::pending`]
//! and event fan-out to [`crate::dispatcher`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::command::{
    ChangelogReadOptions, Command, DeleteOptions, GetOptions, SetOptions, SubscribeOptions,
};
use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{DmsError, Result};
use crate::pending::PendingTable;
use crate::response::{
    self, ChangelogGetGroupsResponse, ChangelogReadResponse, GetResponse, PlainResponse, Response,
    SubscribeResponse,
};
use crate::subscription::{Listener, Subscription, SubscriptionRegistry};
use crate::tag::Tag;
use crate::transport::{Transport, WsTransport};

struct Inner {
    transport: Arc<dyn Transport>,
    pending: PendingTable,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    config: ClientConfig,
    ready: Notify,
    ready_flag: AtomicBool,
}

/// Cheap-clone handle to a connected client. Every clone shares the same
/// underlying connection, pending table, and subscription registry — this
/// is what lets [`Subscription`] carry a handle back to the client without
/// creating an ownership cycle.
#[derive(Clone)]
pub struct Client(Arc<Inner>);

impl Client {
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let url = config.ws_url().map_err(|e| DmsError::Connect(e.to_string()))?;
        let transport: Arc<dyn Transport> = Arc::new(WsTransport::connect(&url).await?);
        Ok(Self::from_transport(transport, config))
    }

    fn from_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::spawn(registry.clone(), cancel.clone());
        let inner = Arc::new(Inner {
            transport,
            pending: PendingTable::new(),
            registry,
            dispatcher,
            cancel,
            config,
            ready: Notify::new(),
            ready_flag: AtomicBool::new(false),
        });
        let client = Self(inner);
        client.spawn_receive_loop();
        client.0.ready_flag.store(true, Ordering::Release);
        client.0.ready.notify_waiters();
        client
    }

    /// Builds a client wired to an in-memory [`crate::transport::FakeTransport`]
    /// instead of a real socket, returning the server-side ends so a test
    /// can observe outgoing frames and feed back replies. Exposed publicly
    /// so integration tests outside this crate can drive full client
    /// scenarios without a live server.
    pub fn from_fake(
        config: ClientConfig,
    ) -> (
        Self,
        (
            tokio::sync::mpsc::UnboundedReceiver<String>,
            tokio::sync::mpsc::UnboundedSender<String>,
        ),
    ) {
        let (transport, io) = crate::transport::FakeTransport::pair();
        (Self::from_transport(transport, config), io)
    }

    fn spawn_receive_loop(&self) {
        let inner = self.0.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = inner.cancel.cancelled() => break,
                    frame = inner.transport.recv() => {
                        let Some(text) = frame else { break };
                        match response::decode_frame(&text) {
                            Ok(decoded) => {
                                for (tag, resp) in decoded.completions {
                                    inner.pending.complete(&tag, resp);
                                }
                                for event in decoded.events {
                                    inner.dispatcher.push(event).await;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "dropping malformed inbound frame");
                            }
                        }
                    }
                }
            }
            inner.pending.close();
        });
    }

    async fn wait_ready(&self) -> Result<()> {
        if self.0.ready_flag.load(Ordering::Acquire) {
            return Ok(());
        }
        let notified = self.0.ready.notified();
        tokio::time::timeout(self.0.config.send_grace, notified)
            .await
            .map_err(|_| DmsError::NotReady(self.0.config.send_grace))
    }

    async fn call_with_tag(&self, command: Command, tag: Tag) -> Result<Response> {
        self.wait_ready().await?;
        let rx = self.0.pending.reserve(tag.clone());
        let envelope = command.encode(&tag)?;
        self.0.transport.send(envelope.to_string()).await?;
        self.0
            .pending
            .take(&tag, rx, self.0.config.request_timeout)
            .await
    }

    async fn call(&self, command: Command) -> Result<Response> {
        self.call_with_tag(command, Tag::new()).await
    }

    pub async fn dp_get(
        &self,
        path: impl Into<String>,
        options: GetOptions,
    ) -> Result<GetResponse> {
        match self.call(Command::Get(path.into(), options)).await? {
            Response::Get(r) => Ok(r),
            _ => unreachable!("get always resolves to a Get response"),
        }
    }

    pub async fn dp_set(
        &self,
        path: impl Into<String>,
        options: SetOptions,
    ) -> Result<PlainResponse> {
        match self.call(Command::Set(path.into(), options)).await? {
            Response::Set(r) => Ok(r),
            _ => unreachable!("set always resolves to a Set response"),
        }
    }

    pub async fn dp_rename(
        &self,
        path: impl Into<String>,
        new_path: impl Into<String>,
    ) -> Result<PlainResponse> {
        match self
            .call(Command::Rename(path.into(), new_path.into()))
            .await?
        {
            Response::Rename(r) => Ok(r),
            _ => unreachable!("rename always resolves to a Rename response"),
        }
    }

    pub async fn dp_delete(
        &self,
        path: impl Into<String>,
        options: DeleteOptions,
    ) -> Result<PlainResponse> {
        match self.call(Command::Delete(path.into(), options)).await? {
            Response::Delete(r) => Ok(r),
            _ => unreachable!("delete always resolves to a Delete response"),
        }
    }

    pub async fn changelog_get_groups(&self) -> Result<ChangelogGetGroupsResponse> {
        match self.call(Command::ChangelogGetGroups).await? {
            Response::ChangelogGetGroups(r) => Ok(r),
            _ => unreachable!("changelogGetGroups always resolves to itself"),
        }
    }

    pub async fn changelog_read(
        &self,
        options: ChangelogReadOptions,
    ) -> Result<ChangelogReadResponse> {
        match self.call(Command::ChangelogRead(options)).await? {
            Response::ChangelogRead(r) => Ok(r),
            _ => unreachable!("changelogRead always resolves to a ChangelogRead response"),
        }
    }

    /// Subscribes to `path`, returning a handle whose tag uniquely
    /// identifies this subscription until explicitly cancelled with
    /// [`Subscription::unsubscribe`].
    pub async fn subscribe(
        &self,
        path: impl Into<String>,
        options: SubscribeOptions,
    ) -> Result<Subscription> {
        let path = path.into();
        let tag = Tag::new();
        self.0.registry.register(tag.clone());

        let response = match self
            .call_with_tag(Command::Subscribe(path.clone(), options), tag.clone())
            .await
        {
            Ok(r) => r,
            Err(err) => {
                self.0.registry.remove(&tag);
                return Err(err);
            }
        };

        let Response::Subscribe(SubscribeResponse { code, message, .. }) = response else {
            unreachable!("subscribe always resolves to a Subscribe response")
        };
        if !code.is_ok() {
            self.0.registry.remove(&tag);
            return Err(DmsError::Subscribe {
                path,
                code,
                message,
            });
        }

        Ok(Subscription::new(tag, path, self.clone()))
    }

    pub(crate) fn add_listener(&self, tag: &Tag, listener: Listener) {
        self.0.registry.add_listener(tag, listener);
    }

    /// Rebinds an existing subscription's filter in place by reissuing
    /// `subscribe` with its own tag and path. Listeners already registered
    /// for this tag are untouched — only the server-side filter changes.
    pub(crate) async fn update_subscription(
        &self,
        tag: &Tag,
        path: &str,
        options: SubscribeOptions,
    ) -> Result<()> {
        let response = self
            .call_with_tag(Command::Subscribe(path.to_owned(), options), tag.clone())
            .await?;
        let Response::Subscribe(SubscribeResponse { code, message, .. }) = response else {
            unreachable!("subscribe always resolves to a Subscribe response")
        };
        if !code.is_ok() {
            return Err(DmsError::Subscribe {
                path: path.to_owned(),
                code,
                message,
            });
        }
        Ok(())
    }

    /// Cancels a subscription, using its own tag — `unsubscribe` is the
    /// one verb the protocol requires a caller-supplied tag for.
    pub(crate) async fn unsubscribe(&self, tag: Tag, path: &str) -> Result<()> {
        let response = self
            .call_with_tag(Command::Unsubscribe(path.to_owned()), tag.clone())
            .await?;
        self.0.registry.remove(&tag);
        match response {
            Response::Unsubscribe(r) if r.code.is_ok() => Ok(()),
            Response::Unsubscribe(r) => Err(DmsError::Subscribe {
                path: path.to_owned(),
                code: r.code,
                message: r.message,
            }),
            _ => unreachable!("unsubscribe always resolves to an Unsubscribe response"),
        }
    }

    /// Tears down the connection: stops the receive and dispatch tasks,
    /// drains any still-pending requests with [`DmsError::ConnectionClosed`],
    /// and closes the transport. Subscriptions are not implicitly
    /// unsubscribed server-side; only local bookkeeping is cleared.
    pub async fn close(&self) {
        self.0.cancel.cancel();
        self.0.pending.close();
        self.0.registry.clear();
        self.0.transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dp_set_round_trips_through_the_fake_transport() {
        let (client, (mut sent, feed)) = Client::from_fake(ClientConfig::new());

        let call = tokio::spawn({
            let client = client.clone();
            async move {
                client
                    .dp_set("/a/b", SetOptions::new(serde_json::json!(1)))
                    .await
            }
        });

        let outgoing = sent.recv().await.unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&outgoing).unwrap();
        let tag = envelope["set"][0]["tag"].as_str().unwrap().to_owned();

        feed.send(format!(r#"{{"set":[{{"tag":"{tag}","code":"ok"}}]}}"#))
            .unwrap();

        let response = call.await.unwrap().unwrap();
        assert!(response.code.is_ok());
    }

    #[tokio::test]
    async fn subscribe_rejects_on_non_ok_code() {
        let (client, (mut sent, feed)) = Client::from_fake(ClientConfig::new());

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.subscribe("/a", SubscribeOptions::default()).await }
        });

        let outgoing = sent.recv().await.unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&outgoing).unwrap();
        let tag = envelope["subscribe"][0]["tag"].as_str().unwrap().to_owned();

        feed.send(format!(
            r#"{{"subscribe":[{{"tag":"{tag}","code":"no perm","message":"denied"}}]}}"#
        ))
        .unwrap();

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, DmsError::Subscribe { .. }));
    }
}
