//! The wire boundary: an object-safe trait abstracting "send one text
//! frame" / "receive one text frame", a `tokio-tungstenite`-backed
//! implementation, and an in-memory fake used by the test suite so the
//! correlation and dispatch logic can be exercised without a real server.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{DmsError, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One full-duplex text-frame channel. `recv` returns `None` once the
/// underlying connection is closed, mirroring a stream's end-of-iteration.
pub trait Transport: Send + Sync {
    fn send(&self, frame: String) -> BoxFuture<'_, Result<()>>;
    fn recv(&self) -> BoxFuture<'_, Option<String>>;
    fn close(&self) -> BoxFuture<'_, ()>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Real transport, backed by a `tokio-tungstenite` client connection.
pub struct WsTransport {
    sink: Mutex<futures_util::stream::SplitSink<WsStream, Message>>,
    stream: Mutex<futures_util::stream::SplitStream<WsStream>>,
}

impl WsTransport {
    pub async fn connect(url: &url::Url) -> Result<Self> {
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| DmsError::Connect(e.to_string()))?;
        let (sink, stream) = ws.split();
        Ok(Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

impl Transport for WsTransport {
    fn send(&self, frame: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(frame.into())).await?;
            Ok(())
        })
    }

    fn recv(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            let mut stream = self.stream.lock().await;
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => return None,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "websocket stream error; treating as closed");
                        return None;
                    }
                }
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut sink = self.sink.lock().await;
            let _ = sink.close().await;
        })
    }
}

/// In-memory transport used by tests: frames sent by the client land on
/// `sent`, and frames pushed onto `inbound` are handed back from `recv`.
pub struct FakeTransport {
    outbound: Mutex<tokio::sync::mpsc::UnboundedSender<String>>,
    inbound: Mutex<tokio::sync::mpsc::UnboundedReceiver<String>>,
}

impl FakeTransport {
    /// Builds a connected pair: `(transport, server_side)`, where
    /// `server_side.0` receives everything the client sends and
    /// `server_side.1` feeds frames back to the client.
    pub fn pair() -> (
        Arc<Self>,
        (
            tokio::sync::mpsc::UnboundedReceiver<String>,
            tokio::sync::mpsc::UnboundedSender<String>,
        ),
    ) {
        let (out_tx, out_rx) = tokio::sync::mpsc::unbounded_channel();
        let (in_tx, in_rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            outbound: Mutex::new(out_tx),
            inbound: Mutex::new(in_rx),
        });
        (transport, (out_rx, in_tx))
    }
}

impl Transport for FakeTransport {
    fn send(&self, frame: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let sender = self.outbound.lock().await;
            sender
                .send(frame)
                .map_err(|_| DmsError::ConnectionClosed)?;
            Ok(())
        })
    }

    fn recv(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            let mut inbound = self.inbound.lock().await;
            inbound.recv().await
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {})
    }
}
