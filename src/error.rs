use std::time::Duration;

use crate::response::ResponseCode;

/// Errors surfaced by the public API.
///
/// Server-signalled failures (`code` in `no perm | not found | error`) are
/// *not* represented here — they travel back in-band inside the returned
/// `Response`, per the protocol's error taxonomy. This enum only covers
/// failures that keep a command from ever reaching, or completing against,
/// the wire.
#[derive(Debug, thiserror::Error)]
pub enum DmsError {
    #[error("invalid option \"{field}\": {reason}")]
    Encoding { field: &'static str, reason: String },

    #[error("transport not ready for sending after waiting {0:?}")]
    NotReady(Duration),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to establish websocket connection: {0}")]
    Connect(String),

    #[error("subscribe request for \"{path}\" was rejected by the server: {code:?}{}", .message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
    Subscribe {
        path: String,
        code: ResponseCode,
        message: Option<String>,
    },

    #[error("server returned no response records for this request")]
    EmptyResponse,
}

impl From<tokio_tungstenite::tungstenite::Error> for DmsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DmsError>;
