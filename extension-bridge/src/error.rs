use std::time::Duration;

use thiserror::Error;

/// Errors surfaced to callers of the bridge.
///
/// Foreign or malformed inbound traffic is never reported here; the router
/// drops it. Only outcomes of an explicit request end up as a `BridgeError`.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The user declined the request in the extension popup
    #[error("User rejected action in extension.")]
    Rejected,

    #[error("extension did not answer the sign request within {0:?}")]
    Timeout(Duration),

    #[error("sign request was cancelled")]
    Cancelled,

    /// A newer sign request took over the pending slot
    #[error("sign request was superseded by a newer request")]
    Superseded,

    #[error("malformed extension message: {0}")]
    Malformed(String),

    #[error("invalid hex in `{field}`: {source}")]
    InvalidHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("failed to post message to host window: {0}")]
    Post(String),

    /// Another bridge already listens on this window
    #[error("an extension bridge is already listening on this window")]
    AlreadyListening,

    /// The bridge was torn down while a request was in flight
    #[error("extension bridge disconnected")]
    Disconnected,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
