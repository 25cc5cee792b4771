//! Error types for the RPC layer.

use serde_json::Value;

use onebridge_protocol::ProtocolError;

/// Errors that can occur while calling an action.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// No connection is attached, so the call was never sent.
    #[error("not connected")]
    NotConnected,

    /// The remote answered with `status: "failed"` or a nonzero retcode.
    ///
    /// The original parameters are kept for diagnostics.
    #[error("action {action} failed with retcode {retcode}: {params}")]
    Remote {
        action: String,
        params: Value,
        retcode: i64,
        wording: Option<String>,
    },

    /// No reply arrived before the deadline.
    #[error("action {action} timed out: {params}")]
    Timeout { action: String, params: Value },

    /// The connection went away while the call was outstanding.
    #[error("connection closed before {action} was answered")]
    ConnectionClosed { action: String },

    /// The call frame could not be built.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The HTTP request itself failed (network, status, body).
    #[error("http request for {action} failed: {source}")]
    Http {
        action: String,
        #[source]
        source: reqwest::Error,
    },

    /// The reply succeeded but `data` did not have the expected shape.
    #[error("unexpected reply to {action}: {source}")]
    UnexpectedReply {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RpcError {
    /// The action the failed call was for, if known.
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::Remote { action, .. }
            | Self::Timeout { action, .. }
            | Self::ConnectionClosed { action }
            | Self::Http { action, .. }
            | Self::UnexpectedReply { action, .. } => Some(action),
            Self::NotConnected | Self::Protocol(_) => None,
        }
    }

    /// The remote retcode for [`RpcError::Remote`].
    pub fn retcode(&self) -> Option<i64> {
        match self {
            Self::Remote { retcode, .. } => Some(*retcode),
            _ => None,
        }
    }
}
