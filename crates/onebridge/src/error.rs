//! Unified error type for Onebridge.

use onebridge_protocol::ProtocolError;
use onebridge_rpc::RpcError;
use onebridge_session::SessionError;
use onebridge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `onebridge` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A transport-level error (connect, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An action call failed (not connected, remote error, timeout).
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// An inbound event could not be normalized.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The configuration cannot produce a working bot.
    #[error("invalid config: {0}")]
    Config(String),

    /// A channel, guild, user or message id is not numeric.
    #[error("invalid id: {0:?}")]
    InvalidId(String),

    /// A `file` element whose source cannot be uploaded.
    #[error("invalid file source: {0}")]
    InvalidFile(String),

    /// The operation is not available, e.g. a pagination direction
    /// OneBot cannot serve.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A webhook body addressed to another account.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

/// Parses a canonical (string) id into a OneBot number.
pub(crate) fn parse_id(id: &str) -> Result<i64, BridgeError> {
    id.parse().map_err(|_| BridgeError::InvalidId(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let bridge_err: BridgeError = err.into();
        assert!(matches!(bridge_err, BridgeError::Transport(_)));
        assert!(bridge_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_rpc_error() {
        let bridge_err: BridgeError = RpcError::NotConnected.into();
        assert!(matches!(bridge_err, BridgeError::Rpc(_)));
        assert_eq!(bridge_err.to_string(), "not connected");
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::InvalidEvent("no header".into());
        let bridge_err: BridgeError = err.into();
        assert!(matches!(bridge_err, BridgeError::Session(_)));
    }

    #[test]
    fn test_parse_id_rejects_non_numeric() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(matches!(parse_id("private:1"), Err(BridgeError::InvalidId(_))));
    }
}
