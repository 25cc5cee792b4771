//! Error types for the protocol layer.
//!
//! Each crate in Onebridge defines its own error enum. A `ProtocolError`
//! always means a frame could not be turned into (or out of) JSON, never
//! a networking or remote-side failure.
//!
//! Markup is deliberately absent here: malformed CQ codes are not an
//! error, they simply stay literal text.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into a JSON frame).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning a JSON frame into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or a
    /// field of the wrong type.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame is valid JSON but violates the OneBot shape, e.g. an
    /// event without `post_type`.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}
