//! Error types for the session layer.

/// Errors that can occur while normalizing an inbound event.
///
/// Unknown notice kinds and heartbeats are not errors: the normalizer
/// returns `Ok(None)` for them.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The body lacks the common header (`post_type`, `time`, `self_id`)
    /// or is not a JSON object at all.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// A recognized event whose type-specific fields are missing or of
    /// the wrong type.
    #[error("malformed event: {0}")]
    Decode(#[from] serde_json::Error),

    /// A well-formed event the adapter deliberately does not handle,
    /// e.g. `message_sent` echoes of the bot's own messages.
    #[error("unsupported event: {0}")]
    Unsupported(String),
}
