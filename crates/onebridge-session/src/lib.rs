//! Inbound event normalization for Onebridge.
//!
//! This crate turns what a OneBot implementation pushes into the
//! platform-agnostic model applications consume:
//!
//! 1. **Canonical model**: [`Session`], [`EventKind`], [`Message`] and
//!    the resource records ([`User`], [`Guild`], [`Channel`],
//!    [`GuildMember`]).
//! 2. **Decoding** ([`decode`]): segments to content-tree elements, info
//!    payloads to resources, messages with their quoted message.
//! 3. **Normalization** ([`Normalizer`]): one raw event in, at most one
//!    session out.
//!
//! # How it fits in the stack
//!
//! ```text
//! Bot (above)             ← dispatches sessions to the application
//!     ↕
//! Session (this crate)    ← classifies and decodes events
//!     ↕
//! Protocol + RPC (below)  ← typed events, get_msg for quotes
//! ```

pub mod decode;
mod error;
mod normalizer;
mod session;

pub use error::SessionError;
pub use normalizer::Normalizer;
pub use session::{
    Channel, ChannelType, EventKind, Guild, GuildMember, Login, Message, PRIVATE_PREFIX,
    SentMessage, Session, User, private_channel,
};
