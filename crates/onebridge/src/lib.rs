//! # Onebridge
//!
//! OneBot v11 adapter: connects to a OneBot implementation and speaks a
//! platform-agnostic model on the application side.
//!
//! Applications build a [`Bot`] from a [`BotConfig`] and implement
//! [`EventHandler`]. The crate does the rest: WebSocket or HTTP transport,
//! echo-correlated action calls, encoding outbound content trees into
//! segments and forward bundles, and normalizing inbound events into
//! [`Session`]s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use onebridge::prelude::*;
//!
//! # async fn run() -> Result<(), BridgeError> {
//! let bot = Bot::builder()
//!     .self_id("123456")
//!     .protocol(Protocol::WsReverse { path: "/onebot".into() })
//!     .build()?;
//!
//! let listener = bot.bind_reverse("0.0.0.0:8080").await?;
//! let handler = Arc::new(|bot: Bot, session: Session| async move {
//!     if let (Some(channel), Some(content)) = (&session.channel_id, &session.content) {
//!         let _ = bot.send_message(channel, &[Element::text(content.clone())]).await;
//!     }
//! });
//! bot.serve(listener, handler).await
//! # }
//! ```

mod bot;
mod config;
mod driver;
mod encoder;
mod error;
pub mod logging;

pub use bot::{Bot, Direction, EventHandler, Remote};
pub use config::{BotBuilder, BotConfig, DEFAULT_PATH, Protocol};
pub use encoder::{EncoderOptions, MessageEncoder, Target};
pub use error::BridgeError;

// Re-export sub-crates for advanced usage.
pub use onebridge_protocol as protocol;
pub use onebridge_rpc as rpc;
pub use onebridge_session as session;
pub use onebridge_transport as transport;

pub use onebridge_protocol::{Element, Segment};
pub use onebridge_session::{
    Channel, ChannelType, EventKind, Guild, GuildMember, Login, Message, SentMessage, Session,
    User,
};

/// Convenience re-exports for common usage.
///
/// ```rust
/// use onebridge::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Bot, BotBuilder, BotConfig, BridgeError, Direction, Element, EventHandler, EventKind,
        Message, Protocol, Segment, SentMessage, Session,
    };
}
