//! Wire protocol for Onebridge.
//!
//! This crate defines the "language" spoken with a OneBot implementation:
//!
//! - **Types** ([`Segment`], [`MessageBody`], [`ApiRequest`],
//!   [`ApiResponse`]): the frames and message parts on the wire.
//! - **Events** ([`Event`] and friends): inbound pushes, decoded into
//!   nested tagged enums.
//! - **Markup** ([`cqcode`]): the CQ-code inline format embedded in
//!   message strings.
//! - **Content tree** ([`Element`]): the platform-agnostic shape that
//!   applications read and write.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): frames to and from text.
//!
//! # Architecture
//!
//! ```text
//! Transport (text frames) → Protocol (ApiResponse / Event) → Session (canonical)
//! ```

mod codec;
pub mod cqcode;
mod element;
mod error;
mod event;
mod info;
mod types;

pub use codec::{Codec, JsonCodec};
pub use element::{render, Element};
pub use error::ProtocolError;
pub use event::{
    Event, EventHeader, MessageEvent, MessageType, NoticeEvent, NotifyEvent, RequestEvent, Sender,
};
pub use info::{
    DownloadedFile, FriendInfo, GroupInfo, GroupMemberInfo, LoginInfo, MessageId, StrangerInfo,
};
pub use types::{ApiRequest, ApiResponse, MessageBody, Segment};
