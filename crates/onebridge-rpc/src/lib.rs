//! Action calls for Onebridge.
//!
//! A OneBot implementation exposes its functionality as named actions
//! (`send_group_msg`, `get_msg`, ...). This crate runs them:
//!
//! 1. **Persistent mode** ([`RpcClient`]): many concurrent calls share one
//!    WebSocket; replies are matched to calls by the `echo` field, with a
//!    per-call deadline.
//! 2. **Request/response mode** ([`HttpCaller`]): one HTTP POST per call.
//! 3. **Typed API** ([`Api`]): parameter building and reply decoding for
//!    the actions the adapter needs, over either mode.

mod api;
mod caller;
mod client;
mod error;
mod http;

pub use api::Api;
pub use caller::{Caller, check_reply};
pub use client::{DEFAULT_TIMEOUT, RpcClient};
pub use error::RpcError;
pub use http::HttpCaller;
