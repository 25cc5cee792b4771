//! The [`Caller`] trait: anything that can run a OneBot action.
//!
//! Two implementations exist. [`RpcClient`](crate::RpcClient) multiplexes
//! calls over a WebSocket and correlates replies by `echo`;
//! [`HttpCaller`](crate::HttpCaller) issues one POST per call. Code above
//! this layer (the typed [`Api`](crate::Api), the message encoder) is
//! written against the trait and does not care which one it holds.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use onebridge_protocol::ApiResponse;

use crate::RpcError;

/// Runs one action and returns its `data` payload.
///
/// Implementations must turn a failed reply into [`RpcError::Remote`]
/// (see [`check_reply`]), so callers only ever see successful data.
pub trait Caller: Send + Sync + 'static {
    fn call(
        &self,
        action: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send;
}

impl<C: Caller> Caller for Arc<C> {
    fn call(
        &self,
        action: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send {
        (**self).call(action, params)
    }
}

/// Unwraps a reply frame: `data` on success, [`RpcError::Remote`] when
/// `status` is `"failed"` or `retcode` is nonzero.
pub fn check_reply(
    reply: ApiResponse,
    action: &str,
    params: Value,
) -> Result<Value, RpcError> {
    if reply.is_success() {
        return Ok(reply.data);
    }
    tracing::debug!(action, retcode = reply.retcode, wording = ?reply.wording, "[response] failed");
    Err(RpcError::Remote {
        action: action.to_string(),
        params,
        retcode: reply.retcode,
        wording: reply.wording,
    })
}
