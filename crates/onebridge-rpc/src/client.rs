//! Echo-correlated calls over a persistent connection.
//!
//! Every call gets a fresh integer `echo`. The call frame is pushed onto
//! the attached outbound channel, and a oneshot sender is parked in the
//! pending table under that echo. The connection's read loop hands each
//! reply frame to [`RpcClient::resolve`], which removes the entry and
//! wakes the waiting caller.
//!
//! Each call ends exactly one way: its reply, its deadline, or the
//! connection closing. Whichever happens first removes the pending entry;
//! the others find nothing to do.
//!
//! ```text
//! call("get_msg") ──frame──▶ sink ──▶ writer task ──▶ socket
//!      │                                                │
//!      └─ waits on oneshot ◀── resolve(reply) ◀── read loop
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use onebridge_protocol::{ApiRequest, ApiResponse, Codec, JsonCodec};

use crate::{Caller, RpcError, check_reply};

/// How long a call waits for its reply unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Marker sent to pending calls when the connection goes away.
#[derive(Debug)]
struct Disconnected;

type PendingReply = oneshot::Sender<Result<ApiResponse, Disconnected>>;

struct Inner {
    next_echo: AtomicU64,
    pending: Mutex<HashMap<u64, PendingReply>>,
    sink: Mutex<Option<mpsc::UnboundedSender<String>>>,
    timeout: Duration,
    codec: JsonCodec,
}

impl Inner {
    // Neither lock is ever held across an `.await`, so a std mutex is
    // enough and lets the drop guard below clean up synchronously.
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, PendingReply>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the pending entry when the call finishes or is cancelled.
struct PendingGuard<'a> {
    inner: &'a Inner,
    echo: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending().remove(&self.echo);
    }
}

/// The correlation table for one bot.
///
/// Cheap to clone: all clones share the same table, echo counter and
/// outbound sink. Two `RpcClient::new` calls never share state.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

impl RpcClient {
    /// Creates a detached client whose calls wait at most `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_echo: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                sink: Mutex::new(None),
                timeout,
                codec: JsonCodec,
            }),
        }
    }

    /// The per-call deadline.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Routes outbound call frames into `sink`, replacing any previous one.
    pub fn attach(&self, sink: mpsc::UnboundedSender<String>) {
        *self.inner.sink() = Some(sink);
    }

    /// Returns `true` while an outbound sink is attached.
    pub fn is_attached(&self) -> bool {
        self.inner.sink().is_some()
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_len(&self) -> usize {
        self.inner.pending().len()
    }

    /// Delivers a reply frame to the call that is waiting for it.
    ///
    /// Returns `false` when nobody is waiting: the echo is missing or
    /// unknown, or the call already timed out. Such replies are dropped.
    pub fn resolve(&self, reply: ApiResponse) -> bool {
        let Some(echo) = reply.echo_id() else {
            tracing::debug!("dropping reply without a numeric echo");
            return false;
        };
        let Some(tx) = self.inner.pending().remove(&echo) else {
            tracing::debug!(echo, "dropping reply for unknown or expired call");
            return false;
        };
        // The receiver is gone only if the caller was cancelled.
        tx.send(Ok(reply)).is_ok()
    }

    /// Detaches the sink and fails every outstanding call with
    /// [`RpcError::ConnectionClosed`]. Returns how many were failed.
    pub fn close(&self) -> usize {
        self.inner.sink().take();
        let drained: Vec<_> = self.inner.pending().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(Disconnected));
        }
        if count > 0 {
            tracing::debug!(count, "failed outstanding calls on close");
        }
        count
    }

    /// Sends one call frame and waits for the raw reply.
    pub async fn request(
        &self,
        action: &str,
        params: Value,
    ) -> Result<ApiResponse, RpcError> {
        if !self.is_attached() {
            return Err(RpcError::NotConnected);
        }

        let echo = self.inner.next_echo.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = self.inner.codec.encode(&ApiRequest {
            action: action.to_string(),
            params: params.clone(),
            echo,
        })?;

        // Register under the sink lock: `close` either detaches first and
        // the call fails here, or finds this entry when it drains.
        let (tx, rx) = oneshot::channel();
        let sink = {
            let sink = self.inner.sink();
            let Some(sink) = sink.as_ref() else {
                return Err(RpcError::NotConnected);
            };
            self.inner.pending().insert(echo, tx);
            sink.clone()
        };
        let _guard = PendingGuard {
            inner: &self.inner,
            echo,
        };

        tracing::debug!(echo, action, "[request]");
        if sink.send(frame).is_err() {
            return Err(RpcError::ConnectionClosed {
                action: action.to_string(),
            });
        }

        match tokio::time::timeout(self.inner.timeout, rx).await {
            Ok(Ok(Ok(reply))) => {
                tracing::debug!(echo, action, retcode = reply.retcode, "[response]");
                Ok(reply)
            }
            Ok(Ok(Err(Disconnected))) | Ok(Err(_)) => Err(RpcError::ConnectionClosed {
                action: action.to_string(),
            }),
            Err(_) => {
                tracing::warn!(echo, action, "call timed out");
                Err(RpcError::Timeout {
                    action: action.to_string(),
                    params,
                })
            }
        }
    }
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Caller for RpcClient {
    async fn call(&self, action: &str, params: Value) -> Result<Value, RpcError> {
        let reply = self.request(action, params.clone()).await?;
        check_reply(reply, action, params)
    }
}
