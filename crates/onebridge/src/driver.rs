//! Per-connection driver: frame demux between the RPC core and the
//! normalizer.
//!
//! Each WebSocket connection (forward or reverse) runs here until it
//! closes:
//!   1. Attach an outbound queue to the bot's [`RpcClient`] and spawn
//!      the writer task draining it into the socket
//!   2. Fetch the login info in the background and report the bot online
//!   3. Loop: receive frames → events to the handler, replies to the
//!      pending call they answer
//!
//! When the loop ends, every call still waiting fails with
//! `ConnectionClosed`.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use onebridge_protocol::{ApiResponse, Codec, JsonCodec};
use onebridge_rpc::RpcClient;
use onebridge_transport::{Connection, WebSocketConnection};

use crate::{Bot, BridgeError, EventHandler};

/// Detaches the RPC client when the driver exits, even by panic or
/// cancellation.
struct CloseGuard {
    rpc: RpcClient,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.rpc.close();
    }
}

/// What an inbound frame turned out to be.
#[derive(Debug)]
pub(crate) enum Inbound {
    Event(Value),
    Reply(ApiResponse),
    Ignored(&'static str),
}

/// Sorts one text frame: objects with `post_type` are events, objects
/// with `echo` are call replies, anything else is ignored.
pub(crate) fn classify(frame: &str) -> Inbound {
    let Ok(value) = JsonCodec.decode::<Value>(frame) else {
        return Inbound::Ignored("invalid JSON");
    };
    if value.get("post_type").is_some() {
        return Inbound::Event(value);
    }
    if value.get("echo").is_some() {
        return match ApiResponse::deserialize(&value) {
            Ok(reply) => Inbound::Reply(reply),
            Err(_) => Inbound::Ignored("malformed reply"),
        };
    }
    Inbound::Ignored("neither event nor reply")
}

/// Runs one connection from attach to close.
pub(crate) async fn run<H: EventHandler>(
    bot: Bot,
    conn: WebSocketConnection,
    handler: Arc<H>,
) -> Result<(), BridgeError> {
    let rpc = bot
        .rpc()
        .cloned()
        .ok_or_else(|| BridgeError::Config("http bots have no WebSocket connection".into()))?;
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, self_id = bot.self_id(), "handling connection");

    // --- Step 1: outbound ---
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    rpc.attach(tx);
    let _guard = CloseGuard { rpc: rpc.clone() };

    let writer = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = conn.send(&frame).await {
                    tracing::debug!(%conn_id, error = %e, "send failed");
                    break;
                }
            }
        })
    };

    // --- Step 2: online ---
    {
        let bot = bot.clone();
        tokio::spawn(async move {
            match bot.get_login().await {
                Ok(login) => tracing::info!(
                    self_id = %login.self_id,
                    name = login.user.name.as_deref().unwrap_or_default(),
                    "bot online"
                ),
                Err(e) => tracing::warn!(self_id = bot.self_id(), error = %e, "get_login failed"),
            }
        });
    }

    // --- Step 3: inbound ---
    loop {
        let frame = match conn.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        match classify(&frame) {
            Inbound::Event(value) => {
                tokio::spawn(dispatch(bot.clone(), Arc::clone(&handler), value));
            }
            Inbound::Reply(reply) => {
                if !rpc.resolve(reply) {
                    tracing::debug!(%conn_id, "unmatched reply");
                }
            }
            Inbound::Ignored(reason) => {
                tracing::debug!(%conn_id, reason, "dropping frame");
            }
        }
    }

    writer.abort();
    // _guard drops here → pending calls fail.
    Ok(())
}

/// Normalizes one event and hands the session to the application.
pub(crate) async fn dispatch<H: EventHandler>(bot: Bot, handler: Arc<H>, value: Value) {
    match bot.normalizer().normalize(value).await {
        Ok(Some(session)) => {
            tracing::debug!(kind = %session.kind, "[receive]");
            handler.on_session(&bot, session).await;
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "failed to normalize event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_event_by_post_type() {
        let inbound = classify(r#"{"post_type":"meta_event","time":1,"self_id":1}"#);
        assert!(matches!(inbound, Inbound::Event(_)));
    }

    #[test]
    fn test_classify_reply_by_echo() {
        let inbound = classify(r#"{"status":"ok","retcode":0,"data":null,"echo":"3"}"#);
        match inbound {
            Inbound::Reply(reply) => assert_eq!(reply.echo_id(), Some(3)),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_garbage_is_ignored() {
        assert!(matches!(classify("not json"), Inbound::Ignored("invalid JSON")));
        assert!(matches!(classify(r#"{"post_type":"#), Inbound::Ignored("invalid JSON")));
        assert!(matches!(classify(r#"{"hello":1}"#), Inbound::Ignored(_)));
        assert!(matches!(classify(r#"{"echo":1}"#), Inbound::Ignored(_)));
    }
}
