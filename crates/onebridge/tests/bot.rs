//! End-to-end tests for the bot.
//!
//! The WebSocket tests play the OneBot implementation with a raw
//! `tokio-tungstenite` socket: they answer action frames by echo and push
//! event frames, so every byte crosses a real socket. HTTP mode runs
//! against a `mockito` server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use onebridge::prelude::*;
use onebridge::rpc::RpcError;
use onebridge::session::SessionError;

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const SELF_ID: &str = "10001";

// =========================================================================
// Helpers
// =========================================================================

/// Starts a reverse-WS bot and returns it, its address, and the stream of
/// sessions its handler receives.
async fn start_reverse() -> (Bot, String, mpsc::UnboundedReceiver<Session>) {
    let bot = Bot::builder()
        .self_id(SELF_ID)
        .response_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let listener = bot.bind_reverse("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let (tx, rx) = mpsc::unbounded_channel();
    let handler = Arc::new(move |_bot: Bot, session: Session| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(session);
        }
    });
    let serving = bot.clone();
    tokio::spawn(async move {
        let _ = serving.serve(listener, handler).await;
    });
    (bot, addr, rx)
}

/// Dials the bot the way a OneBot implementation would.
async fn dial(addr: &str, role: &str) -> Result<Ws, tokio_tungstenite::tungstenite::Error> {
    let mut request = format!("ws://{addr}/onebot").into_client_request().unwrap();
    let headers = request.headers_mut();
    headers.insert("X-Client-Role", role.parse().unwrap());
    headers.insert("X-Self-ID", SELF_ID.parse().unwrap());
    tokio_tungstenite::connect_async(request).await.map(|(ws, _)| ws)
}

/// Reads call frames until one for `action` arrives, answering the
/// background `get_login_info` call on the way.
async fn expect_call(ws: &mut Ws, action: &str) -> (Value, Value) {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a call")
            .unwrap()
            .unwrap();
        let frame: Value = serde_json::from_str(&msg.into_text().unwrap()).unwrap();
        let echo = frame["echo"].clone();
        match frame["action"].as_str().unwrap() {
            a if a == action => return (echo, frame["params"].clone()),
            "get_login_info" => {
                reply(ws, &echo, json!({"user_id": 10001, "nickname": "bot"})).await;
            }
            other => panic!("unexpected call {other}"),
        }
    }
}

async fn reply(ws: &mut Ws, echo: &Value, data: Value) {
    let frame = json!({"status": "ok", "retcode": 0, "data": data, "echo": echo});
    ws.send(WsMessage::text(frame.to_string())).await.unwrap();
}

async fn push(ws: &mut Ws, event: Value) {
    ws.send(WsMessage::text(event.to_string())).await.unwrap();
}

fn group_message(text: &str) -> Value {
    json!({
        "post_type": "message", "message_type": "group", "sub_type": "normal",
        "time": 1700000000, "self_id": 10001,
        "message_id": 55, "group_id": 100, "user_id": 7,
        "message": text, "raw_message": text,
        "sender": {"user_id": 7, "nickname": "bob", "role": "member"}
    })
}

async fn next_session(rx: &mut mpsc::UnboundedReceiver<Session>) -> Session {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a session")
        .expect("handler channel closed")
}

// =========================================================================
// Reverse WebSocket
// =========================================================================

#[tokio::test]
async fn test_reverse_event_reaches_handler() {
    let (_bot, addr, mut sessions) = start_reverse().await;
    let mut ws = dial(&addr, "Universal").await.unwrap();
    expect_call(&mut ws, "get_login_info").await;

    push(&mut ws, json!({"post_type": "meta_event", "meta_event_type": "heartbeat",
        "time": 1, "self_id": 10001})).await;
    push(&mut ws, group_message("hello")).await;

    let session = next_session(&mut sessions).await;
    assert_eq!(session.kind, EventKind::Message);
    assert_eq!(session.channel_id.as_deref(), Some("100"));
    assert_eq!(session.user_id.as_deref(), Some("7"));
    assert_eq!(session.content.as_deref(), Some("hello"));
    assert_eq!(session.timestamp, 1_700_000_000_000);
}

#[tokio::test]
async fn test_reverse_send_message_round_trips_by_echo() {
    let (bot, addr, _sessions) = start_reverse().await;
    let mut ws = dial(&addr, "Universal").await.unwrap();
    let (echo, _) = expect_call(&mut ws, "get_login_info").await;
    reply(&mut ws, &echo, json!({"user_id": 10001, "nickname": "bot"})).await;

    let sender = bot.clone();
    let sending = tokio::spawn(async move {
        sender.send_message("100", &[Element::text("hi")]).await
    });

    let (echo, params) = expect_call(&mut ws, "send_group_msg").await;
    assert_eq!(params["group_id"], json!(100));
    assert_eq!(params["message"][0]["data"]["text"], json!("hi"));

    // A stray reply for nobody is dropped without disturbing the call.
    reply(&mut ws, &json!(9999), json!({"message_id": 1})).await;
    reply(&mut ws, &echo, json!({"message_id": 321})).await;

    let sent = sending.await.unwrap().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id, "321");
    assert_eq!(sent[0].self_id, SELF_ID);
}

#[tokio::test]
async fn test_reverse_remote_failure_is_error() {
    let (bot, addr, _sessions) = start_reverse().await;
    let mut ws = dial(&addr, "Universal").await.unwrap();
    expect_call(&mut ws, "get_login_info").await;

    let caller = bot.clone();
    let call = tokio::spawn(async move { caller.get_guild("100").await });

    let (echo, _) = expect_call(&mut ws, "get_group_info").await;
    let frame = json!({"status": "failed", "retcode": 102, "data": null,
        "echo": echo, "wording": "no such group"});
    ws.send(WsMessage::text(frame.to_string())).await.unwrap();

    match call.await.unwrap().unwrap_err() {
        BridgeError::Rpc(RpcError::Remote {
            action,
            retcode,
            wording,
            ..
        }) => {
            assert_eq!(action, "get_group_info");
            assert_eq!(retcode, 102);
            assert_eq!(wording.as_deref(), Some("no such group"));
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reverse_close_fails_pending_calls() {
    let (bot, addr, _sessions) = start_reverse().await;
    let mut ws = dial(&addr, "Universal").await.unwrap();
    expect_call(&mut ws, "get_login_info").await;

    let caller = bot.clone();
    let call = tokio::spawn(async move { caller.get_guild_list().await });
    expect_call(&mut ws, "get_group_list").await;

    ws.close(None).await.unwrap();
    drop(ws);

    let err = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("pending call should fail promptly")
        .unwrap()
        .unwrap_err();
    assert!(
        matches!(err, BridgeError::Rpc(RpcError::ConnectionClosed { .. })),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_reverse_wrong_role_rejected_then_next_accepted() {
    let (_bot, addr, mut sessions) = start_reverse().await;

    assert!(dial(&addr, "Event").await.is_err());

    let mut ws = dial(&addr, "Universal").await.unwrap();
    expect_call(&mut ws, "get_login_info").await;
    push(&mut ws, group_message("after retry")).await;
    assert_eq!(
        next_session(&mut sessions).await.content.as_deref(),
        Some("after retry")
    );
}

#[tokio::test]
async fn test_reverse_quote_is_fetched_over_same_connection() {
    let (_bot, addr, mut sessions) = start_reverse().await;
    let mut ws = dial(&addr, "Universal").await.unwrap();
    expect_call(&mut ws, "get_login_info").await;

    push(&mut ws, group_message("[CQ:reply,id=12]agreed")).await;
    let (echo, params) = expect_call(&mut ws, "get_msg").await;
    assert_eq!(params["message_id"], json!(12));
    reply(
        &mut ws,
        &echo,
        json!({"message_id": 12, "message_type": "group", "group_id": 100, "time": 1,
            "message": "original", "sender": {"user_id": 8, "nickname": "eve"}}),
    )
    .await;

    let session = next_session(&mut sessions).await;
    let message = session.message.unwrap();
    assert_eq!(message.content, "agreed");
    assert_eq!(message.quote.unwrap().content, "original");
}

// =========================================================================
// Forward WebSocket
// =========================================================================

#[tokio::test]
async fn test_forward_connect_dials_endpoint_with_token() {
    let server = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", server.local_addr().unwrap());

    let bot = Bot::builder()
        .self_id(SELF_ID)
        .token("abc")
        .protocol(Protocol::Ws { endpoint })
        .build()
        .unwrap();
    let (tx, mut sessions) = mpsc::unbounded_channel();
    let handler = Arc::new(move |_bot: Bot, session: Session| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(session);
        }
    });
    let connecting = bot.clone();
    tokio::spawn(async move { connecting.connect(handler).await });

    let (stream, _) = server.accept().await.unwrap();
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let auth = request.headers().get("authorization").unwrap();
        assert_eq!(auth, "Bearer abc");
        Ok(response)
    };
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let frame: Value = serde_json::from_str(&msg.into_text().unwrap()).unwrap();
    assert_eq!(frame["action"], json!("get_login_info"));

    let event = json!({"post_type": "notice", "notice_type": "friend_add",
        "time": 1, "self_id": 10001, "user_id": 5});
    ws.send(WsMessage::text(event.to_string())).await.unwrap();
    let session = next_session(&mut sessions).await;
    assert_eq!(session.kind, EventKind::FriendAdded);
    assert_eq!(session.user_id.as_deref(), Some("5"));
}

// =========================================================================
// HTTP mode
// =========================================================================

fn http_bot(base_url: &str) -> Bot {
    Bot::builder()
        .self_id(SELF_ID)
        .token("tok")
        .protocol(Protocol::Http {
            base_url: base_url.to_string(),
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_http_get_login_posts_action() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/get_login_info")
        .match_header("authorization", "Token tok")
        .with_body(r#"{"status":"ok","retcode":0,"data":{"user_id":10001,"nickname":"bot"}}"#)
        .create_async()
        .await;

    let login = http_bot(&server.url()).get_login().await.unwrap();
    assert_eq!(login.self_id, SELF_ID);
    assert_eq!(login.user.name.as_deref(), Some("bot"));
    assert!(login.user.is_bot);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_mute_rounds_to_seconds() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/set_group_ban")
        .match_body(mockito::Matcher::Json(
            json!({"group_id": 100, "user_id": 7, "duration": 90}),
        ))
        .with_body(r#"{"status":"ok","retcode":0,"data":null}"#)
        .create_async()
        .await;

    http_bot(&server.url())
        .mute_guild_member("100", "7", Duration::from_millis(89_600))
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_webhook_event_normalizes() {
    let bot = http_bot("http://127.0.0.1:1");
    let body = json!({"post_type": "request", "request_type": "friend", "time": 1,
        "self_id": 10001, "user_id": 3, "comment": "hi", "flag": "f1"});

    let session = bot
        .handle_webhook(body.to_string().as_bytes())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.kind, EventKind::FriendRequest);
    assert_eq!(session.message_id.as_deref(), Some("f1"));
    assert_eq!(session.channel_id.as_deref(), Some("private:3"));
}

#[tokio::test]
async fn test_webhook_string_self_id_accepted() {
    let bot = http_bot("http://127.0.0.1:1");
    let body = json!({"post_type": "request", "request_type": "friend", "time": 1,
        "self_id": "10001", "user_id": 3, "flag": "f1"});

    let session = bot
        .handle_webhook(body.to_string().as_bytes())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.kind, EventKind::FriendRequest);
    assert_eq!(session.self_id, "10001");

    let err = bot
        .handle_webhook(br#"{"post_type":"meta_event","time":1,"self_id":"2"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Unauthorized(_)));
}

#[tokio::test]
async fn test_webhook_without_self_id_rejected() {
    let bot = http_bot("http://127.0.0.1:1");
    let err = bot
        .handle_webhook(br#"{"post_type":"notice","time":1}"#)
        .await
        .unwrap_err();
    assert!(
        matches!(err, BridgeError::Session(SessionError::InvalidEvent(_))),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_webhook_for_other_account_rejected() {
    let bot = http_bot("http://127.0.0.1:1");
    let err = bot
        .handle_webhook(br#"{"post_type":"meta_event","time":1,"self_id":2}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Unauthorized(_)));
}
