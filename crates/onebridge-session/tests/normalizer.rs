//! Integration tests for event normalization.
//!
//! Events are fed as raw JSON, the way they arrive from a webhook body or
//! a WebSocket frame. A stub caller answers `get_msg` for quote lookups.

use serde_json::{Value, json};

use onebridge_rpc::{Api, Caller, RpcError};
use onebridge_session::{EventKind, Normalizer, Session, SessionError};

// =========================================================================
// Helpers
// =========================================================================

/// Answers `get_msg` with a fixed message; everything else fails.
struct QuoteStub;

impl Caller for QuoteStub {
    async fn call(&self, action: &str, params: Value) -> Result<Value, RpcError> {
        if action == "get_msg" && params["message_id"] == json!(5) {
            return Ok(json!({
                "message_id": 5, "message_type": "private", "time": 1,
                "message": "quoted text", "sender": {"user_id": 8, "nickname": "q"}
            }));
        }
        Err(RpcError::Remote {
            action: action.to_string(),
            params,
            retcode: 100,
            wording: None,
        })
    }
}

fn normalizer() -> Normalizer<QuoteStub> {
    Normalizer::new(Api::new(QuoteStub))
}

async fn normalize(value: Value) -> Session {
    normalizer()
        .normalize(value)
        .await
        .unwrap()
        .expect("event should normalize to a session")
}

fn notice(fields: Value) -> Value {
    let mut event = json!({"post_type": "notice", "time": 1700000000, "self_id": 9});
    let (Value::Object(base), Value::Object(extra)) = (&mut event, fields) else {
        unreachable!()
    };
    base.extend(extra);
    event
}

// =========================================================================
// Header
// =========================================================================

#[tokio::test]
async fn test_normalize_missing_self_id_is_invalid() {
    let err = normalizer()
        .normalize(json!({"post_type": "notice", "time": 1, "notice_type": "friend_add", "user_id": 1}))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidEvent(_)));
}

#[tokio::test]
async fn test_normalize_non_object_is_invalid() {
    let err = normalizer().normalize(json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidEvent(_)));
}

#[tokio::test]
async fn test_normalize_known_notice_missing_fields_is_decode_error() {
    let err = normalizer()
        .normalize(notice(json!({"notice_type": "group_recall", "group_id": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Decode(_)));
}

// =========================================================================
// Messages
// =========================================================================

#[tokio::test]
async fn test_normalize_group_message() {
    let session = normalize(json!({
        "post_type": "message", "time": 1700000000, "self_id": 9,
        "message_type": "group", "sub_type": "normal", "message_id": 77,
        "user_id": 3, "group_id": 100, "message": "[CQ:at,qq=9] ping",
        "sender": {"user_id": 3, "nickname": "amy", "role": "member"}
    }))
    .await;

    assert_eq!(session.kind, EventKind::Message);
    assert_eq!(session.self_id, "9");
    assert_eq!(session.timestamp, 1_700_000_000_000);
    assert_eq!(session.channel_id.as_deref(), Some("100"));
    assert_eq!(session.guild_id.as_deref(), Some("100"));
    assert_eq!(session.user_id.as_deref(), Some("3"));
    assert_eq!(session.message_id.as_deref(), Some("77"));
    assert_eq!(session.content.as_deref(), Some(r#"<at id="9"/> ping"#));
    assert!(!session.is_direct);
    assert_eq!(session.raw["message_id"], json!(77));
}

#[tokio::test]
async fn test_normalize_private_message_with_quote() {
    let session = normalize(json!({
        "post_type": "message", "time": 1, "self_id": 9,
        "message_type": "private", "message_id": 78, "user_id": 8,
        "message": [
            {"type": "reply", "data": {"id": "5"}},
            {"type": "text", "data": {"text": "me too"}}
        ],
        "sender": {"user_id": 8, "nickname": "q"}
    }))
    .await;

    assert!(session.is_direct);
    assert_eq!(session.channel_id.as_deref(), Some("private:8"));
    let message = session.message.unwrap();
    assert_eq!(message.content, "me too");
    assert_eq!(message.quote.unwrap().content, "quoted text");
}

#[tokio::test]
async fn test_normalize_quote_lookup_failure_still_dispatches() {
    let session = normalize(json!({
        "post_type": "message", "time": 1, "self_id": 9,
        "message_type": "private", "message_id": 79, "user_id": 8,
        "message": "[CQ:reply,id=404]hello",
        "sender": {"user_id": 8}
    }))
    .await;

    let message = session.message.unwrap();
    assert_eq!(message.content, "hello");
    assert!(message.quote.is_none());
}

#[tokio::test]
async fn test_normalize_message_sent_is_unsupported() {
    let err = normalizer()
        .normalize(json!({
            "post_type": "message_sent", "time": 1, "self_id": 9,
            "message_type": "private", "message_id": 1, "user_id": 9, "message": "x"
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Unsupported(_)));
}

// =========================================================================
// Requests
// =========================================================================

#[tokio::test]
async fn test_normalize_friend_request() {
    let session = normalize(json!({
        "post_type": "request", "time": 1, "self_id": 9,
        "request_type": "friend", "user_id": 12, "comment": "hi", "flag": "abc"
    }))
    .await;

    assert_eq!(session.kind, EventKind::FriendRequest);
    assert_eq!(session.channel_id.as_deref(), Some("private:12"));
    assert_eq!(session.content.as_deref(), Some("hi"));
    assert_eq!(session.message_id.as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_normalize_group_requests_by_sub_type() {
    let add = normalize(json!({
        "post_type": "request", "time": 1, "self_id": 9, "request_type": "group",
        "sub_type": "add", "group_id": 5, "user_id": 12, "flag": "f"
    }))
    .await;
    let invite = normalize(json!({
        "post_type": "request", "time": 1, "self_id": 9, "request_type": "group",
        "sub_type": "invite", "group_id": 5, "user_id": 12, "flag": "g"
    }))
    .await;

    assert_eq!(add.kind, EventKind::GuildMemberRequest);
    assert_eq!(invite.kind, EventKind::GuildRequest);
    assert_eq!(invite.guild_id.as_deref(), Some("5"));
}

#[tokio::test]
async fn test_normalize_unknown_request_kinds_are_ignored() {
    let n = normalizer();
    let unknown_type = n
        .normalize(json!({
            "post_type": "request", "time": 1, "self_id": 9,
            "request_type": "guild_join", "user_id": 12, "flag": "f"
        }))
        .await
        .unwrap();
    let unknown_sub_type = n
        .normalize(json!({
            "post_type": "request", "time": 1, "self_id": 9, "request_type": "group",
            "sub_type": "weird", "group_id": 5, "user_id": 12, "flag": "f"
        }))
        .await
        .unwrap();

    assert!(unknown_type.is_none());
    assert!(unknown_sub_type.is_none());
}

// =========================================================================
// Notices
// =========================================================================

#[tokio::test]
async fn test_normalize_friend_recall() {
    let session = normalize(notice(json!({
        "notice_type": "friend_recall", "user_id": 10, "message_id": 55
    })))
    .await;

    assert_eq!(session.kind, EventKind::MessageDeleted);
    assert_eq!(session.channel_id.as_deref(), Some("private:10"));
    assert_eq!(session.user_id.as_deref(), Some("10"));
    assert_eq!(session.operator_id.as_deref(), Some("10"));
    assert_eq!(session.message_id.as_deref(), Some("55"));
    assert!(session.is_direct);
}

#[tokio::test]
async fn test_normalize_group_recall_uses_operator() {
    let session = normalize(notice(json!({
        "notice_type": "group_recall", "group_id": 100, "user_id": 3,
        "operator_id": 4, "message_id": 56
    })))
    .await;

    assert_eq!(session.kind, EventKind::MessageDeleted);
    assert_eq!(session.operator_id.as_deref(), Some("4"));
    assert_eq!(session.channel_id.as_deref(), Some("100"));
    assert!(!session.is_direct);
}

#[tokio::test]
async fn test_normalize_group_admin_sets_role() {
    let set = normalize(notice(json!({
        "notice_type": "group_admin", "sub_type": "set", "group_id": 1, "user_id": 2
    })))
    .await;
    let unset = normalize(notice(json!({
        "notice_type": "group_admin", "sub_type": "unset", "group_id": 1, "user_id": 2
    })))
    .await;

    assert_eq!(set.kind, EventKind::GuildRoleUpdated);
    assert_eq!(set.role_id.as_deref(), Some("admin"));
    assert_eq!(unset.role_id.as_deref(), Some("member"));
}

#[tokio::test]
async fn test_normalize_group_decrease_kick_me_is_guild_removed() {
    let kicked = normalize(notice(json!({
        "notice_type": "group_decrease", "sub_type": "kick_me",
        "group_id": 1, "operator_id": 2, "user_id": 9
    })))
    .await;
    let left = normalize(notice(json!({
        "notice_type": "group_decrease", "sub_type": "leave",
        "group_id": 1, "operator_id": 0, "user_id": 3
    })))
    .await;

    assert_eq!(kicked.kind, EventKind::GuildRemoved);
    assert_eq!(left.kind, EventKind::GuildMemberRemoved);
}

#[tokio::test]
async fn test_normalize_group_increase_self_is_guild_added() {
    let me = normalize(notice(json!({
        "notice_type": "group_increase", "sub_type": "approve",
        "group_id": 1, "operator_id": 2, "user_id": 9
    })))
    .await;
    let other = normalize(notice(json!({
        "notice_type": "group_increase", "sub_type": "invite",
        "group_id": 1, "operator_id": 2, "user_id": 4
    })))
    .await;

    assert_eq!(me.kind, EventKind::GuildAdded);
    assert_eq!(other.kind, EventKind::GuildMemberAdded);
    assert_eq!(other.operator_id.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_normalize_group_card_content_is_new_card() {
    let session = normalize(notice(json!({
        "notice_type": "group_card", "group_id": 1, "user_id": 2,
        "card_new": "new", "card_old": "old"
    })))
    .await;

    assert_eq!(session.kind, EventKind::GuildMemberUpdated);
    assert_eq!(session.content.as_deref(), Some("new"));
}

#[tokio::test]
async fn test_normalize_group_poke_is_not_direct() {
    let session = normalize(notice(json!({
        "notice_type": "notify", "sub_type": "poke",
        "group_id": 100, "user_id": 3, "target_id": 9
    })))
    .await;

    assert_eq!(session.kind, EventKind::NoticePoke);
    assert_eq!(session.user_id.as_deref(), Some("9"));
    assert_eq!(session.channel_id.as_deref(), Some("100"));
    assert!(!session.is_direct);
}

#[tokio::test]
async fn test_normalize_direct_poke_is_private() {
    let session = normalize(notice(json!({
        "notice_type": "notify", "sub_type": "poke", "user_id": 3, "target_id": 9
    })))
    .await;

    assert_eq!(session.channel_id.as_deref(), Some("private:3"));
    assert!(session.is_direct);
}

#[tokio::test]
async fn test_normalize_notify_honor_and_title_content() {
    let honor = normalize(notice(json!({
        "notice_type": "notify", "sub_type": "honor",
        "group_id": 1, "user_id": 2, "honor_type": "talkative"
    })))
    .await;
    let title = normalize(notice(json!({
        "notice_type": "notify", "sub_type": "title",
        "group_id": 1, "user_id": 2, "title": "Boss"
    })))
    .await;
    let lucky = normalize(notice(json!({
        "notice_type": "notify", "sub_type": "lucky_king",
        "group_id": 1, "user_id": 2, "target_id": 3
    })))
    .await;

    assert_eq!(honor.kind, EventKind::NoticeHonor);
    assert_eq!(honor.content.as_deref(), Some("talkative"));
    assert_eq!(title.content.as_deref(), Some("Boss"));
    assert_eq!(lucky.user_id.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_normalize_essence_uses_sender_as_user() {
    let session = normalize(notice(json!({
        "notice_type": "essence", "sub_type": "add", "group_id": 1,
        "sender_id": 2, "operator_id": 3, "message_id": 4
    })))
    .await;

    assert_eq!(session.kind, EventKind::GroupEssence);
    assert_eq!(session.user_id.as_deref(), Some("2"));
    assert_eq!(session.message_id.as_deref(), Some("4"));
}

#[tokio::test]
async fn test_normalize_unknown_notice_and_heartbeat_are_ignored() {
    let n = normalizer();
    let unknown = n
        .normalize(notice(json!({"notice_type": "group_upload", "group_id": 1})))
        .await
        .unwrap();
    let heartbeat = n
        .normalize(json!({
            "post_type": "meta_event", "time": 1, "self_id": 9,
            "meta_event_type": "heartbeat", "interval": 5000
        }))
        .await
        .unwrap();

    assert!(unknown.is_none());
    assert!(heartbeat.is_none());
}
