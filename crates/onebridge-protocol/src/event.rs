//! Inbound event frames.
//!
//! OneBot pushes every event as one JSON object with a `post_type`
//! discriminant and type-specific fields. The cascade of discriminants
//! (`post_type` → `request_type` / `notice_type` → `sub_type`) maps onto
//! nested serde-tagged enums, so classification is a `match`, not a
//! chain of string comparisons.
//!
//! Unknown request, notice and notify sub-types deserialize to an `Other`
//! unit variant instead of failing: the adapter ignores them silently.

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::MessageBody;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Fields every event carries, read before the typed dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    pub post_type: String,
    /// Unix seconds.
    pub time: i64,
    /// The account that received the event. Some implementations send it
    /// as a numeric string.
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub self_id: i64,
}

fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(i64),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Number(n) => Ok(n),
        Id::Text(text) => text.parse().map_err(de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// An inbound event, dispatched on `post_type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "post_type")]
pub enum Event {
    #[serde(rename = "message")]
    Message(MessageEvent),

    /// go-cqhttp's echo of messages the bot itself sent.
    #[serde(rename = "message_sent")]
    MessageSent(MessageEvent),

    #[serde(rename = "request")]
    Request(RequestEvent),

    #[serde(rename = "notice")]
    Notice(NoticeEvent),

    /// Lifecycle and heartbeat events.
    #[serde(rename = "meta_event")]
    Meta {},

    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Whether a message was sent in a group or a private chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Private,
    Group,
}

/// Who sent a message. Every field is optional in practice; it depends
/// on the implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    /// Group card (per-group display name).
    #[serde(default)]
    pub card: Option<String>,
    /// `owner`, `admin` or `member`.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// A message event, also the shape `get_msg` and
/// `get_group_msg_history` return (those omit `post_type` and
/// sometimes `self_id`, hence the defaults).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub self_id: i64,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub sub_type: String,
    pub message_id: i64,
    #[serde(default)]
    pub message_seq: Option<i64>,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub group_id: Option<i64>,
    /// Some implementations include the group's display name.
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub message: MessageBody,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub sender: Sender,
}

impl MessageEvent {
    /// The author, preferring `user_id` and falling back to the sender.
    pub fn author_id(&self) -> i64 {
        if self.user_id != 0 {
            self.user_id
        } else {
            self.sender.user_id
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A friend or group-join request, dispatched on `request_type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "request_type", rename_all = "lowercase")]
pub enum RequestEvent {
    Friend {
        user_id: i64,
        #[serde(default)]
        comment: String,
        flag: String,
    },
    Group {
        /// `add` (someone asks to join) or `invite` (the bot is invited).
        sub_type: String,
        group_id: i64,
        user_id: i64,
        #[serde(default)]
        comment: String,
        flag: String,
    },
    #[serde(other)]
    Other,
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

/// A notice, dispatched on `notice_type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "notice_type", rename_all = "snake_case")]
pub enum NoticeEvent {
    GroupRecall {
        group_id: i64,
        user_id: i64,
        operator_id: i64,
        message_id: i64,
    },
    FriendRecall {
        user_id: i64,
        message_id: i64,
    },
    FriendAdd {
        user_id: i64,
    },
    GroupAdmin {
        /// `set` or `unset`.
        sub_type: String,
        group_id: i64,
        user_id: i64,
    },
    GroupBan {
        sub_type: String,
        group_id: i64,
        #[serde(default)]
        operator_id: i64,
        user_id: i64,
        #[serde(default)]
        duration: i64,
    },
    GroupDecrease {
        /// `leave`, `kick` or `kick_me`.
        sub_type: String,
        group_id: i64,
        #[serde(default)]
        operator_id: i64,
        user_id: i64,
    },
    GroupIncrease {
        sub_type: String,
        group_id: i64,
        #[serde(default)]
        operator_id: i64,
        user_id: i64,
    },
    GroupCard {
        group_id: i64,
        user_id: i64,
        #[serde(default)]
        card_new: String,
        #[serde(default)]
        card_old: String,
    },
    Notify(NotifyEvent),
    #[serde(rename = "essence")]
    GroupEssence {
        /// `add` or `delete`.
        sub_type: String,
        group_id: i64,
        sender_id: i64,
        operator_id: i64,
        message_id: i64,
    },
    #[serde(other)]
    Other,
}

/// The `notify` notice family, dispatched on `sub_type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "sub_type", rename_all = "snake_case")]
pub enum NotifyEvent {
    /// Present `group_id` means a group poke, absent means a direct one.
    Poke {
        user_id: i64,
        target_id: i64,
        #[serde(default)]
        group_id: Option<i64>,
    },
    LuckyKing {
        group_id: i64,
        user_id: i64,
        target_id: i64,
    },
    Honor {
        group_id: i64,
        user_id: i64,
        /// `talkative`, `performer`, `emotion`, ...
        honor_type: String,
    },
    Title {
        group_id: i64,
        user_id: i64,
        title: String,
    },
    #[serde(other)]
    Other,
}
