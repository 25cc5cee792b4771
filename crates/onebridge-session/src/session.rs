//! Canonical session types: the platform-agnostic record of one event.
//!
//! Everything here is plain data. Ids are strings because the canonical
//! model is shared with platforms whose ids are not numbers; private chats
//! use the channel id `private:<user id>`.

use serde::Serialize;
use serde_json::Value;

use onebridge_protocol::Element;

/// Prefix of direct-chat channel ids.
pub const PRIVATE_PREFIX: &str = "private:";

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// What happened. Closed: every normalized event is exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Message,
    MessageDeleted,
    FriendRequest,
    GuildRequest,
    GuildMemberRequest,
    GuildRoleUpdated,
    GuildMemberUpdated,
    GuildMemberAdded,
    GuildMemberRemoved,
    GuildAdded,
    GuildRemoved,
    FriendAdded,
    NoticePoke,
    NoticeHonor,
    NoticeLuckyKing,
    NoticeTitle,
    GroupEssence,
}

impl EventKind {
    /// The canonical event name, e.g. `guild-member-added` or
    /// `onebot/notice-poke` for platform-specific kinds.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::MessageDeleted => "message-deleted",
            Self::FriendRequest => "friend-request",
            Self::GuildRequest => "guild-request",
            Self::GuildMemberRequest => "guild-member-request",
            Self::GuildRoleUpdated => "guild-role-updated",
            Self::GuildMemberUpdated => "guild-member-updated",
            Self::GuildMemberAdded => "guild-member-added",
            Self::GuildMemberRemoved => "guild-member-removed",
            Self::GuildAdded => "guild-added",
            Self::GuildRemoved => "guild-removed",
            Self::FriendAdded => "friend-added",
            Self::NoticePoke => "onebot/notice-poke",
            Self::NoticeHonor => "onebot/notice-honor",
            Self::NoticeLuckyKing => "onebot/notice-lucky-king",
            Self::NoticeTitle => "onebot/notice-title",
            Self::GroupEssence => "onebot/group-essence",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ChannelType {
    /// A group chat.
    #[default]
    Text,
    /// A one-to-one chat.
    Direct,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: String,
    pub kind: ChannelType,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Guild {
    pub id: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    /// Display name: a friend remark, falling back to the nickname.
    pub nick: Option<String>,
    pub avatar: Option<String>,
    pub is_bot: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuildMember {
    pub user: Option<User>,
    pub name: Option<String>,
    /// The group card, falling back to the nickname.
    pub nick: Option<String>,
    pub title: Option<String>,
    pub avatar: Option<String>,
    /// `owner`, `admin` or `member`; empty when unknown.
    pub roles: Vec<String>,
    /// Unix milliseconds.
    pub joined_at: Option<i64>,
}

/// The login state of the bot account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Login {
    pub self_id: String,
    pub user: User,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A decoded message with the context it was sent in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    #[serde(skip)]
    pub elements: Vec<Element>,
    /// `elements` rendered as canonical markup.
    pub content: String,
    /// The message this one replies to, when it could be fetched.
    pub quote: Option<Box<Message>>,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub channel: Option<Channel>,
    pub user: Option<User>,
    pub guild: Option<Guild>,
    pub member: Option<GuildMember>,
}

/// What a successful send produced.
///
/// `id` is empty for side-effect sends (file uploads) that have no
/// message id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub self_id: String,
    pub is_direct: bool,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The canonical record of one inbound event.
///
/// Only the fields relevant to `kind` are set. The raw wire event is
/// kept in `raw` for handlers that need implementation-specific data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub kind: EventKind,
    pub self_id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub user_id: Option<String>,
    pub operator_id: Option<String>,
    pub channel_id: Option<String>,
    pub guild_id: Option<String>,
    /// Message id, or the request flag for request events.
    pub message_id: Option<String>,
    /// Message markup, request comment, new card, honor type or title.
    pub content: Option<String>,
    pub role_id: Option<String>,
    pub is_direct: bool,
    pub message: Option<Message>,
    pub raw: Value,
}

impl Session {
    /// A session of `kind` with only the header fields set.
    pub fn new(kind: EventKind, self_id: impl Into<String>, timestamp: i64, raw: Value) -> Self {
        Self {
            kind,
            self_id: self_id.into(),
            timestamp,
            user_id: None,
            operator_id: None,
            channel_id: None,
            guild_id: None,
            message_id: None,
            content: None,
            role_id: None,
            is_direct: false,
            message: None,
            raw,
        }
    }

    /// Sets both the guild and its single text channel to `group_id`.
    pub(crate) fn in_group(&mut self, group_id: i64) {
        self.guild_id = Some(group_id.to_string());
        self.channel_id = Some(group_id.to_string());
        self.is_direct = false;
    }

    /// Sets the direct channel with `user_id`.
    pub(crate) fn in_private(&mut self, user_id: i64) {
        self.channel_id = Some(private_channel(user_id));
        self.is_direct = true;
    }
}

/// The direct channel id for a user.
pub fn private_channel(user_id: impl std::fmt::Display) -> String {
    format!("{PRIVATE_PREFIX}{user_id}")
}
