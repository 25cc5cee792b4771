//! Inbound event → canonical [`Session`].
//!
//! The normalizer first checks the common header, then lets serde pick
//! the typed variant, then maps each variant onto an [`EventKind`] and
//! the ids that go with it:
//!
//! ```text
//! JSON ──header──▶ EventHeader ──serde──▶ Event ──match──▶ Session
//! ```

use serde::Deserialize;
use serde_json::Value;

use onebridge_protocol::{Event, EventHeader, MessageType, NoticeEvent, NotifyEvent, RequestEvent};
use onebridge_rpc::{Api, Caller};

use crate::decode::decode_message;
use crate::{EventKind, Session, SessionError};

/// Turns raw inbound events into sessions for one bot.
#[derive(Debug, Clone)]
pub struct Normalizer<C> {
    api: Api<C>,
}

impl<C: Caller> Normalizer<C> {
    /// The `api` is used for quote lookups while decoding messages.
    pub fn new(api: Api<C>) -> Self {
        Self { api }
    }

    /// Normalizes one event.
    ///
    /// Returns `Ok(None)` for events with no canonical counterpart:
    /// heartbeats, unknown post types, unhandled notices.
    ///
    /// # Errors
    /// - [`SessionError::InvalidEvent`] when the header is missing.
    /// - [`SessionError::Decode`] when a known event lacks its fields.
    /// - [`SessionError::Unsupported`] for `message_sent`.
    pub async fn normalize(&self, value: Value) -> Result<Option<Session>, SessionError> {
        let header = EventHeader::deserialize(&value)
            .map_err(|e| SessionError::InvalidEvent(e.to_string()))?;
        let event = Event::deserialize(&value)?;
        let self_id = header.self_id.to_string();
        let timestamp = header.time * 1000;
        let session = |kind: EventKind| Session::new(kind, self_id.clone(), timestamp, value.clone());

        let normalized = match event {
            Event::Message(msg) => {
                let mut s = session(EventKind::Message);
                let message = decode_message(&self.api, &msg).await;
                s.user_id = message.user.as_ref().map(|u| u.id.clone());
                s.channel_id = message.channel.as_ref().map(|c| c.id.clone());
                s.guild_id = message.guild.as_ref().map(|g| g.id.clone());
                s.message_id = Some(message.id.clone());
                s.content = Some(message.content.clone());
                s.is_direct = msg.message_type == MessageType::Private;
                s.message = Some(message);
                Some(s)
            }
            Event::MessageSent(_) => {
                tracing::warn!(self_id = %header.self_id, "self-sent message events are not supported");
                return Err(SessionError::Unsupported("message_sent".into()));
            }
            Event::Request(request) => normalize_request(request, session),
            Event::Notice(notice) => normalize_notice(notice, &self_id, session),
            Event::Meta {} => None,
            Event::Unknown => {
                tracing::debug!(post_type = %header.post_type, "ignoring unknown post type");
                None
            }
        };
        Ok(normalized)
    }
}

fn normalize_request(
    request: RequestEvent,
    session: impl Fn(EventKind) -> Session,
) -> Option<Session> {
    let s = match request {
        RequestEvent::Friend {
            user_id,
            comment,
            flag,
        } => {
            let mut s = session(EventKind::FriendRequest);
            s.user_id = Some(user_id.to_string());
            s.content = Some(comment);
            s.message_id = Some(flag);
            s.in_private(user_id);
            s
        }
        RequestEvent::Group {
            sub_type,
            group_id,
            user_id,
            comment,
            flag,
        } => {
            let kind = match sub_type.as_str() {
                "add" => EventKind::GuildMemberRequest,
                "invite" => EventKind::GuildRequest,
                other => {
                    tracing::debug!(sub_type = other, "ignoring unknown group request");
                    return None;
                }
            };
            let mut s = session(kind);
            s.user_id = Some(user_id.to_string());
            s.content = Some(comment);
            s.message_id = Some(flag);
            s.in_group(group_id);
            s
        }
        RequestEvent::Other => return None,
    };
    Some(s)
}

fn normalize_notice(
    notice: NoticeEvent,
    self_id: &str,
    session: impl Fn(EventKind) -> Session,
) -> Option<Session> {
    // Most notices name a user and a group.
    let in_group = |kind, user_id: i64, group_id: i64| {
        let mut s = session(kind);
        s.user_id = Some(user_id.to_string());
        s.in_group(group_id);
        s
    };

    let s = match notice {
        NoticeEvent::GroupRecall {
            group_id,
            user_id,
            operator_id,
            message_id,
        } => {
            let mut s = in_group(EventKind::MessageDeleted, user_id, group_id);
            s.operator_id = Some(operator_id.to_string());
            s.message_id = Some(message_id.to_string());
            s
        }
        NoticeEvent::FriendRecall {
            user_id,
            message_id,
        } => {
            let mut s = session(EventKind::MessageDeleted);
            s.user_id = Some(user_id.to_string());
            s.operator_id = Some(user_id.to_string());
            s.message_id = Some(message_id.to_string());
            s.in_private(user_id);
            s
        }
        NoticeEvent::FriendAdd { user_id } => {
            let mut s = session(EventKind::FriendAdded);
            s.user_id = Some(user_id.to_string());
            s
        }
        NoticeEvent::GroupAdmin {
            sub_type,
            group_id,
            user_id,
        } => {
            let mut s = in_group(EventKind::GuildRoleUpdated, user_id, group_id);
            s.role_id = Some(if sub_type == "set" { "admin" } else { "member" }.into());
            s
        }
        NoticeEvent::GroupBan {
            group_id,
            operator_id,
            user_id,
            ..
        } => {
            let mut s = in_group(EventKind::GuildMemberUpdated, user_id, group_id);
            s.operator_id = Some(operator_id.to_string());
            s
        }
        NoticeEvent::GroupDecrease {
            sub_type,
            group_id,
            operator_id,
            user_id,
        } => {
            let kind = if sub_type == "kick_me" {
                EventKind::GuildRemoved
            } else {
                EventKind::GuildMemberRemoved
            };
            let mut s = in_group(kind, user_id, group_id);
            s.operator_id = Some(operator_id.to_string());
            s
        }
        NoticeEvent::GroupIncrease {
            group_id,
            operator_id,
            user_id,
            ..
        } => {
            let kind = if user_id.to_string() == self_id {
                EventKind::GuildAdded
            } else {
                EventKind::GuildMemberAdded
            };
            let mut s = in_group(kind, user_id, group_id);
            s.operator_id = Some(operator_id.to_string());
            s
        }
        NoticeEvent::GroupCard {
            group_id,
            user_id,
            card_new,
            ..
        } => {
            let mut s = in_group(EventKind::GuildMemberUpdated, user_id, group_id);
            s.content = Some(card_new);
            s
        }
        NoticeEvent::Notify(notify) => return normalize_notify(notify, &session),
        NoticeEvent::GroupEssence {
            group_id,
            sender_id,
            operator_id,
            message_id,
            ..
        } => {
            let mut s = in_group(EventKind::GroupEssence, sender_id, group_id);
            s.operator_id = Some(operator_id.to_string());
            s.message_id = Some(message_id.to_string());
            s
        }
        NoticeEvent::Other => return None,
    };
    Some(s)
}

fn normalize_notify(notify: NotifyEvent, session: impl Fn(EventKind) -> Session) -> Option<Session> {
    let s = match notify {
        NotifyEvent::Poke {
            user_id,
            target_id,
            group_id,
        } => {
            let mut s = session(EventKind::NoticePoke);
            s.user_id = Some(target_id.to_string());
            s.operator_id = Some(user_id.to_string());
            match group_id {
                Some(group_id) => s.in_group(group_id),
                None => s.in_private(user_id),
            }
            s
        }
        NotifyEvent::Honor {
            group_id,
            user_id,
            honor_type,
        } => {
            let mut s = session(EventKind::NoticeHonor);
            s.user_id = Some(user_id.to_string());
            s.content = Some(honor_type);
            s.in_group(group_id);
            s
        }
        NotifyEvent::LuckyKing {
            group_id,
            target_id,
            user_id,
        } => {
            let mut s = session(EventKind::NoticeLuckyKing);
            s.user_id = Some(target_id.to_string());
            s.operator_id = Some(user_id.to_string());
            s.in_group(group_id);
            s
        }
        NotifyEvent::Title {
            group_id,
            user_id,
            title,
        } => {
            let mut s = session(EventKind::NoticeTitle);
            s.user_id = Some(user_id.to_string());
            s.content = Some(title);
            s.in_group(group_id);
            s
        }
        NotifyEvent::Other => return None,
    };
    Some(s)
}
