//! Wire → canonical conversions.
//!
//! Segments become content-tree elements, protocol info payloads become
//! canonical users, guilds and members. The only I/O is the quote lookup
//! in [`decode_message`], which is best effort.

use onebridge_protocol::{
    Element, FriendInfo, GroupInfo, GroupMemberInfo, LoginInfo, MessageEvent, MessageType, Segment,
    StrangerInfo, cqcode,
};
use onebridge_rpc::{Api, Caller};

use crate::session::{
    Channel, ChannelType, Guild, GuildMember, Login, Message, User, private_channel,
};

// ---------------------------------------------------------------------------
// Avatars
// ---------------------------------------------------------------------------

pub fn user_avatar(user_id: i64) -> String {
    format!("https://q.qlogo.cn/headimg_dl?dst_uin={user_id}&spec=640")
}

pub fn group_avatar(group_id: i64) -> String {
    format!("https://p.qlogo.cn/gh/{group_id}/{group_id}/640")
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

// ---------------------------------------------------------------------------
// Segments → elements
// ---------------------------------------------------------------------------

/// Copies every attribute except `skip` onto `element` as strings.
fn with_rest(mut element: Element, segment: &Segment, skip: &[&str]) -> Element {
    for (key, value) in &segment.data {
        if skip.contains(&key.as_str()) || value.is_null() {
            continue;
        }
        element = element.attr(key.clone(), cqcode::value_to_string(value));
    }
    element
}

/// A media element whose source is `url`, falling back to `file`.
fn media(kind: &str, segment: &Segment) -> Element {
    let src = segment
        .get_string("url")
        .filter(|s| !s.is_empty())
        .or_else(|| segment.get_string("file"))
        .unwrap_or_default();
    with_rest(Element::new(kind).attr("src", src), segment, &["url", "file"])
}

/// Maps one wire segment onto the canonical content tree.
///
/// Unknown tags pass through with their attributes stringified, so
/// nothing the implementation sends is lost.
pub fn decode_segment(segment: &Segment) -> Element {
    match segment.kind.as_str() {
        "text" => Element::text(segment.text_content()),
        "at" => {
            let qq = segment.get_string("qq").unwrap_or_default();
            let at = if qq == "all" {
                Element::new("at").attr("type", "all")
            } else {
                let mut at = Element::new("at").attr("id", qq);
                if let Some(name) = segment.get_string("name").filter(|n| !n.is_empty()) {
                    at = at.attr("name", name);
                }
                at
            };
            with_rest(at, segment, &["qq", "name"])
        }
        "face" => Element::new("face").attr("id", segment.get_string("id").unwrap_or_default()),
        "image" => {
            let mut img = media("img", segment);
            if let Some(name) = segment.get_string("name").filter(|n| !n.is_empty()) {
                img.attrs.remove("name");
                img = img.attr("title", name);
            }
            img
        }
        "record" => media("audio", segment),
        "video" => media("video", segment),
        "file" => media("file", segment),
        "reply" => Element::new("quote").attr("id", segment.get_string("id").unwrap_or_default()),
        other => with_rest(Element::new(other), segment, &[]),
    }
}

pub fn decode_segments(segments: &[Segment]) -> Vec<Element> {
    segments.iter().map(decode_segment).collect()
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The channel id of a message: the group, or `private:<author>`.
pub fn message_channel_id(event: &MessageEvent) -> String {
    match (event.message_type, event.group_id) {
        (MessageType::Group, Some(group_id)) => group_id.to_string(),
        _ => private_channel(event.author_id()),
    }
}

fn message_user(event: &MessageEvent) -> User {
    let id = event.author_id();
    User {
        id: id.to_string(),
        name: non_empty(&event.sender.nickname),
        nick: None,
        avatar: Some(user_avatar(id)),
        is_bot: false,
    }
}

/// Decodes everything but the quote. Returns the quoted message id when
/// the body starts with a reply.
fn decode_body(event: &MessageEvent) -> (Message, Option<String>) {
    let mut elements = decode_segments(&event.message.segments());
    let quote_id = match elements.first() {
        Some(first) if first.kind == "quote" => {
            let quote = elements.remove(0);
            quote.get("id").map(str::to_string)
        }
        _ => None,
    };

    let is_group = event.message_type == MessageType::Group;
    let channel = Channel {
        id: message_channel_id(event),
        kind: if is_group { ChannelType::Text } else { ChannelType::Direct },
        name: if is_group {
            event.group_name.clone().filter(|n| !n.is_empty())
        } else {
            non_empty(&event.sender.nickname)
        },
    };

    let (guild, member) = match (is_group, event.group_id) {
        (true, Some(group_id)) => (
            Some(Guild {
                id: group_id.to_string(),
                name: event.group_name.clone().filter(|n| !n.is_empty()),
                avatar: Some(group_avatar(group_id)),
            }),
            Some(GuildMember {
                user: Some(message_user(event)),
                name: non_empty(&event.sender.nickname),
                nick: event.sender.card.clone().filter(|c| !c.is_empty()),
                title: event.sender.title.clone().filter(|t| !t.is_empty()),
                avatar: Some(user_avatar(event.author_id())),
                roles: event.sender.role.iter().cloned().collect(),
                joined_at: None,
            }),
        ),
        _ => (None, None),
    };

    let message = Message {
        id: event.message_id.to_string(),
        content: onebridge_protocol::render(&elements),
        elements,
        quote: None,
        timestamp: event.time * 1000,
        channel: Some(channel),
        user: Some(message_user(event)),
        guild,
        member,
    };
    (message, quote_id)
}

/// Decodes a message event, resolving a leading reply into `quote`.
///
/// The quoted message is fetched with `get_msg`; when that fails the
/// message is still returned, without a quote. Quotes are resolved one
/// level deep.
pub async fn decode_message<C: Caller>(api: &Api<C>, event: &MessageEvent) -> Message {
    let (mut message, quote_id) = decode_body(event);
    let Some(quote_id) = quote_id else {
        return message;
    };

    let quoted = match quote_id.parse::<i64>() {
        Ok(id) => api.get_msg(id).await.map_err(|e| e.to_string()),
        Err(e) => Err(format!("quote id {quote_id:?}: {e}")),
    };
    match quoted {
        Ok(quoted) => message.quote = Some(Box::new(decode_body(&quoted).0)),
        Err(error) => tracing::warn!(%quote_id, %error, "failed to fetch quoted message"),
    }
    message
}

// ---------------------------------------------------------------------------
// Info payloads → resources
// ---------------------------------------------------------------------------

pub fn login_from_info(info: &LoginInfo) -> Login {
    Login {
        self_id: info.user_id.to_string(),
        user: User {
            id: info.user_id.to_string(),
            name: non_empty(&info.nickname),
            nick: None,
            avatar: Some(user_avatar(info.user_id)),
            is_bot: true,
        },
    }
}

pub fn user_from_stranger(info: &StrangerInfo, is_bot: bool) -> User {
    User {
        id: info.user_id.to_string(),
        name: non_empty(&info.nickname),
        nick: non_empty(&info.nickname),
        avatar: Some(user_avatar(info.user_id)),
        is_bot,
    }
}

pub fn user_from_friend(info: &FriendInfo, is_bot: bool) -> User {
    User {
        id: info.user_id.to_string(),
        name: non_empty(&info.nickname),
        nick: non_empty(&info.remark).or_else(|| non_empty(&info.nickname)),
        avatar: Some(user_avatar(info.user_id)),
        is_bot,
    }
}

pub fn guild_from_info(info: &GroupInfo) -> Guild {
    Guild {
        id: info.group_id.to_string(),
        name: non_empty(&info.group_name),
        avatar: Some(group_avatar(info.group_id)),
    }
}

/// A group has exactly one text channel sharing its id.
pub fn channel_from_info(info: &GroupInfo) -> Channel {
    Channel {
        id: info.group_id.to_string(),
        kind: ChannelType::Text,
        name: non_empty(&info.group_name),
    }
}

pub fn member_from_info(info: &GroupMemberInfo, is_bot: bool) -> GuildMember {
    GuildMember {
        user: Some(User {
            id: info.user_id.to_string(),
            name: non_empty(&info.nickname),
            nick: non_empty(&info.nickname),
            avatar: Some(user_avatar(info.user_id)),
            is_bot,
        }),
        name: non_empty(&info.nickname),
        nick: non_empty(&info.card).or_else(|| non_empty(&info.nickname)),
        title: info.title.clone().filter(|t| !t.is_empty()),
        avatar: Some(user_avatar(info.user_id)),
        roles: info.role.iter().cloned().collect(),
        joined_at: info.join_time.map(|t| t * 1000),
    }
}
