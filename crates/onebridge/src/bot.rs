//! The [`Bot`]: one OneBot account, its connection, and the canonical
//! operations built on top of the action API.
//!
//! ```text
//! application ──send_message──▶ Bot ──MessageEncoder──▶ Api<Remote> ──▶ OneBot
//! application ◀──on_session─── Bot ◀──Normalizer────── driver ◀──────── OneBot
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use onebridge_protocol::Element;
use onebridge_rpc::{Api, Caller, HttpCaller, RpcClient, RpcError};
use onebridge_session::decode::{
    channel_from_info, decode_message, guild_from_info, login_from_info, member_from_info,
    user_from_friend, user_from_stranger,
};
use onebridge_session::{
    Channel, ChannelType, Guild, GuildMember, Login, Message, Normalizer, PRIVATE_PREFIX,
    SentMessage, Session, SessionError, User, private_channel,
};
use onebridge_transport::{ListenerConfig, Transport, WebSocketConnection, WebSocketListener};

use crate::config::{BotBuilder, BotConfig, Protocol};
use crate::encoder::{EncoderOptions, MessageEncoder, Target};
use crate::error::parse_id;
use crate::{BridgeError, driver};

// ---------------------------------------------------------------------------
// EventHandler
// ---------------------------------------------------------------------------

/// Receives every normalized inbound event.
///
/// Each event is handled in its own task, so handlers may call back into
/// the bot (`bot.send_message(..)`) without blocking the connection.
///
/// Plain async closures work too:
///
/// ```rust,no_run
/// use onebridge::{Bot, Session};
///
/// let handler = |bot: Bot, session: Session| async move {
///     tracing::info!(kind = %session.kind, self_id = bot.self_id(), "event");
/// };
/// # let _ = handler;
/// ```
pub trait EventHandler: Send + Sync + 'static {
    fn on_session(&self, bot: &Bot, session: Session) -> impl Future<Output = ()> + Send;
}

impl<F, Fut> EventHandler for F
where
    F: Fn(Bot, Session) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn on_session(&self, bot: &Bot, session: Session) -> impl Future<Output = ()> + Send {
        self(bot.clone(), session)
    }
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// The [`Caller`] a bot uses, picked by its [`Protocol`].
#[derive(Clone)]
pub enum Remote {
    /// Calls multiplexed over the current WebSocket connection.
    Ws(RpcClient),
    /// One POST per call.
    Http(HttpCaller),
}

impl Caller for Remote {
    async fn call(&self, action: &str, params: Value) -> Result<Value, RpcError> {
        match self {
            Self::Ws(rpc) => rpc.call(action, params).await,
            Self::Http(http) => http.call(action, params).await,
        }
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ws(rpc) => f
                .debug_struct("Ws")
                .field("attached", &rpc.is_attached())
                .field("pending", &rpc.pending_len())
                .finish(),
            Self::Http(http) => f.debug_tuple("Http").field(&http.base_url()).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Bot
// ---------------------------------------------------------------------------

/// History pagination direction. OneBot only serves [`Direction::Before`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Before,
    After,
    Around,
}

struct BotInner {
    config: BotConfig,
    api: Api<Remote>,
    /// Set in the WebSocket modes; the driver attaches connections to it.
    rpc: Option<RpcClient>,
    normalizer: Normalizer<Remote>,
}

/// A handle to one bot account. Cheap to clone.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("self_id", &self.inner.config.self_id)
            .field("protocol", &self.inner.config.protocol)
            .field("remote", self.inner.api.caller())
            .finish()
    }
}

impl Bot {
    pub fn builder() -> BotBuilder {
        BotBuilder::new()
    }

    /// Creates a bot from an already validated config.
    pub(crate) fn from_config(config: BotConfig) -> Self {
        let timeout = config.response_timeout();
        let (remote, rpc) = match &config.protocol {
            Protocol::Http { base_url, .. } => (
                Remote::Http(HttpCaller::new(base_url.clone(), config.token.clone(), timeout)),
                None,
            ),
            Protocol::Ws { .. } | Protocol::WsReverse { .. } => {
                let rpc = RpcClient::new(timeout);
                (Remote::Ws(rpc.clone()), Some(rpc))
            }
        };
        Self {
            inner: Arc::new(BotInner {
                api: Api::new(remote.clone()),
                normalizer: Normalizer::new(Api::new(remote)),
                rpc,
                config,
            }),
        }
    }

    pub fn self_id(&self) -> &str {
        &self.inner.config.self_id
    }

    pub fn config(&self) -> &BotConfig {
        &self.inner.config
    }

    /// Typed access to every wrapped action.
    pub fn api(&self) -> &Api<Remote> {
        &self.inner.api
    }

    pub(crate) fn rpc(&self) -> Option<&RpcClient> {
        self.inner.rpc.as_ref()
    }

    pub(crate) fn normalizer(&self) -> &Normalizer<Remote> {
        &self.inner.normalizer
    }

    fn is_self(&self, user_id: i64) -> bool {
        user_id.to_string() == self.inner.config.self_id
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Sends a content tree to `channel_id` (a group id or
    /// `private:<user id>`). Returns one entry per send performed.
    pub async fn send_message(
        &self,
        channel_id: &str,
        elements: &[Element],
    ) -> Result<Vec<SentMessage>, BridgeError> {
        let target = Target::parse(channel_id)?;
        let options = EncoderOptions {
            self_id: self.inner.config.self_id.clone(),
            sub_bot: self.inner.config.sub_bot,
        };
        let sent = MessageEncoder::new(self.api(), target, options).send(elements).await?;
        tracing::debug!(channel_id, count = sent.len(), "[send]");
        Ok(sent)
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Message, BridgeError> {
        let event = self.api().get_msg(parse_id(message_id)?).await?;
        Ok(decode_message(self.api(), &event).await)
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<(), BridgeError> {
        Ok(self.api().delete_msg(parse_id(message_id)?).await?)
    }

    /// Group history, oldest first. With `next`, the page ends at that
    /// message (inclusive); without it, at the latest message.
    ///
    /// # Errors
    /// [`BridgeError::Unsupported`] for any direction but
    /// [`Direction::Before`], and for direct channels.
    pub async fn get_message_list(
        &self,
        channel_id: &str,
        next: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<Message>, BridgeError> {
        if direction != Direction::Before {
            return Err(BridgeError::Unsupported(format!(
                "message list direction {direction:?}"
            )));
        }
        if channel_id.starts_with(PRIVATE_PREFIX) {
            return Err(BridgeError::Unsupported("direct channel history".into()));
        }
        let group_id = parse_id(channel_id)?;

        let anchor = match next {
            Some(next) => {
                let message = self.api().get_msg(parse_id(next)?).await?;
                match message.message_seq {
                    Some(seq) => Some(seq),
                    None => return Ok(Vec::new()),
                }
            }
            None => None,
        };

        let history = self.api().get_group_msg_history(group_id, anchor).await?;
        let mut messages = Vec::with_capacity(history.len());
        for event in &history {
            messages.push(decode_message(self.api(), event).await);
        }
        Ok(messages)
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub async fn get_login(&self) -> Result<Login, BridgeError> {
        let info = self.api().get_login_info().await?;
        Ok(login_from_info(&info))
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, BridgeError> {
        let info = self.api().get_stranger_info(parse_id(user_id)?).await?;
        Ok(user_from_stranger(&info, self.is_self(info.user_id)))
    }

    pub async fn get_friend_list(&self) -> Result<Vec<User>, BridgeError> {
        let friends = self.api().get_friend_list().await?;
        Ok(friends
            .iter()
            .map(|f| user_from_friend(f, self.is_self(f.user_id)))
            .collect())
    }

    pub async fn delete_friend(&self, user_id: &str) -> Result<(), BridgeError> {
        Ok(self.api().delete_friend(parse_id(user_id)?).await?)
    }

    /// The direct channel with a user. No action is called.
    pub fn create_direct_channel(&self, user_id: &str) -> Channel {
        Channel {
            id: private_channel(user_id),
            kind: ChannelType::Direct,
            name: None,
        }
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// `flag` is the session's `message_id` of the request event.
    pub async fn handle_friend_request(
        &self,
        flag: &str,
        approve: bool,
        remark: Option<&str>,
    ) -> Result<(), BridgeError> {
        Ok(self.api().set_friend_add_request(flag, approve, remark).await?)
    }

    /// Answers an invitation of the bot into a group.
    pub async fn handle_guild_request(
        &self,
        flag: &str,
        approve: bool,
        reason: Option<&str>,
    ) -> Result<(), BridgeError> {
        Ok(self
            .api()
            .set_group_add_request(flag, "invite", approve, reason)
            .await?)
    }

    /// Answers someone's request to join a group the bot manages.
    pub async fn handle_guild_member_request(
        &self,
        flag: &str,
        approve: bool,
        reason: Option<&str>,
    ) -> Result<(), BridgeError> {
        Ok(self
            .api()
            .set_group_add_request(flag, "add", approve, reason)
            .await?)
    }

    // -----------------------------------------------------------------------
    // Guilds
    // -----------------------------------------------------------------------

    pub async fn get_guild(&self, guild_id: &str) -> Result<Guild, BridgeError> {
        let info = self.api().get_group_info(parse_id(guild_id)?).await?;
        Ok(guild_from_info(&info))
    }

    pub async fn get_guild_list(&self) -> Result<Vec<Guild>, BridgeError> {
        let groups = self.api().get_group_list().await?;
        Ok(groups.iter().map(guild_from_info).collect())
    }

    pub async fn get_channel(&self, channel_id: &str) -> Result<Channel, BridgeError> {
        if let Some(user_id) = channel_id.strip_prefix(PRIVATE_PREFIX) {
            return Ok(self.create_direct_channel(user_id));
        }
        let info = self.api().get_group_info(parse_id(channel_id)?).await?;
        Ok(channel_from_info(&info))
    }

    /// A group has exactly one channel, so this is a one-element list.
    pub async fn get_channel_list(&self, guild_id: &str) -> Result<Vec<Channel>, BridgeError> {
        Ok(vec![self.get_channel(guild_id).await?])
    }

    pub async fn get_guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<GuildMember, BridgeError> {
        let info = self
            .api()
            .get_group_member_info(parse_id(guild_id)?, parse_id(user_id)?)
            .await?;
        Ok(member_from_info(&info, self.is_self(info.user_id)))
    }

    pub async fn get_guild_member_list(
        &self,
        guild_id: &str,
    ) -> Result<Vec<GuildMember>, BridgeError> {
        let members = self.api().get_group_member_list(parse_id(guild_id)?).await?;
        Ok(members
            .iter()
            .map(|m| member_from_info(m, self.is_self(m.user_id)))
            .collect())
    }

    /// With `permanent`, later join requests from the user are rejected.
    pub async fn kick_guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
        permanent: bool,
    ) -> Result<(), BridgeError> {
        Ok(self
            .api()
            .set_group_kick(parse_id(guild_id)?, parse_id(user_id)?, permanent)
            .await?)
    }

    /// Mutes a member; OneBot counts whole seconds, so `duration` is
    /// rounded to the nearest one. A zero duration lifts the mute.
    pub async fn mute_guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
        duration: Duration,
    ) -> Result<(), BridgeError> {
        self.api()
            .set_group_ban(parse_id(guild_id)?, parse_id(user_id)?, round_secs(duration))
            .await?;
        Ok(())
    }

    /// Mutes or unmutes a whole group.
    pub async fn mute_channel(&self, channel_id: &str, enable: bool) -> Result<(), BridgeError> {
        Ok(self
            .api()
            .set_group_whole_ban(parse_id(channel_id)?, enable)
            .await?)
    }

    /// Group role checks on a member record: `onebot.group.admin` and
    /// `onebot.group.owner` look at the member's first role. Unknown
    /// permission names are denied.
    pub fn check_permission(&self, name: &str, member: &GuildMember) -> bool {
        let role = member.roles.first().map(String::as_str);
        match name {
            "onebot.group.admin" => role == Some("admin"),
            "onebot.group.owner" => role == Some("owner"),
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Ingests one webhook body in HTTP mode and returns its session.
    ///
    /// The host application owns the HTTP server and routes POSTed event
    /// bodies here. Bodies for another account are refused.
    ///
    /// # Errors
    /// - [`BridgeError::Unauthorized`] when `self_id` is another account.
    /// - [`BridgeError::Session`] when the body is not a valid event.
    pub async fn handle_webhook(&self, body: &[u8]) -> Result<Option<Session>, BridgeError> {
        let value: Value = serde_json::from_slice(body).map_err(SessionError::from)?;
        let account = match value.get("self_id") {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        if let Some(account) = account.filter(|a| *a != self.inner.config.self_id) {
            return Err(BridgeError::Unauthorized(format!("event for account {account}")));
        }
        Ok(self.normalizer().normalize(value).await?)
    }

    /// Dials the configured forward WebSocket endpoint and runs the
    /// connection until it closes.
    ///
    /// # Errors
    /// [`BridgeError::Config`] unless the protocol is `ws`.
    pub async fn connect<H: EventHandler>(&self, handler: Arc<H>) -> Result<(), BridgeError> {
        let Protocol::Ws { endpoint } = &self.inner.config.protocol else {
            return Err(BridgeError::Config("connect requires the ws protocol".into()));
        };
        let conn =
            WebSocketConnection::connect(endpoint, self.inner.config.token.as_deref()).await?;
        tracing::info!(self_id = self.self_id(), endpoint, "connected");
        driver::run(self.clone(), conn, handler).await
    }

    /// Binds the reverse WebSocket listener for this bot.
    ///
    /// # Errors
    /// [`BridgeError::Config`] unless the protocol is `ws-reverse`.
    pub async fn bind_reverse(&self, addr: &str) -> Result<WebSocketListener, BridgeError> {
        let Protocol::WsReverse { path } = &self.inner.config.protocol else {
            return Err(BridgeError::Config(
                "bind_reverse requires the ws-reverse protocol".into(),
            ));
        };
        let config = ListenerConfig {
            path: path.clone(),
            self_id: self.inner.config.self_id.clone(),
            token: self.inner.config.token.clone(),
        };
        Ok(WebSocketListener::bind(addr, config).await?)
    }

    /// Accepts reverse connections from the implementation forever.
    ///
    /// One connection is served at a time: the bot has a single call
    /// table, and a reconnecting implementation is picked up as soon as
    /// the previous connection ends. Rejected handshakes are logged and
    /// skipped.
    pub async fn serve<H: EventHandler>(
        &self,
        mut listener: WebSocketListener,
        handler: Arc<H>,
    ) -> Result<(), BridgeError> {
        tracing::info!(self_id = self.self_id(), "reverse WebSocket serving");
        loop {
            match listener.accept().await {
                Ok(conn) => {
                    if let Err(e) = driver::run(self.clone(), conn, Arc::clone(&handler)).await {
                        tracing::debug!(error = %e, "connection ended with error");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Whole seconds, rounding half up.
fn round_secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis().saturating_add(500) / 1000).unwrap_or(i64::MAX)
}
