//! Outbound message encoding.
//!
//! [`MessageEncoder`] walks a content tree and turns it into one or more
//! OneBot sends. Most elements become segments appended to the current
//! message; a few force the pending segments out first (media that
//! cannot share a message, quotes, files). Forward bundles
//! (`<message forward>` or `<figure>`) collect their children as `node`
//! segments and go out as one forward message.
//!
//! The encoder keeps an explicit stack of frames, one per bundle level:
//!
//! ```text
//! [Message]                          <p>hi</p>
//! [Message, Forward]                 <message forward> ... </message>
//! [Message, Forward, Forward]        a bundle nested in a bundle
//! ```
//!
//! The bottom frame is always `Message`. Leaving a `Forward` frame either
//! sends its nodes (parent is `Message`) or wraps them into one node of
//! the parent bundle (parent is `Forward`).
//!
//! The tree is walked with an explicit work list rather than recursion,
//! so arbitrarily deep content cannot overflow the stack.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

use onebridge_protocol::{Element, Segment};
use onebridge_rpc::{Api, Caller};
use onebridge_session::{PRIVATE_PREFIX, SentMessage};

use crate::BridgeError;
use crate::error::parse_id;

/// `data:<mime>;base64,` prefix of inline media.
static DATA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:([\w/.+-]+);base64,")
        .unwrap_or_else(|e| unreachable!("data URL pattern is a valid regex: {e}"))
});

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Where a message goes: a group, or a user when the channel id is
/// `private:<user id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub channel_id: String,
    pub guild_id: Option<String>,
    peer: Peer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Peer {
    User(i64),
    Group(i64),
}

impl Target {
    /// Parses a canonical channel id.
    ///
    /// # Errors
    /// [`BridgeError::InvalidId`] when the numeric part is not a number.
    pub fn parse(channel_id: &str) -> Result<Self, BridgeError> {
        let (peer, guild_id) = match channel_id.strip_prefix(PRIVATE_PREFIX) {
            Some(user) => (Peer::User(parse_id(user)?), None),
            None => (Peer::Group(parse_id(channel_id)?), Some(channel_id.to_string())),
        };
        Ok(Self {
            channel_id: channel_id.to_string(),
            guild_id,
            peer,
        })
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.peer, Peer::User(_))
    }
}

/// Encoder settings that come from the bot, not the message.
#[derive(Debug, Clone, Default)]
pub struct EncoderOptions {
    pub self_id: String,
    /// Guild sub-bots cannot send forward bundles.
    pub sub_bot: bool,
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Message,
    Forward,
}

/// Who a forward node is attributed to, set by `<author>` and
/// `<message>` attributes.
#[derive(Debug, Clone, Default)]
struct Author {
    user_id: Option<String>,
    username: Option<String>,
    nickname: Option<String>,
    time: Option<String>,
    /// Reference an existing message instead of sending content.
    message_id: Option<String>,
}

impl Author {
    /// Merges the identity attributes of `element`. Both the short
    /// (`id`, `name`, `nick`) and the long (`userId`, `username`,
    /// `nickname`) spellings are understood.
    fn merge(&mut self, element: &Element) {
        let pick = |keys: &[&str]| keys.iter().find_map(|k| element.get(k)).map(str::to_string);
        if let Some(v) = pick(&["userId", "id"]) {
            self.user_id = Some(v);
        }
        if let Some(v) = pick(&["username", "name"]) {
            self.username = Some(v);
        }
        if let Some(v) = pick(&["nickname", "nick"]) {
            self.nickname = Some(v);
        }
        if let Some(v) = pick(&["time"]) {
            self.time = Some(v);
        }
    }

    fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    /// Content of the message (or node) being built.
    segments: Vec<Segment>,
    /// Completed `node` segments; only used by `Forward` frames.
    nodes: Vec<Segment>,
    author: Author,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            segments: Vec::new(),
            nodes: Vec::new(),
            author: Author::default(),
        }
    }
}

/// One unit of pending work in the tree walk.
enum Task<'a> {
    Visit(&'a Element),
    Text(String),
    Flush,
    LeaveForward,
    /// Restores the top frame's author once a `<message>` is done.
    SetAuthor(Author),
}

// ---------------------------------------------------------------------------
// MessageEncoder
// ---------------------------------------------------------------------------

/// Encodes one outbound message tree for one target.
pub struct MessageEncoder<'a, C> {
    api: &'a Api<C>,
    target: Target,
    options: EncoderOptions,
    stack: Vec<Frame>,
    results: Vec<SentMessage>,
}

impl<'a, C: Caller> MessageEncoder<'a, C> {
    pub fn new(api: &'a Api<C>, target: Target, options: EncoderOptions) -> Self {
        Self {
            api,
            target,
            options,
            stack: vec![Frame::new(FrameKind::Message)],
            results: Vec::new(),
        }
    }

    /// Encodes and sends `elements`, returning one result per send in
    /// the order they went out.
    ///
    /// # Errors
    /// The first failed action aborts the walk; messages already sent
    /// stay sent.
    pub async fn send(mut self, elements: &[Element]) -> Result<Vec<SentMessage>, BridgeError> {
        self.render(elements).await?;
        self.flush().await?;
        Ok(self.results)
    }

    async fn render(&mut self, elements: &[Element]) -> Result<(), BridgeError> {
        let mut work: Vec<Task<'_>> = elements.iter().rev().map(Task::Visit).collect();
        while let Some(task) = work.pop() {
            match task {
                Task::Visit(element) => self.visit(element, &mut work).await?,
                Task::Text(text) => self.push_text(&text),
                Task::Flush => self.flush().await?,
                Task::LeaveForward => self.leave_forward().await?,
                Task::SetAuthor(author) => self.top_mut().author = author,
            }
        }
        Ok(())
    }

    /// Handles one element. Work that must happen after the element's
    /// children is pushed before them, so it pops after them.
    async fn visit<'e>(
        &mut self,
        element: &'e Element,
        work: &mut Vec<Task<'e>>,
    ) -> Result<(), BridgeError> {
        let children = |work: &mut Vec<Task<'e>>| {
            work.extend(element.children.iter().rev().map(Task::Visit));
        };

        match element.kind.as_str() {
            "text" => self.push_text(element.content()),
            "br" => self.push_text("\n"),
            "p" => {
                match self.top_mut().segments.last_mut() {
                    Some(last) if last.is_text() => {
                        if !last.text_content().ends_with('\n') {
                            let text = format!("{}\n", last.text_content());
                            last.data.insert(Segment::TEXT_KEY.into(), Value::String(text));
                        }
                    }
                    _ => self.push_segment(Segment::text("\n")),
                }
                work.push(Task::Text("\n".into()));
                children(work);
            }
            "at" => {
                let segment = if element.get("type") == Some("all") {
                    Segment::new("at").with("qq", "all")
                } else {
                    let at = Segment::new("at").with("qq", element.get("id").unwrap_or_default());
                    match element.get("name") {
                        Some(name) => at.with("name", name),
                        None => at,
                    }
                };
                self.push_segment(segment);
            }
            "sharp" => {
                if let Some(id) = element.get("id") {
                    self.push_text(id);
                }
            }
            "face" => match element.get("platform") {
                Some(platform) if platform != "onebot" => children(work),
                _ => self.push_segment(
                    Segment::new("face").with("id", element.get("id").unwrap_or_default()),
                ),
            },
            "a" => {
                if let Some(href) = element.get("href") {
                    work.push(Task::Text(format!("（{href}）")));
                }
                children(work);
            }
            "img" | "image" | "audio" | "video" => {
                let kind = match element.kind.as_str() {
                    "audio" => "record",
                    "video" => "video",
                    _ => "image",
                };
                if kind != "image" {
                    self.flush().await?;
                }
                self.push_segment(media_segment(kind, element));
            }
            "file" => {
                self.flush().await?;
                self.send_file(element).await?;
            }
            "onebot:music" => {
                self.flush().await?;
                self.push_segment(with_attrs(Segment::new("music"), element));
            }
            "onebot:poke" => {
                self.flush().await?;
                let poke = Segment::new("poke").with("type", "poke");
                self.push_segment(with_attrs(poke, element));
            }
            "onebot:json" => {
                self.flush().await?;
                self.push_segment(
                    Segment::new("json").with("data", element.get("data").unwrap_or_default()),
                );
            }
            "author" => self.top_mut().author.merge(element),
            "quote" => {
                self.flush().await?;
                self.push_segment(
                    Segment::new("reply").with("id", element.get("id").unwrap_or_default()),
                );
            }
            "figure" if self.options.sub_bot => {
                work.push(Task::Flush);
                children(work);
            }
            "figure" => {
                self.enter_forward().await?;
                work.push(Task::LeaveForward);
                work.push(Task::Flush);
                children(work);
            }
            "message" => {
                self.flush().await?;
                if element.has("forward") && !self.options.sub_bot {
                    self.enter_forward().await?;
                    work.push(Task::LeaveForward);
                    work.push(Task::Flush);
                    children(work);
                } else if let Some(id) = element.get("id") {
                    self.top_mut().author.message_id = Some(id.to_string());
                } else {
                    let author = &mut self.top_mut().author;
                    let saved = author.clone();
                    author.merge(element);
                    work.push(Task::SetAuthor(saved));
                    work.push(Task::Flush);
                    children(work);
                }
            }
            _ => children(work),
        }
        Ok(())
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn push_segment(&mut self, segment: Segment) {
        self.top_mut().segments.push(segment);
    }

    /// Appends text, extending a trailing text segment when there is one.
    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.top_mut().segments.last_mut().filter(|s| s.is_text()) {
            let joined = format!("{}{text}", last.text_content());
            last.data.insert(Segment::TEXT_KEY.into(), Value::String(joined));
            return;
        }
        self.push_segment(Segment::text(text));
    }

    // -----------------------------------------------------------------------
    // Flushing
    // -----------------------------------------------------------------------

    /// Emits the top frame's pending content: a `node` for a bundle, a
    /// send for a plain message. No-op when nothing is pending.
    async fn flush(&mut self) -> Result<(), BridgeError> {
        let frame = self.top_mut();
        trim_edges(&mut frame.segments);
        if frame.segments.is_empty() && frame.author.message_id.is_none() {
            return Ok(());
        }

        let kind = frame.kind;
        let segments = std::mem::take(&mut frame.segments);
        let message_id = frame.author.message_id.take();

        match kind {
            FrameKind::Forward => {
                let node = match message_id {
                    Some(id) if segments.is_empty() => Segment::new("node").with("id", id),
                    _ => self.content_node(json!(segments)),
                };
                self.top_mut().nodes.push(node);
            }
            FrameKind::Message => {
                if segments.is_empty() {
                    return Ok(());
                }
                let id = match self.target.peer {
                    Peer::User(user_id) => self.api.send_private_msg(user_id, &segments).await?,
                    Peer::Group(group_id) => self.api.send_group_msg(group_id, &segments).await?,
                };
                self.record(id.to_string());
            }
        }
        Ok(())
    }

    /// A `node` carrying `content`, attributed to the top frame's author
    /// (the bot itself when no author was given).
    fn content_node(&mut self, content: Value) -> Segment {
        let author = &self.top_mut().author;
        let user_id = author.user_id.clone();
        let nickname = author.display_name().to_string();
        let time = author.time.clone();
        let node = Segment::new("node")
            .with("user_id", user_id.unwrap_or_else(|| self.options.self_id.clone()))
            .with("nickname", nickname)
            .with("content", content);
        match time {
            Some(time) => node.with("time", time),
            None => node,
        }
    }

    async fn enter_forward(&mut self) -> Result<(), BridgeError> {
        self.flush().await?;
        self.stack.push(Frame::new(FrameKind::Forward));
        Ok(())
    }

    /// Pops a bundle: sends it, or nests it into the enclosing bundle.
    async fn leave_forward(&mut self) -> Result<(), BridgeError> {
        if self.stack.len() < 2 {
            return Ok(());
        }
        let Some(frame) = self.stack.pop() else {
            return Ok(());
        };
        if frame.nodes.is_empty() {
            return Ok(());
        }

        let parent = self.top_mut().kind;
        match parent {
            FrameKind::Forward => {
                let node = self.content_node(json!(frame.nodes));
                self.top_mut().nodes.push(node);
            }
            FrameKind::Message => {
                let id = match self.target.peer {
                    Peer::User(user_id) => {
                        self.api.send_private_forward_msg(user_id, &frame.nodes).await?
                    }
                    Peer::Group(group_id) => {
                        self.api.send_group_forward_msg(group_id, &frame.nodes).await?
                    }
                };
                self.record(id.to_string());
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    /// Uploads a file. Upload actions return no message id, so the
    /// result has an empty one.
    async fn send_file(&mut self, element: &Element) -> Result<(), BridgeError> {
        let src = element
            .get("src")
            .or_else(|| element.get("url"))
            .ok_or_else(|| BridgeError::InvalidFile("file element without src".into()))?;
        let name = match element.get("title") {
            Some(title) => title.to_string(),
            None => file_name(src),
        };

        let path = if src.starts_with("file:") {
            url::Url::parse(src)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .map(|path| path.to_string_lossy().into_owned())
                .ok_or_else(|| BridgeError::InvalidFile(src.to_string()))?
        } else {
            self.api.download_file(src).await?
        };

        match self.target.peer {
            Peer::User(user_id) => self.api.upload_private_file(user_id, &path, &name).await?,
            Peer::Group(group_id) => {
                self.api.upload_group_file(group_id, &path, &name, None).await?
            }
        }
        tracing::debug!(channel = %self.target.channel_id, %name, "uploaded file");
        self.record(String::new());
        Ok(())
    }

    fn record(&mut self, id: String) {
        self.results.push(SentMessage {
            id,
            channel_id: self.target.channel_id.clone(),
            guild_id: self.target.guild_id.clone(),
            self_id: self.options.self_id.clone(),
            is_direct: self.target.is_direct(),
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Trims whitespace off the outer text segments, dropping those that
/// end up empty.
fn trim_edges(segments: &mut Vec<Segment>) {
    while let Some(first) = segments.first_mut().filter(|s| s.is_text()) {
        let trimmed = first.text_content().trim_start().to_string();
        if trimmed.is_empty() {
            segments.remove(0);
        } else {
            first.data.insert(Segment::TEXT_KEY.into(), Value::String(trimmed));
            break;
        }
    }
    while let Some(last) = segments.last_mut().filter(|s| s.is_text()) {
        let trimmed = last.text_content().trim_end().to_string();
        if trimmed.is_empty() {
            segments.pop();
        } else {
            last.data.insert(Segment::TEXT_KEY.into(), Value::String(trimmed));
            break;
        }
    }
}

/// Copies every attribute of `element` onto `segment`, overriding.
fn with_attrs(mut segment: Segment, element: &Element) -> Segment {
    for (key, value) in &element.attrs {
        segment = segment.with(key.clone(), value.clone());
    }
    segment
}

/// An `image`, `record` or `video` segment. `file` comes from `src` (or
/// `url`), `cache` becomes 0/1 and data URLs become `base64://`.
fn media_segment(kind: &str, element: &Element) -> Segment {
    let mut segment = Segment::new(kind);
    for (key, value) in &element.attrs {
        if !matches!(key.as_str(), "src" | "url" | "cache") {
            segment = segment.with(key.clone(), value.clone());
        }
    }

    let src = element
        .get("src")
        .or_else(|| element.get("url"))
        .unwrap_or_default();
    let file = match DATA_URL.find(src) {
        Some(prefix) => format!("base64://{}", &src[prefix.end()..]),
        None => src.to_string(),
    };
    segment
        .with("file", file)
        .with("cache", i64::from(element.is_set("cache")))
}

/// The last path segment of a URL, for naming uploads.
fn file_name(src: &str) -> String {
    url::Url::parse(src)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "file".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse_private_and_group() {
        let private = Target::parse("private:10").unwrap();
        assert!(private.is_direct());
        assert_eq!(private.guild_id, None);

        let group = Target::parse("100").unwrap();
        assert!(!group.is_direct());
        assert_eq!(group.guild_id.as_deref(), Some("100"));

        assert!(Target::parse("private:abc").is_err());
    }

    #[test]
    fn test_trim_edges_drops_blank_text() {
        let mut segments = vec![
            Segment::text("  "),
            Segment::text("\n hi"),
            Segment::new("face").with("id", "1"),
            Segment::text("there \n"),
        ];
        trim_edges(&mut segments);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].text_content(), "hi");
        assert_eq!(segments[2].text_content(), "there");
    }

    #[test]
    fn test_trim_edges_stops_at_non_text() {
        let mut segments = vec![Segment::new("at").with("qq", "1"), Segment::text(" x ")];
        trim_edges(&mut segments);
        assert_eq!(segments[1].text_content(), " x");
    }

    #[test]
    fn test_media_segment_data_url_becomes_base64() {
        let img = Element::new("img").attr("src", "data:image/png;base64,AAAA");
        let seg = media_segment("image", &img);
        assert_eq!(seg.get_str("file"), Some("base64://AAAA"));
        assert_eq!(seg.data.get("cache"), Some(&json!(0)));
        assert!(!seg.data.contains_key("src"));
    }

    #[test]
    fn test_media_segment_url_and_cache_flag() {
        let img = Element::new("video")
            .attr("url", "http://x/v.mp4")
            .attr("cache", "true")
            .attr("proxy", "false");
        let seg = media_segment("video", &img);
        assert_eq!(seg.get_str("file"), Some("http://x/v.mp4"));
        assert_eq!(seg.data.get("cache"), Some(&json!(1)));
        assert_eq!(seg.get_str("proxy"), Some("false"));
        assert!(!seg.data.contains_key("url"));
    }

    #[test]
    fn test_file_name_from_url_path() {
        assert_eq!(file_name("https://h/a/b/report.pdf?x=1"), "report.pdf");
        assert_eq!(file_name("https://h/"), "file");
        assert_eq!(file_name("not a url"), "file");
    }
}
