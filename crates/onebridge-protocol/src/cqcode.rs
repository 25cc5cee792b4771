//! The CQ-code inline markup codec.
//!
//! OneBot embeds rich content in message strings as bracketed codes:
//!
//! ```text
//! [CQ:at,qq=123,name=Alice]hello
//! ```
//!
//! Literal text is unmarked. Three characters are structural (`&`, `[`,
//! `]`) and are replaced by fixed placeholders; inside an attribute value
//! `,` is escaped too. Everything here is a pure function.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::Segment;

/// `[CQ:name(,key=value)*]`, first occurrence only.
static CQ_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[CQ:([A-Za-z0-9_]+)((?:,[A-Za-z0-9_]+=[^,\]]*)*)\]")
        .unwrap_or_else(|e| unreachable!("CQ pattern is a valid regex: {e}"))
});

static UNESCAPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#91;|&#93;|&#44;|&amp;")
        .unwrap_or_else(|e| unreachable!("unescape pattern is a valid regex: {e}"))
});

/// Pictographs that implementations choke on inside attribute values.
fn is_unsafe_symbol(c: char) -> bool {
    matches!(
        c,
        '\u{1F300}'..='\u{1F64F}' | '\u{1F680}'..='\u{1F6FF}' | '\u{2600}'..='\u{2B55}'
    )
}

/// Replaces the structural characters with their placeholders.
///
/// With `inline` set the result is safe inside a single attribute slot:
/// `,` is escaped as well and pictographic symbols become a space.
pub fn escape(source: &str, inline: bool) -> String {
    let mut out = String::with_capacity(source.len());
    for c in source.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '[' => out.push_str("&#91;"),
            ']' => out.push_str("&#93;"),
            ',' if inline => out.push_str("&#44;"),
            c if inline && is_unsafe_symbol(c) => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

/// Reverses [`escape`]'s placeholders in one left-to-right pass, so
/// `&amp;#91;` comes back as `&#91;` rather than `[`.
pub fn unescape(source: &str) -> String {
    UNESCAPE_PATTERN
        .replace_all(source, |caps: &Captures<'_>| match &caps[0] {
            "&#91;" => "[",
            "&#93;" => "]",
            "&#44;" => ",",
            _ => "&",
        })
        .into_owned()
}

/// One matched code inside a larger string.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    /// Tag name, e.g. `at`.
    pub kind: String,
    /// Attributes with unescaped values.
    pub data: Map<String, Value>,
    /// Byte offset of the opening `[`.
    pub start: usize,
    /// Byte length of the whole code.
    pub len: usize,
}

impl Capture {
    /// Converts the capture into a segment, dropping position info.
    pub fn into_segment(self) -> Segment {
        Segment {
            kind: self.kind,
            data: self.data,
        }
    }
}

/// Finds the first well-formed code in `source`.
///
/// Returns `None` when nothing matches; malformed codes are never an
/// error.
pub fn parse_one(source: &str) -> Option<Capture> {
    let caps = CQ_PATTERN.captures(source)?;
    let whole = caps.get(0)?;
    let kind = caps.get(1)?.as_str().to_string();

    let mut data = Map::new();
    let attrs = caps.get(2).map_or("", |m| m.as_str());
    for pair in attrs.split(',').skip(1) {
        if let Some((key, value)) = pair.split_once('=') {
            data.insert(key.to_string(), Value::String(unescape(value)));
        }
    }

    Some(Capture {
        kind,
        data,
        start: whole.start(),
        len: whole.len(),
    })
}

/// Decodes a whole markup string into an ordered segment sequence.
///
/// Text between codes becomes `text` segments (empty spans are
/// skipped). Each iteration consumes at least one matched code, so the
/// loop always terminates.
pub fn parse_all(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = source;

    while let Some(capture) = parse_one(rest) {
        let leading = unescape(&rest[..capture.start]);
        if !leading.is_empty() {
            segments.push(Segment::text(leading));
        }
        rest = &rest[capture.start + capture.len..];
        segments.push(capture.into_segment());
    }

    if !rest.is_empty() {
        segments.push(Segment::text(unescape(rest)));
    }
    segments
}

/// Accepts an already-structured segment array.
///
/// Text segments without a `text` attribute are normalized to an empty
/// string so downstream code can rely on the key.
pub fn parse_segments(list: &[Segment]) -> Vec<Segment> {
    list.iter()
        .map(|seg| {
            if seg.is_text() && seg.get_str(Segment::TEXT_KEY).is_none() {
                Segment::text(seg.get_string(Segment::TEXT_KEY).unwrap_or_default())
            } else {
                seg.clone()
            }
        })
        .collect()
}

/// JavaScript-style truthiness used to decide which attributes are
/// written: `null`, `false`, `0` and `""` are dropped.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Renders an attribute value the way it appears in markup.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Encodes one segment as markup.
///
/// Text is emitted raw, without brackets. Every other tag becomes
/// `[CQ:tag,key=value...]` with falsy attributes omitted, so empty
/// strings, `0` and `false` do not survive a round trip.
pub fn serialize(segment: &Segment) -> String {
    if segment.is_text() {
        return segment.text_content().to_string();
    }
    let mut out = format!("[CQ:{}", segment.kind);
    for (key, value) in &segment.data {
        if is_truthy(value) {
            out.push(',');
            out.push_str(key);
            out.push('=');
            out.push_str(&escape(&value_to_string(value), true));
        }
    }
    out.push(']');
    out
}

/// Encodes a segment sequence as one markup string.
pub fn serialize_all(segments: &[Segment]) -> String {
    segments.iter().map(serialize).collect()
}
