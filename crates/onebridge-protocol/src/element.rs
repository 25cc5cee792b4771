//! The platform-agnostic content tree.
//!
//! Applications describe outbound messages as a tree of [`Element`]s
//! (`<p>`, `<at>`, `<img>`, `<message forward>`, ...) and receive inbound
//! messages in the same shape. The OneBot-specific mapping lives in the
//! encoder and the event normalizer; this type knows nothing about CQ
//! codes.

use std::collections::BTreeMap;
use std::fmt;

/// One node of a content tree.
///
/// Text nodes have kind `text` and keep their characters in the
/// `content` attribute. Attribute values are strings; boolean flags are
/// expressed by presence (see [`Element::is_set`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub kind: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<Element>,
}

impl Element {
    /// Creates an element with no attributes and no children.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Creates a text node.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new("text").attr("content", content)
    }

    /// Builder-style attribute setter.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Builder-style child appender.
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Builder-style bulk child setter.
    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    /// Looks up an attribute.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// `true` when the attribute is present, whatever its value.
    pub fn has(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    /// `true` when the attribute is present and not `""`, `"false"` or `"0"`.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|v| !v.is_empty() && v != "false" && v != "0")
    }

    /// Returns `true` for text nodes.
    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }

    /// The characters of a text node (empty for other kinds).
    pub fn content(&self) -> &str {
        self.get("content").unwrap_or_default()
    }
}

fn escape_markup(source: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(source.len());
    for c in source.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Renders the canonical markup: `hi <at id="1"/>`.
impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_text() {
            return f.write_str(&escape_markup(self.content(), false));
        }
        write!(f, "<{}", self.kind)?;
        for (key, value) in &self.attrs {
            if value.is_empty() {
                write!(f, " {key}")?;
            } else {
                write!(f, " {key}=\"{}\"", escape_markup(value, true))?;
            }
        }
        if self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        for child in &self.children {
            write!(f, "{child}")?;
        }
        write!(f, "</{}>", self.kind)
    }
}

/// Renders a sequence of elements back to back.
pub fn render(elements: &[Element]) -> String {
    elements.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_text_escapes_angle_brackets() {
        assert_eq!(Element::text("a<b>&c").to_string(), "a&lt;b&gt;&amp;c");
    }

    #[test]
    fn test_display_self_closing_with_attributes() {
        let at = Element::new("at").attr("id", "1").attr("name", "A\"B");
        assert_eq!(at.to_string(), r#"<at id="1" name="A&quot;B"/>"#);
    }

    #[test]
    fn test_display_flag_attribute_and_children() {
        let msg = Element::new("message")
            .attr("forward", "")
            .child(Element::text("x"));
        assert_eq!(msg.to_string(), "<message forward>x</message>");
    }

    #[test]
    fn test_is_set_treats_false_and_zero_as_unset() {
        let img = Element::new("img").attr("cache", "false").attr("flash", "1");
        assert!(!img.is_set("cache"));
        assert!(img.is_set("flash"));
        assert!(!img.is_set("missing"));
        assert!(img.has("cache"));
    }

    #[test]
    fn test_render_concatenates() {
        let out = render(&[Element::text("hi "), Element::new("at").attr("id", "2")]);
        assert_eq!(out, r#"hi <at id="2"/>"#);
    }
}
