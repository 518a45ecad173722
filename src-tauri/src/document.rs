//! The editor's document: one blob of HTML markup, replaced wholesale.
//!
//! There is no versioning and no merge. Every write goes through
//! [`DocumentHandle::replace`], which swaps the whole markup and notifies
//! subscribers with the origin of the change.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Rich content as produced by the editing surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    markup: String,
}

impl Document {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
        }
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn into_markup(self) -> String {
        self.markup
    }

    pub fn is_empty(&self) -> bool {
        self.markup.is_empty()
    }

    /// Text as the page would report it through `innerText`: tags dropped,
    /// block boundaries and `<br>` turned into line breaks, entities decoded.
    pub fn plain_text(&self) -> String {
        let mut out = String::with_capacity(self.markup.len());
        let mut rest = self.markup.as_str();

        while let Some(open) = rest.find('<') {
            push_decoded(&mut out, &rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('>') else {
                // unterminated tag, keep it as text
                push_decoded(&mut out, &rest[open..]);
                rest = "";
                break;
            };

            let tag = &after[..close];
            let name = tag_name(tag);
            if name == "br" {
                out.push('\n');
            } else if is_block(&name) && !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            rest = &after[close + 1..];
        }
        push_decoded(&mut out, rest);

        out.trim_end_matches('\n').to_string()
    }

    /// Appends plain text at the end of the document, escaped as markup.
    pub fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            match ch {
                '&' => self.markup.push_str("&amp;"),
                '<' => self.markup.push_str("&lt;"),
                '>' => self.markup.push_str("&gt;"),
                '\n' => self.markup.push_str("<br>"),
                _ => self.markup.push(ch),
            }
        }
    }
}

impl From<String> for Document {
    fn from(markup: String) -> Self {
        Self::new(markup)
    }
}

impl From<&str> for Document {
    fn from(markup: &str) -> Self {
        Self::new(markup)
    }
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "li"
            | "ul"
            | "ol"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "blockquote"
            | "pre"
            | "tr"
            | "table"
    )
}

fn push_decoded(out: &mut String, text: &str) {
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match after.find(';').and_then(|end| decode_entity(&after[..end]).map(|c| (end, c))) {
            Some((end, ch)) => {
                out.push(ch);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = entity.strip_prefix('#')?;
            let value = match code.strip_prefix(|c: char| c == 'x' || c == 'X') {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Where a document replacement came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local,
    /// Snapshot received on the data channel of this session.
    Remote(String),
    Storage,
    Voice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub document: Document,
    pub origin: Origin,
}

/// Shared, observable slot holding the current document.
#[derive(Clone)]
pub struct DocumentHandle {
    tx: Arc<watch::Sender<Revision>>,
}

impl DocumentHandle {
    pub fn new(document: Document) -> Self {
        let (tx, _rx) = watch::channel(Revision {
            document,
            origin: Origin::Local,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Document {
        self.tx.borrow().document.clone()
    }

    /// Overwrites the document unconditionally.
    pub fn replace(&self, document: Document, origin: Origin) {
        self.tx.send_replace(Revision { document, origin });
    }

    pub fn subscribe(&self) -> watch::Receiver<Revision> {
        self.tx.subscribe()
    }
}

impl Default for DocumentHandle {
    fn default() -> Self {
        Self::new(Document::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_flattens_formatting() {
        let doc = Document::new("<b>Hello</b> <i>world</i>");
        assert_eq!(doc.plain_text(), "Hello world");
    }

    #[test]
    fn plain_text_breaks_lines_on_blocks() {
        let doc = Document::new("first<div>second</div><div>third<br>fourth</div>");
        assert_eq!(doc.plain_text(), "first\nsecond\nthird\nfourth");
    }

    #[test]
    fn plain_text_decodes_entities() {
        let doc = Document::new("a &amp; b &lt;c&gt; &#65;&#x42; &unknown;");
        assert_eq!(doc.plain_text(), "a & b <c> AB &unknown;");
    }

    #[test]
    fn unterminated_tag_is_text() {
        let doc = Document::new("1 <2");
        assert_eq!(doc.plain_text(), "1 <2");
    }

    #[test]
    fn append_text_escapes_markup() {
        let mut doc = Document::new("<p>note</p>");
        doc.append_text("a<b> & c\nd");
        assert_eq!(doc.markup(), "<p>note</p>a&lt;b&gt; &amp; c<br>d");
        assert_eq!(doc.plain_text(), "note\na<b> & c\nd");
    }

    #[test]
    fn handle_notifies_subscribers_with_origin() {
        let handle = DocumentHandle::default();
        let mut rx = handle.subscribe();

        handle.replace(Document::new("<p>x</p>"), Origin::Remote("abc".into()));

        assert!(rx.has_changed().unwrap());
        let rev = rx.borrow_and_update().clone();
        assert_eq!(rev.document.markup(), "<p>x</p>");
        assert_eq!(rev.origin, Origin::Remote("abc".into()));
        assert_eq!(handle.snapshot().markup(), "<p>x</p>");
    }
}
