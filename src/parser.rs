use std::borrow::Cow;

use chrono::{DateTime, Utc};
use encoding_rs::Encoding;
use roxmltree::{Document, Node, ParsingOptions};
use tracing::warn;

/// Tag names locating each news field inside one website's feed.
///
/// Tags are compared by local name, so `encoded` matches `content:encoded`
/// and `creator` matches `dc:creator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSelectors {
    pub item_node: String,
    pub title_field: String,
    pub link_field: String,
    pub content_field: String,
    pub guid_field: String,
    pub author_field: Option<String>,
    pub published_field: Option<String>,
}

impl Default for FeedSelectors {
    fn default() -> Self {
        Self {
            item_node: "item".to_string(),
            title_field: "title".to_string(),
            link_field: "link".to_string(),
            content_field: "description".to_string(),
            guid_field: "guid".to_string(),
            author_field: None,
            published_field: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNews {
    pub title: String,
    pub link: String,
    pub content: String,
    pub guid: String,
    pub author: String,
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("feed payload is empty")]
    Empty,
    #[error("feed payload is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("malformed xml: {0}")]
    Xml(#[from] roxmltree::Error),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
enum ItemError {
    #[error("missing <{0}>")]
    MissingField(String),
    #[error("empty <{0}>")]
    EmptyField(String),
    #[error("link {0:?} contains whitespace or control characters")]
    InvalidLink(String),
}

/// Parse a raw feed into news records.
///
/// A malformed item is logged and skipped; only a document that cannot be
/// read as XML at all is an error.
pub fn parse_feed(raw: &[u8], selectors: &FeedSelectors) -> Result<Vec<ParsedNews>, ParseError> {
    let text = decode(raw)?;
    let text = text.trim_start_matches('\u{feff}').trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options)?;

    let mut news = Vec::new();
    for (index, item) in doc
        .descendants()
        .filter(|n| is_tag(n, &selectors.item_node))
        .enumerate()
    {
        match parse_item(item, selectors) {
            Ok(parsed) => news.push(parsed),
            Err(e) => warn!(index, error = %e, "Skipping malformed feed item"),
        }
    }

    Ok(news)
}

/// Decode by byte-order mark, then by the `encoding` of the XML declaration,
/// falling back to strict UTF-8.
fn decode(raw: &[u8]) -> Result<Cow<'_, str>, ParseError> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(raw) {
        let (text, _) = encoding.decode_without_bom_handling(&raw[bom_len..]);
        return Ok(text);
    }

    match declared_encoding(raw) {
        Some(encoding) if encoding != encoding_rs::UTF_8 => {
            let (text, _) = encoding.decode_without_bom_handling(raw);
            Ok(text)
        }
        _ => Ok(Cow::Borrowed(std::str::from_utf8(raw)?)),
    }
}

fn declared_encoding(raw: &[u8]) -> Option<&'static Encoding> {
    let head = &raw[..raw.len().min(512)];
    let start = head.iter().position(|b| !b.is_ascii_whitespace())?;
    let head = &head[start..];
    if !head.starts_with(b"<?xml") {
        return None;
    }
    let end = head.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&head[..end]).ok()?;

    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    let label = &rest[..rest.find(quote)?];

    Encoding::for_label(label.trim().as_bytes())
}

fn parse_item(item: Node, selectors: &FeedSelectors) -> Result<ParsedNews, ItemError> {
    let title = required_text(item, &selectors.title_field)?;
    let content = required_text(item, &selectors.content_field)?;
    let link = extract_link(item, &selectors.link_field)?;

    let guid = required_text(item, &selectors.guid_field)?;
    if guid.is_empty() {
        return Err(ItemError::EmptyField(selectors.guid_field.clone()));
    }

    let author = selectors
        .author_field
        .as_deref()
        .and_then(|tag| find_child(item, tag))
        .map(node_text)
        .unwrap_or_default();

    let published = selectors
        .published_field
        .as_deref()
        .and_then(|tag| find_child(item, tag))
        .and_then(|n| parse_timestamp(&node_text(n)));

    Ok(ParsedNews {
        title,
        link,
        content,
        guid,
        author,
        published,
    })
}

/// RSS puts the URL in the element text, Atom in its `href` attribute.
fn extract_link(item: Node, tag: &str) -> Result<String, ItemError> {
    let node = find_child(item, tag).ok_or_else(|| ItemError::MissingField(tag.to_string()))?;

    let text = node_text(node);
    let link = if !text.is_empty() {
        text
    } else {
        node.attribute("href")
            .map(|href| href.trim().to_string())
            .filter(|href| !href.is_empty())
            .ok_or_else(|| ItemError::EmptyField(tag.to_string()))?
    };

    // The link ends up in a `Location` header.
    if link.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ItemError::InvalidLink(link));
    }
    Ok(link)
}

fn required_text(item: Node, tag: &str) -> Result<String, ItemError> {
    find_child(item, tag)
        .map(node_text)
        .ok_or_else(|| ItemError::MissingField(tag.to_string()))
}

fn find_child<'a, 'input>(item: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    item.descendants()
        .skip(1)
        .find(|n| is_tag(n, tag))
}

fn is_tag(node: &Node, tag: &str) -> bool {
    node.is_element() && node.tag_name().name() == tag
}

/// All text below `node`, including CDATA sections, trimmed.
fn node_text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
