//! Syndication Parsing
//!
//! Pure RSS 2.0 / Atom parsing into a common entry shape. No network code
//! here; the collector hands in the fetched document body.

use quick_xml::events::Event;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error("not a syndication document")]
    UnknownFormat,
    #[error("malformed feed: {0}")]
    Malformed(String),
}

/// One feed entry, format-independent
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: Option<chrono::DateTime<chrono::Utc>>,
}

/// Parse an RSS 2.0 or Atom document into entries. Entries without a link
/// are dropped; they cannot participate in URL dedup.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, FeedParseError> {
    match root_element(xml).as_deref() {
        Some("rss") => parse_rss(xml),
        Some("feed") => parse_atom(xml),
        _ => Err(FeedParseError::UnknownFormat),
    }
}

/// Name of the first start element, skipping the XML declaration, comments
/// and doctype
fn root_element(xml: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                return Some(String::from_utf8_lossy(start.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

// =============================================================================
// RSS 2.0
// =============================================================================

#[derive(Debug, Deserialize)]
struct RssDocument {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(default, rename = "item")]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

fn parse_rss(xml: &str) -> Result<Vec<FeedEntry>, FeedParseError> {
    let doc: RssDocument =
        quick_xml::de::from_str(xml).map_err(|e| FeedParseError::Malformed(e.to_string()))?;

    let entries = doc
        .channel
        .items
        .into_iter()
        .filter_map(|item| {
            let link = item.link?.trim().to_string();
            if link.is_empty() {
                return None;
            }
            Some(FeedEntry {
                title: item.title.unwrap_or_default().trim().to_string(),
                link,
                summary: item.description.unwrap_or_default(),
                published: item
                    .pub_date
                    .as_deref()
                    .and_then(|d| chrono::DateTime::parse_from_rfc2822(d).ok())
                    .map(|d| d.with_timezone(&chrono::Utc)),
            })
        })
        .collect();

    Ok(entries)
}

// =============================================================================
// Atom
// =============================================================================

#[derive(Debug, Deserialize)]
struct AtomDocument {
    #[serde(default, rename = "entry")]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(default, rename = "link")]
    links: Vec<AtomLink>,
    summary: Option<String>,
    content: Option<String>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

fn parse_atom(xml: &str) -> Result<Vec<FeedEntry>, FeedParseError> {
    let doc: AtomDocument =
        quick_xml::de::from_str(xml).map_err(|e| FeedParseError::Malformed(e.to_string()))?;

    let entries = doc
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = pick_atom_link(&entry.links)?;
            let timestamp = entry.published.as_deref().or(entry.updated.as_deref());
            Some(FeedEntry {
                title: entry.title.unwrap_or_default().trim().to_string(),
                link,
                summary: entry.summary.or(entry.content).unwrap_or_default(),
                published: timestamp
                    .and_then(|d| chrono::DateTime::parse_from_rfc3339(d).ok())
                    .map(|d| d.with_timezone(&chrono::Utc)),
            })
        })
        .collect();

    Ok(entries)
}

/// Prefer the alternate (or untyped) link; fall back to the first href
fn pick_atom_link(links: &[AtomLink]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .and_then(|l| l.href.clone())
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
}
