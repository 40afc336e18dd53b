//! arXiv Atom feed parser.
//!
//! The search API answers with an Atom 1.0 document:
//! - Feed level: `<opensearch:totalResults>` with the total hit count
//! - One `<entry>` per paper: `id`, `title`, `summary`, `published`,
//!   `author/name`, and `link` elements (the PDF link has `title="pdf"`)
//!
//! Namespace prefixes are ignored; elements are matched by local name.

use std::sync::LazyLock;

use paperdigest_shared::{PaperDigestError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Raw fields of one `<entry>`, before date parsing and link fallback.
#[derive(Debug, Clone, Default)]
pub(crate) struct AtomEntry {
    /// Abstract-page URL (`http://arxiv.org/abs/<id>`).
    pub id: String,
    pub title: String,
    pub summary: String,
    /// RFC 3339 timestamp of the first version.
    pub published: Option<String>,
    pub authors: Vec<String>,
    /// `href` of the PDF link, when the entry carries one.
    pub pdf_link: Option<String>,
}

impl AtomEntry {
    /// arXiv reports query errors as a pseudo-entry under `/api/errors`.
    pub fn is_api_error(&self) -> bool {
        self.id.contains("/api/errors")
    }
}

/// A parsed result page.
#[derive(Debug, Clone, Default)]
pub(crate) struct AtomFeed {
    /// Total hits for the query across all pages.
    pub total_results: Option<u64>,
    /// Entries on this page, in feed order.
    pub entries: Vec<AtomEntry>,
}

/// Collapses runs of whitespace (titles and abstracts are hard-wrapped).
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

fn normalize_ws(s: &str) -> String {
    WS_RE.replace_all(s.trim(), " ").into_owned()
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse one page of search results.
pub(crate) fn parse_feed(xml: &str) -> Result<AtomFeed> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut feed = AtomFeed::default();
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<AtomEntry> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                if name == "entry" {
                    current = Some(AtomEntry::default());
                } else if name == "link" {
                    if let Some(entry) = current.as_mut() {
                        apply_link(entry, &e);
                    }
                }
                stack.push(name);
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                if local_name(&e) == "link" {
                    if let Some(entry) = current.as_mut() {
                        apply_link(entry, &e);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let chunk = t
                    .unescape()
                    .map_err(|e| PaperDigestError::parse(format!("bad text in Atom feed: {e}")))?;
                text.push_str(&chunk);
            }
            Ok(Event::End(_)) => {
                let name = stack.pop().unwrap_or_default();
                let value = normalize_ws(&text);
                text.clear();

                if name == "entry" {
                    if let Some(entry) = current.take() {
                        feed.entries.push(entry);
                    }
                    continue;
                }

                let parent = stack.last().map(String::as_str);
                match current.as_mut() {
                    Some(entry) => match name.as_str() {
                        "id" if parent == Some("entry") => entry.id = value,
                        "title" if parent == Some("entry") => entry.title = value,
                        "summary" => entry.summary = value,
                        "published" if !value.is_empty() => entry.published = Some(value),
                        "name" if parent == Some("author") && !value.is_empty() => {
                            entry.authors.push(value);
                        }
                        _ => {}
                    },
                    None => {
                        if name == "totalResults" {
                            feed.total_results = value.parse().ok();
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(PaperDigestError::parse(format!(
                    "malformed Atom feed near byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    if !stack.is_empty() {
        return Err(PaperDigestError::parse("truncated Atom feed"));
    }

    Ok(feed)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Record the PDF link if this `<link>` is one.
fn apply_link(entry: &mut AtomEntry, e: &BytesStart<'_>) {
    let mut href = None;
    let mut is_pdf = false;

    for attr in e.attributes().flatten() {
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => continue,
        };
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"title" if value == "pdf" => is_pdf = true,
            b"type" if value == "application/pdf" => is_pdf = true,
            _ => {}
        }
    }

    if is_pdf && href.is_some() {
        entry.pdf_link = href;
    }
}
