//! Paper source backed by the arXiv search API.
//!
//! A run starts here: the keyword set becomes one boolean query of quoted
//! phrases, results are requested newest-first and paged until the caller's
//! limit is reached, and each Atom entry becomes a [`PaperRecord`] whose id is
//! its PDF link.

mod parser;

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use paperdigest_shared::{
    CombineMode, DateFilter, PaperDigestError, PaperRecord, Result, SearchConfig, USER_AGENT,
    reference_offset,
};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::parser::{AtomEntry, AtomFeed};

/// Maximum number of redirects to follow when querying the index.
const MAX_REDIRECTS: usize = 3;

// ---------------------------------------------------------------------------
// SourceError
// ---------------------------------------------------------------------------

/// Why a search could not produce results. Always fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The request itself is unusable (no keywords, zero limit).
    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    /// The index was unreachable, answered with an error, or sent an unreadable feed.
    #[error("search index unavailable: {0}")]
    Unavailable(String),
}

impl From<SourceError> for PaperDigestError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::InvalidRequest(msg) => PaperDigestError::validation(msg),
            SourceError::Unavailable(msg) => PaperDigestError::SourceUnavailable(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Query building
// ---------------------------------------------------------------------------

/// Build the index query: every keyword as a quoted phrase, joined by the
/// operator of `mode`.
///
/// `["floods", "climate extremes"]` with [`CombineMode::Any`] becomes
/// `("floods") OR ("climate extremes")`. Embedded double quotes are stripped
/// so a keyword cannot break out of its phrase.
pub fn build_query(keywords: &[String], mode: CombineMode) -> std::result::Result<String, SourceError> {
    if keywords.is_empty() {
        return Err(SourceError::InvalidRequest("keyword list is empty".into()));
    }

    let mut phrases = Vec::with_capacity(keywords.len());
    for (i, keyword) in keywords.iter().enumerate() {
        let cleaned = keyword.replace('"', "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return Err(SourceError::InvalidRequest(format!(
                "keyword #{} is blank",
                i + 1
            )));
        }
        phrases.push(format!("(\"{cleaned}\")"));
    }

    Ok(phrases.join(&format!(" {} ", mode.operator())))
}

// ---------------------------------------------------------------------------
// Date filter
// ---------------------------------------------------------------------------

/// Apply the configured date filter to search results, preserving order.
pub fn filter_by_date(records: Vec<PaperRecord>, filter: DateFilter) -> Vec<PaperRecord> {
    match filter {
        DateFilter::Latest => records,
        DateFilter::PublishedOn(day) => {
            let before = records.len();
            let kept: Vec<PaperRecord> = records
                .into_iter()
                .filter(|r| r.published_date == day)
                .collect();
            debug!(%day, before, after = kept.len(), "date filter applied");
            kept
        }
    }
}

// ---------------------------------------------------------------------------
// PaperSource
// ---------------------------------------------------------------------------

/// Client for the arXiv query API.
pub struct PaperSource {
    client: Client,
    endpoint: Url,
    page_size: u32,
    offset: FixedOffset,
}

impl PaperSource {
    /// Create a source from the `[search]` config section.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            PaperDigestError::config(format!("invalid search endpoint '{}': {e}", config.endpoint))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            page_size: config.page_size.max(1),
            offset: reference_offset(config.utc_offset_hours),
        })
    }

    /// Search the index for the newest papers matching `keywords`.
    ///
    /// Returns at most `limit` records, newest first, with unique ids.
    /// `full_text` and `summary` are left unset.
    #[instrument(skip_all, fields(keywords = keywords.len(), limit, mode = %mode))]
    pub async fn search(
        &self,
        keywords: &[String],
        limit: u32,
        mode: CombineMode,
    ) -> std::result::Result<Vec<PaperRecord>, SourceError> {
        if limit == 0 {
            return Err(SourceError::InvalidRequest(
                "limit must be a positive integer".into(),
            ));
        }

        let query = build_query(keywords, mode)?;
        info!(%query, "querying paper index");

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut start: u32 = 0;

        while start < limit {
            let page_len = self.page_size.min(limit - start);
            let feed = self.fetch_page(&query, start, page_len).await?;
            let fetched = feed.entries.len();

            for entry in feed.entries {
                if entry.is_api_error() {
                    return Err(SourceError::Unavailable(format!(
                        "index rejected the query: {}",
                        entry.summary
                    )));
                }
                let Some(record) = self.to_record(entry) else {
                    continue;
                };
                if seen.insert(record.id.clone()) {
                    records.push(record);
                } else {
                    debug!(id = %record.id, "duplicate result dropped");
                }
            }

            start += fetched as u32;
            if (fetched as u32) < page_len {
                break;
            }
            if feed.total_results.is_some_and(|total| u64::from(start) >= total) {
                break;
            }
        }

        records.truncate(limit as usize);
        info!(results = records.len(), "search complete");
        Ok(records)
    }

    /// Fetch and parse one page of results.
    async fn fetch_page(
        &self,
        query: &str,
        start: u32,
        max_results: u32,
    ) -> std::result::Result<AtomFeed, SourceError> {
        debug!(start, max_results, "fetching result page");

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("search_query", query.to_string()),
                ("start", start.to_string()),
                ("max_results", max_results.to_string()),
                ("sortBy", "submittedDate".to_string()),
                ("sortOrder", "descending".to_string()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        let body = response.text().await.map_err(|e| {
            SourceError::Unavailable(format!("{}: failed to read body: {e}", self.endpoint))
        })?;

        parser::parse_feed(&body).map_err(|e| SourceError::Unavailable(e.to_string()))
    }

    /// Map a feed entry to a record, or skip it when it has no usable date.
    fn to_record(&self, entry: AtomEntry) -> Option<PaperRecord> {
        let published_date = match entry.published.as_deref().map(DateTime::parse_from_rfc3339) {
            Some(Ok(ts)) => ts.with_timezone(&self.offset).date_naive(),
            _ => {
                warn!(id = %entry.id, "entry has no valid published date, skipping");
                return None;
            }
        };

        let document_link = entry
            .pdf_link
            .unwrap_or_else(|| pdf_link_from_abs(&entry.id));

        Some(PaperRecord {
            id: document_link.clone(),
            title: entry.title,
            authors: entry.authors,
            published_date,
            abstract_text: entry.summary,
            document_link,
            full_text: None,
            summary: None,
        })
    }
}

/// `http://arxiv.org/abs/<id>` → `http://arxiv.org/pdf/<id>`.
fn pdf_link_from_abs(abs_url: &str) -> String {
    abs_url.replacen("/abs/", "/pdf/", 1)
}
