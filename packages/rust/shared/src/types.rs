//! Core domain types for PaperDigest runs.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PaperRecord
// ---------------------------------------------------------------------------

/// One retrieved search result with its metadata and derived text/summary.
///
/// Only `id` outlives a run (in the processed-id cache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Stable identifier; the document link.
    pub id: String,
    /// Paper title, whitespace-normalized.
    pub title: String,
    /// Author names in publication order.
    pub authors: Vec<String>,
    /// Calendar date of first submission.
    pub published_date: NaiveDate,
    /// The index-provided abstract.
    pub abstract_text: String,
    /// URL of the full document (PDF).
    pub document_link: String,
    /// Extracted plain text, or a sentinel when extraction failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    /// Generated summary, or a fallback string when summarization failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl PaperRecord {
    /// Authors joined for display (`"A. One, B. Two"`).
    pub fn authors_display(&self) -> String {
        self.authors.join(", ")
    }
}

// ---------------------------------------------------------------------------
// CombineMode
// ---------------------------------------------------------------------------

/// How keywords are combined into one query expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// Every keyword must match (conjunction).
    All,
    /// Any keyword may match (disjunction).
    #[default]
    Any,
}

impl CombineMode {
    /// The boolean operator placed between phrase-quoted keywords.
    pub fn operator(&self) -> &'static str {
        match self {
            Self::All => "AND",
            Self::Any => "OR",
        }
    }
}

impl fmt::Display for CombineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Any => f.write_str("any"),
        }
    }
}

impl FromStr for CombineMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "and" => Ok(Self::All),
            "any" | "or" => Ok(Self::Any),
            other => Err(format!(
                "unknown combine mode '{other}': expected 'all'/'and' or 'any'/'or'"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// DateFilter
// ---------------------------------------------------------------------------

/// Which search results are kept after the index returns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFilter {
    /// Keep the latest `limit` results as returned.
    #[default]
    Latest,
    /// Keep only results published on this day (in the reference timezone).
    PublishedOn(NaiveDate),
}

/// Config-file spelling of the date filter; "today" is resolved at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFilterMode {
    #[default]
    Latest,
    Today,
}

// ---------------------------------------------------------------------------
// ReportFormat
// ---------------------------------------------------------------------------

/// Layout of the local report file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Plain text blocks, one per paper.
    #[default]
    Text,
    /// A Markdown digest with headings and links.
    Markdown,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(format!(
                "unknown report format '{other}': expected 'text' or 'markdown'"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// PromptPreset
// ---------------------------------------------------------------------------

/// Built-in summarization prompt templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptPreset {
    /// Novelty, methodology, key findings, limitations.
    #[default]
    Structured,
    /// Core contribution, findings, definitions, limitations, implications.
    ResearchAssistant,
    /// Novelty, methodology, data, conclusion.
    Brief,
}
