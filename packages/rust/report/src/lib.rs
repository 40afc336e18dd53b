//! Rendering of summarized papers into digest text.
//!
//! Two consumers share these blocks: the destination document (plain
//! [`paper_block`]s under a [`digest_header`]) and the local report file
//! written by [`write_report`], either as the same plain text or as a
//! markdown digest.

use std::fmt::Write as _;
use std::path::Path;

use chrono::NaiveDate;
use paperdigest_shared::{PaperDigestError, PaperRecord, ReportFormat, Result};
use tracing::{info, instrument};

/// Line closing every paper block.
pub const SEPARATOR: &str = "--------------------------------------------------------------------------------";

/// Label opening each block; the title follows it on the same line.
pub const TITLE_LABEL: &str = "TITLE: ";

/// Shown when a record reaches rendering without a summary.
const MISSING_SUMMARY: &str = "No summary provided.";

// ---------------------------------------------------------------------------
// Plain blocks
// ---------------------------------------------------------------------------

/// Dated heading line for one run's digest, followed by a blank line.
pub fn digest_header(date: NaiveDate) -> String {
    format!("Research Paper Summaries ({})\n\n", date.format("%Y-%m-%d"))
}

/// One paper as a fixed plain-text block.
///
/// ```text
/// TITLE: ...
/// AUTHORS: ...
/// PUBLISHED: YYYY-MM-DD
/// PDF LINK: ...
///
/// ABSTRACT:
/// ...
///
/// GEMINI SUMMARY:
///
/// ...
/// ----------------------------------------------------------------
/// ```
pub fn paper_block(record: &PaperRecord) -> String {
    format!(
        "{TITLE_LABEL}{title}\n\
         AUTHORS: {authors}\n\
         PUBLISHED: {published}\n\
         PDF LINK: {link}\n\n\
         ABSTRACT:\n{abstract_text}\n\n\
         GEMINI SUMMARY:\n\n{summary}\n\
         {SEPARATOR}\n\n",
        title = record.title,
        authors = record.authors_display(),
        published = record.published_date.format("%Y-%m-%d"),
        link = record.document_link,
        abstract_text = record.abstract_text,
        summary = summary_of(record),
    )
}

fn summary_of(record: &PaperRecord) -> &str {
    record.summary.as_deref().unwrap_or(MISSING_SUMMARY)
}

// ---------------------------------------------------------------------------
// Report file
// ---------------------------------------------------------------------------

/// Render the full report for `records` in the requested layout.
pub fn render_report(format: ReportFormat, records: &[PaperRecord], date: NaiveDate) -> String {
    match format {
        ReportFormat::Text => {
            let mut out = digest_header(date);
            for record in records {
                out.push_str(&paper_block(record));
            }
            out
        }
        ReportFormat::Markdown => render_markdown(records, date),
    }
}

fn render_markdown(records: &[PaperRecord], date: NaiveDate) -> String {
    let mut out = format!("# Research Paper Summaries ({})\n\n", date.format("%Y-%m-%d"));
    for record in records {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "## {title}\n\n\
             **Authors:** {authors}\n\n\
             **Published:** {published}\n\n\
             **PDF Link:** [Link]({link})\n\n\
             **Abstract:**\n\n{abstract_text}\n\n\
             **Gemini Summary:**\n\n{summary}\n\n\
             ---\n\n",
            title = record.title,
            authors = record.authors_display(),
            published = record.published_date.format("%Y-%m-%d"),
            link = record.document_link,
            abstract_text = record.abstract_text,
            summary = summary_of(record),
        );
    }
    out
}

/// Write the report for `records` to `path`, replacing any previous report.
#[instrument(skip(records), fields(path = %path.display(), count = records.len()))]
pub fn write_report(
    path: &Path,
    format: ReportFormat,
    records: &[PaperRecord],
    date: NaiveDate,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PaperDigestError::io(parent, e))?;
    }

    let content = render_report(format, records, date);
    std::fs::write(path, content).map_err(|e| PaperDigestError::io(path, e))?;

    info!(?format, "report written");
    Ok(())
}
