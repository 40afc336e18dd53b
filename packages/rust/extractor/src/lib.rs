//! Full-text extraction for paper PDFs.
//!
//! [`DocumentExtractor`] downloads a document link and turns the PDF into
//! plain text. Failures come back as an [`ExtractError`]; callers that want to
//! keep going use [`ExtractError::sentinel`] in place of the text.

mod pdf;

use std::time::Duration;

use paperdigest_shared::{ExtractorConfig, PaperDigestError, Result, USER_AGENT};
use reqwest::Client;
use tracing::{debug, instrument, warn};

/// Placeholder text when the document could not be retrieved.
pub const UNAVAILABLE_SENTINEL: &str = "Full text unavailable.";

/// Placeholder prefix when the document was retrieved but could not be parsed.
pub const FAILED_SENTINEL: &str = "Full text extraction failed.";

// ---------------------------------------------------------------------------
// ExtractError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Transport failure or a non-success status from the document host.
    #[error("document unavailable: {0}")]
    Unavailable(String),

    /// The bytes arrived but are not a readable PDF.
    #[error("extraction failed: {0}")]
    Failed(String),
}

impl ExtractError {
    /// Text stored on the record in place of the full text.
    pub fn sentinel(&self) -> String {
        match self {
            Self::Unavailable(_) => UNAVAILABLE_SENTINEL.to_string(),
            Self::Failed(detail) => format!("{FAILED_SENTINEL} {detail}"),
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentExtractor
// ---------------------------------------------------------------------------

pub struct DocumentExtractor {
    client: Client,
}

impl DocumentExtractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperDigestError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Download `link` and return the text of all pages joined by `"\n"`.
    #[instrument(skip(self), fields(link = %link))]
    pub async fn extract_text(&self, link: &str) -> std::result::Result<String, ExtractError> {
        let response = self
            .client
            .get(link)
            .send()
            .await
            .map_err(|e| ExtractError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "document fetch failed");
            return Err(ExtractError::Unavailable(format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExtractError::Unavailable(format!("failed to read body: {e}")))?;
        debug!(bytes = bytes.len(), "document downloaded");

        // lopdf is synchronous and can be slow on large papers
        tokio::task::spawn_blocking(move || pdf::extract_from_bytes(&bytes))
            .await
            .map_err(|e| ExtractError::Failed(format!("extraction task aborted: {e}")))?
    }
}
