//! Destination document sink: Google Docs batch update and Drive PDF export.
//!
//! A run's digest is inserted at the top of the shared document in a single
//! `batchUpdate`: the dated header, then one block per paper in input order.
//! Document indices count UTF-16 code units, so every insert advances the
//! cursor by the inserted text's UTF-16 length.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use paperdigest_report::{TITLE_LABEL, digest_header, paper_block};
use paperdigest_shared::{
    DocsConfig, DocsCredentials, PaperDigestError, PaperRecord, Result, USER_AGENT,
};

/// First writable index of a Docs body.
const BODY_START: usize = 1;

/// Longest slice of an error body kept in a [`SinkError`].
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("document API request failed: {0}")]
    Transport(String),

    #[error("document API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not write export to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// `batchUpdate` requests inserting the digest for `records` at the top of
/// the document. With `styled`, the header is italic and each title bold.
pub fn build_requests(records: &[PaperRecord], date: NaiveDate, styled: bool) -> Vec<Value> {
    let mut inserts = Vec::with_capacity(records.len() + 1);
    let mut styles = Vec::new();
    let mut index = BODY_START;

    let header = digest_header(date);
    inserts.push(insert_text(index, &header));
    if styled {
        let line_len = utf16_len(header.trim_end_matches('\n'));
        styles.push(text_style(index, index + line_len, "italic"));
    }
    index += utf16_len(&header);

    for record in records {
        let block = paper_block(record);
        inserts.push(insert_text(index, &block));
        if styled && !record.title.is_empty() {
            let start = index + utf16_len(TITLE_LABEL);
            styles.push(text_style(start, start + utf16_len(&record.title), "bold"));
        }
        index += utf16_len(&block);
    }

    // Styles refer to final positions, so they follow every insert.
    inserts.extend(styles);
    inserts
}

fn insert_text(index: usize, text: &str) -> Value {
    json!({ "insertText": { "location": { "index": index }, "text": text } })
}

fn text_style(start: usize, end: usize, field: &str) -> Value {
    let mut style = serde_json::Map::new();
    style.insert(field.to_string(), Value::Bool(true));
    json!({
        "updateTextStyle": {
            "range": { "startIndex": start, "endIndex": end },
            "textStyle": style,
            "fields": field,
        }
    })
}

// ---------------------------------------------------------------------------
// DocsSink
// ---------------------------------------------------------------------------

pub struct DocsSink {
    client: reqwest::Client,
    docs_endpoint: String,
    drive_endpoint: String,
    credentials: DocsCredentials,
    styled: bool,
}

impl DocsSink {
    pub fn new(config: &DocsConfig, credentials: DocsCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            docs_endpoint: config.docs_endpoint.trim_end_matches('/').to_string(),
            drive_endpoint: config.drive_endpoint.trim_end_matches('/').to_string(),
            credentials,
            styled: config.styled,
        })
    }

    /// Append the digest for `records` in one batch update.
    #[instrument(skip_all, fields(count = records.len()))]
    pub async fn append(
        &self,
        records: &[PaperRecord],
        date: NaiveDate,
    ) -> std::result::Result<(), SinkError> {
        let requests = build_requests(records, date, self.styled);
        let url = format!(
            "{}/v1/documents/{}:batchUpdate",
            self.docs_endpoint, self.credentials.document_id
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.credentials.token)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.without_url().to_string()))?;

        check_status(response).await?;
        info!(requests = requests.len(), "document updated");
        Ok(())
    }

    /// Export the document as PDF to `path`.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn export_portable(&self, path: &Path) -> std::result::Result<PathBuf, SinkError> {
        let url = format!(
            "{}/drive/v3/files/{}/export",
            self.drive_endpoint, self.credentials.document_id
        );

        let response = self
            .client
            .get(&url)
            .query(&[("mimeType", "application/pdf")])
            .bearer_auth(&self.credentials.token)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.without_url().to_string()))?;

        let response = check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| {
                SinkError::Transport(format!("failed to read export body: {}", e.without_url()))
            })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SinkError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|source| SinkError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        info!(bytes = bytes.len(), "document exported");
        Ok(path.to_path_buf())
    }
}

/// Turn a non-success response into [`SinkError::Status`].
async fn check_status(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(MAX_ERROR_BODY).collect();
    warn!(status = status.as_u16(), "document API rejected the request");
    Err(SinkError::Status {
        status: status.as_u16(),
        message,
    })
}
