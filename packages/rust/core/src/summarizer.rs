//! Paper summarization through the Gemini `generateContent` API.
//!
//! One request per paper: the prompt template is filled with the title and a
//! character-bounded prefix of the full text, and the first candidate's text
//! comes back as the summary. Every failure maps to a [`SummarizeError`] whose
//! [`fallback`](SummarizeError::fallback) text the driver stores instead.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use paperdigest_shared::{GeminiConfig, PaperDigestError, PromptPreset, Result, USER_AGENT};

pub const MISSING_KEY_FALLBACK: &str = "Summary unavailable (API key missing).";
pub const API_ERROR_FALLBACK: &str = "Summary unavailable (API error).";
pub const MALFORMED_FALLBACK: &str = "No summary provided by Gemini.";

// ---------------------------------------------------------------------------
// Prompt templates
// ---------------------------------------------------------------------------

const STRUCTURED_TEMPLATE: &str = "\
**Title**: {title}
**Summary Request**: Summarize the paper focusing on:
- **Novelty**: What's new about this research?
- **Methodology**: Key methods used.
- **Key Findings**: Quantitative results.
- **Limitations**: Constraints & future research.

**Full Text**: {full_text}
";

const RESEARCH_ASSISTANT_TEMPLATE: &str = "\
Act as a research assistant. Analyze the following scientific paper titled \"{title}\" \
and provide a structured summary focusing on these elements:

**1. Core Contribution**
- Identify the primary research question or hypothesis.
- Highlight the novel methodology or approach used.

**2. Key Findings**
- List 3-5 central results with quantitative data.
- Note statistically significant outcomes (p-values, confidence intervals).

**3. Technical Definitions**
- Extract and explain 2-3 domain-specific terms crucial for understanding this paper.

**4. Limitations & Future Work**
- Summarize acknowledged constraints of the study.
- Outline proposed directions for further research.

**5. Practical Implications**
- Describe how these findings could affect practice in the field.

Format as bullet points with bolded section headers.

Full text:
{full_text}
";

const BRIEF_TEMPLATE: &str = "\
You are an AI assistant summarizing research papers. Given the title and full text, provide a structured summary:

- **Novelty**: Describe what is new or unique about this research.
- **Methodology**: Explain the approach and methods used.
- **Data**: Describe the datasets or sources of data used.
- **Conclusion**: Summarize the main findings and contributions.

**Title**: {title}
**Full Text**: {full_text}

Please return the response in a structured format with bullet points.
";

/// Built-in template text for a preset.
pub fn preset_template(preset: PromptPreset) -> &'static str {
    match preset {
        PromptPreset::Structured => STRUCTURED_TEMPLATE,
        PromptPreset::ResearchAssistant => RESEARCH_ASSISTANT_TEMPLATE,
        PromptPreset::Brief => BRIEF_TEMPLATE,
    }
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Fill `{title}` and `{full_text}` in one pass, so placeholder-like text
/// inside the values is left alone.
fn render_template(template: &str, title: &str, full_text: &str) -> String {
    template
        .split("{full_text}")
        .map(|piece| piece.replace("{title}", title))
        .collect::<Vec<_>>()
        .join(full_text)
}

// ---------------------------------------------------------------------------
// SummarizeError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    /// No API key configured; no request was made.
    #[error("Gemini API key is not set")]
    MissingApiKey,

    /// Transport failure or non-success status.
    #[error("Gemini request failed: {0}")]
    Api(String),

    /// The response carried no usable text.
    #[error("Gemini response malformed: {0}")]
    Malformed(String),
}

impl SummarizeError {
    /// Text stored on the record in place of a summary.
    pub fn fallback(&self) -> &'static str {
        match self {
            Self::MissingApiKey => MISSING_KEY_FALLBACK,
            Self::Api(_) => API_ERROR_FALLBACK,
            Self::Malformed(_) => MALFORMED_FALLBACK,
        }
    }
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

pub struct Summarizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_chars: usize,
    template: String,
}

impl Summarizer {
    /// Create a summarizer from the `[gemini]` section.
    ///
    /// `api_key` is passed in already resolved; `None` makes every call
    /// return [`SummarizeError::MissingApiKey`].
    pub fn new(config: &GeminiConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaperDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        let template = match &config.prompt_template {
            Some(custom) if !custom.trim().is_empty() => custom.clone(),
            _ => preset_template(config.prompt).to_string(),
        };
        if !template.contains("{full_text}") {
            warn!("prompt template has no {{full_text}} placeholder; paper text will not be sent");
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            max_chars: config.max_chars,
            template,
        })
    }

    /// Prompt sent for one paper.
    pub fn build_prompt(&self, title: &str, full_text: &str) -> String {
        render_template(&self.template, title, truncate_chars(full_text, self.max_chars))
    }

    /// Summarize one paper.
    #[instrument(skip_all, fields(title = %title, model = %self.model))]
    pub async fn summarize(
        &self,
        title: &str,
        full_text: &str,
    ) -> std::result::Result<String, SummarizeError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(SummarizeError::MissingApiKey);
        };

        let prompt = self.build_prompt(title, full_text);
        let payload = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let url = format!("{}/v1/models/{}:generateContent", self.endpoint, self.model);

        debug!(prompt_chars = prompt.chars().count(), "requesting summary");

        let response = self
            .client
            .post(&url)
            .query(&[("key", key)])
            .json(&payload)
            .send()
            .await
            // The request URL carries the key.
            .map_err(|e| SummarizeError::Api(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Gemini returned an error status");
            return Err(SummarizeError::Api(format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SummarizeError::Api(e.without_url().to_string()))?;

        let summary = parse_summary(&body)?;
        info!(summary_chars = summary.chars().count(), "summary received");
        Ok(summary)
    }
}

/// Pull the first candidate's text out of a `generateContent` response.
fn parse_summary(body: &str) -> std::result::Result<String, SummarizeError> {
    let data: Value = serde_json::from_str(body)
        .map_err(|e| SummarizeError::Malformed(format!("invalid JSON: {e}")))?;

    let candidate = data
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| SummarizeError::Malformed("no candidates".into()))?;

    let text = match candidate.get("content") {
        Some(Value::String(s)) => s.as_str(),
        Some(content) => content
            .get("parts")
            .and_then(Value::as_array)
            .and_then(|parts| parts.first())
            .and_then(|part| part.get("text"))
            .and_then(Value::as_str)
            .ok_or_else(|| SummarizeError::Malformed("first part has no text".into()))?,
        None => return Err(SummarizeError::Malformed("candidate has no content".into())),
    };

    if text.trim().is_empty() {
        return Err(SummarizeError::Malformed("empty text".into()));
    }

    Ok(text.replace("\\n", "\n"))
}
