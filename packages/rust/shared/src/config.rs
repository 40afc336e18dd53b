//! Application configuration for PaperDigest.
//!
//! User config lives at `~/.paperdigest/paperdigest.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: it only names the env vars holding them.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PaperDigestError, Result};
use crate::types::{CombineMode, DateFilter, DateFilterMode, PromptPreset, ReportFormat};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "paperdigest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".paperdigest";

// ---------------------------------------------------------------------------
// Config structs (matching paperdigest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Paper search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Generative-text summarizer settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Document download/extraction settings.
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Shared destination document settings.
    #[serde(default)]
    pub docs: DocsConfig,

    /// Local output files.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Keywords, each searched as an exact phrase.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Maximum number of results requested from the index.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// How keywords are combined: "any" (OR) or "all" (AND).
    #[serde(default)]
    pub combine: CombineMode,

    /// "latest" keeps the newest `limit` results; "today" keeps only
    /// results published today in the reference timezone.
    #[serde(default)]
    pub date_filter: DateFilterMode,

    /// Reference timezone for the "today" filter, as a UTC offset in hours.
    #[serde(default)]
    pub utc_offset_hours: i32,

    /// Results requested per page from the index.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Search API endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            limit: default_limit(),
            combine: CombineMode::default(),
            date_filter: DateFilterMode::default(),
            utc_offset_hours: 0,
            page_size: default_page_size(),
            endpoint: default_search_endpoint(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    vec![
        "floods".into(),
        "droughts".into(),
        "climate extremes".into(),
        "disaster resilience".into(),
    ]
}
fn default_limit() -> u32 {
    3
}
fn default_page_size() -> u32 {
    100
}
fn default_search_endpoint() -> String {
    "https://export.arxiv.org/api/query".into()
}
fn default_search_timeout() -> u64 {
    30
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for `generateContent`.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,

    /// Characters of full text embedded in the prompt.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Built-in prompt template.
    #[serde(default)]
    pub prompt: PromptPreset,

    /// Custom template with `{title}` and `{full_text}` placeholders.
    /// Takes precedence over `prompt` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            endpoint: default_gemini_endpoint(),
            max_chars: default_max_chars(),
            prompt: PromptPreset::default(),
            prompt_template: None,
            timeout_secs: default_gemini_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-1.5-pro-002".into()
}
fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_max_chars() -> usize {
    8000
}
fn default_gemini_timeout() -> u64 {
    120
}

/// `[extractor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Download timeout in seconds.
    #[serde(default = "default_extractor_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_extractor_timeout(),
        }
    }
}

fn default_extractor_timeout() -> u64 {
    60
}

/// `[docs]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    /// Append summaries to the shared Google Doc.
    #[serde(default)]
    pub enabled: bool,

    /// Destination document id. Falls back to `document_id_env` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,

    /// Env var consulted for the document id when `document_id` is unset.
    #[serde(default = "default_document_id_env")]
    pub document_id_env: String,

    /// Env var holding an OAuth bearer token for the Docs/Drive APIs.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Docs API base URL.
    #[serde(default = "default_docs_endpoint")]
    pub docs_endpoint: String,

    /// Drive API base URL (used for PDF export).
    #[serde(default = "default_drive_endpoint")]
    pub drive_endpoint: String,

    /// Export the document to PDF after appending.
    #[serde(default = "default_true")]
    pub export_pdf: bool,

    /// Where the exported PDF is written.
    #[serde(default = "default_export_path")]
    pub export_path: String,

    /// Italic run header and bold titles.
    #[serde(default)]
    pub styled: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_docs_timeout")]
    pub timeout_secs: u64,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            document_id: None,
            document_id_env: default_document_id_env(),
            token_env: default_token_env(),
            docs_endpoint: default_docs_endpoint(),
            drive_endpoint: default_drive_endpoint(),
            export_pdf: true,
            export_path: default_export_path(),
            styled: false,
            timeout_secs: default_docs_timeout(),
        }
    }
}

fn default_document_id_env() -> String {
    "DOCUMENT_ID".into()
}
fn default_token_env() -> String {
    "GOOGLE_DOCS_TOKEN".into()
}
fn default_docs_endpoint() -> String {
    "https://docs.googleapis.com".into()
}
fn default_drive_endpoint() -> String {
    "https://www.googleapis.com".into()
}
fn default_true() -> bool {
    true
}
fn default_export_path() -> String {
    "research_summary.pdf".into()
}
fn default_docs_timeout() -> u64 {
    60
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Local report file rewritten on every run with new items.
    #[serde(default = "default_report_path")]
    pub report_path: String,

    /// Report layout: "text" or "markdown".
    #[serde(default)]
    pub report_format: ReportFormat,

    /// Processed-id cache file.
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: default_report_path(),
            report_format: ReportFormat::default(),
            cache_path: default_cache_path(),
        }
    }
}

fn default_report_path() -> String {
    "output.txt".into()
}
fn default_cache_path() -> String {
    "summarized_papers.json".into()
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Search keywords.
    pub keywords: Vec<String>,
    /// Result cap.
    pub limit: u32,
    /// Keyword combination mode.
    pub combine: CombineMode,
    /// Resolved date filter.
    pub date_filter: DateFilter,
    /// Append to the shared document.
    pub docs_enabled: bool,
    /// Export the shared document after appending.
    pub export_pdf: bool,
    /// Exported PDF destination.
    pub export_path: PathBuf,
    /// Local report file.
    pub report_path: PathBuf,
    /// Local report layout.
    pub report_format: ReportFormat,
    /// Processed-id cache file.
    pub cache_path: PathBuf,
    /// Search and filter only; write nothing.
    pub dry_run: bool,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        let date_filter = match config.search.date_filter {
            DateFilterMode::Latest => DateFilter::Latest,
            DateFilterMode::Today => {
                DateFilter::PublishedOn(reference_today(config.search.utc_offset_hours))
            }
        };

        Self {
            keywords: config.search.keywords.clone(),
            limit: config.search.limit,
            combine: config.search.combine,
            date_filter,
            docs_enabled: config.docs.enabled,
            export_pdf: config.docs.export_pdf,
            export_path: PathBuf::from(&config.docs.export_path),
            report_path: PathBuf::from(&config.output.report_path),
            report_format: config.output.report_format,
            cache_path: PathBuf::from(&config.output.cache_path),
            dry_run: false,
        }
    }
}

/// The fixed reference timezone for date filtering.
///
/// Offsets outside ±23 hours fall back to UTC.
pub fn reference_offset(utc_offset_hours: i32) -> FixedOffset {
    utc_offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

/// Today's date in the reference timezone.
pub fn reference_today(utc_offset_hours: i32) -> NaiveDate {
    Utc::now()
        .with_timezone(&reference_offset(utc_offset_hours))
        .date_naive()
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Credentials for the destination document API.
#[derive(Clone)]
pub struct DocsCredentials {
    /// Destination document id.
    pub document_id: String,
    /// OAuth bearer token.
    pub token: String,
}

impl fmt::Debug for DocsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocsCredentials")
            .field("document_id", &"<redacted>")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Read the summarizer API key from the env var named in config.
///
/// Returns `None` when unset or empty; the summarizer degrades instead of failing.
pub fn resolve_api_key(config: &GeminiConfig) -> Option<String> {
    read_env(&config.api_key_env)
}

/// Check that the document id and bearer token are available.
pub fn validate_docs_credentials(config: &DocsConfig) -> Result<DocsCredentials> {
    let document_id = config
        .document_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .or_else(|| read_env(&config.document_id_env))
        .ok_or_else(|| {
            PaperDigestError::config(format!(
                "destination document id not found. Set docs.document_id or the {} environment variable.",
                config.document_id_env
            ))
        })?;

    let token = read_env(&config.token_env).ok_or_else(|| {
        PaperDigestError::config(format!(
            "document API token not found. Set the {} environment variable.",
            config.token_env
        ))
    })?;

    Ok(DocsCredentials { document_id, token })
}

fn read_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.paperdigest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PaperDigestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.paperdigest/paperdigest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PaperDigestError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PaperDigestError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write a default config file at `path` (or the default location).
/// Returns the path to the created file.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| PaperDigestError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PaperDigestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PaperDigestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
