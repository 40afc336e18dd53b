//! Shared types, error model, and configuration for PaperDigest.
//!
//! This crate is the foundation depended on by all other PaperDigest crates.
//! It provides:
//! - The unified error type ([`PaperDigestError`])
//! - Domain types ([`PaperRecord`], [`CombineMode`], [`DateFilter`], [`RunId`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading, secret lookup)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DocsConfig, DocsCredentials, ExtractorConfig, GeminiConfig, OutputConfig,
    RunConfig, SearchConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, reference_offset, reference_today, resolve_api_key,
    validate_docs_credentials,
};
pub use error::{PaperDigestError, Result};
pub use types::{
    CombineMode, DateFilter, DateFilterMode, PaperRecord, PromptPreset, ReportFormat, RunId,
};

/// User-Agent string for every outbound request.
pub const USER_AGENT: &str = concat!("PaperDigest/", env!("CARGO_PKG_VERSION"));
