//! Core pipeline orchestration for PaperDigest.
//!
//! This crate owns the stages that talk to generative and document services
//! (summarizer, destination document sink) and ties them together with the
//! paper source, extractor, report writer and cache into one digest run.

pub mod pipeline;
pub mod sink;
pub mod summarizer;

pub use pipeline::{
    Pipeline, ProgressReporter, RunOutcome, SilentProgress, SinkStatus, Stages, run_pipeline,
};
pub use sink::{DocsSink, SinkError};
pub use summarizer::{SummarizeError, Summarizer};
