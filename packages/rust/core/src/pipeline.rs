//! End-to-end digest run: cache → search → filter → extract → summarize →
//! document sink → local report → cache.
//!
//! Stages return their own error types; this module alone decides what is
//! fatal. A search failure aborts the run before anything is written. Failed
//! extraction or summarization becomes sentinel text on the record, and a sink
//! failure is logged and recorded in the outcome while the report and the
//! cache are still written.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{error, info, instrument, warn};

use paperdigest_extractor::DocumentExtractor;
use paperdigest_shared::{
    AppConfig, PaperRecord, Result, RunConfig, RunId, reference_today, resolve_api_key,
    validate_docs_credentials,
};
use paperdigest_source::{PaperSource, filter_by_date};
use paperdigest_storage::ResultCache;

use crate::sink::DocsSink;
use crate::summarizer::Summarizer;

// ---------------------------------------------------------------------------
// Outcome & progress
// ---------------------------------------------------------------------------

/// What happened to the destination document during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkStatus {
    /// No document sink configured for this run.
    Disabled,
    /// Nothing new to append.
    Skipped,
    /// The digest was appended.
    Appended,
    /// The append failed; the message is for the operator.
    Failed(String),
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// Results returned by the search, after the date filter.
    pub found: usize,
    /// Records processed in this run (or that would be, for a dry run).
    pub records: Vec<PaperRecord>,
    pub sink: SinkStatus,
    /// Exported PDF, when export was requested and succeeded.
    pub export_path: Option<PathBuf>,
    /// Local report, when one was written.
    pub report_path: Option<PathBuf>,
    pub dry_run: bool,
    pub elapsed: Duration,
}

impl RunOutcome {
    /// Number of items processed (or pending, for a dry run).
    pub fn new_count(&self) -> usize {
        self.records.len()
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a paper is extracted and summarized.
    fn paper_started(&self, title: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn paper_started(&self, _title: &str, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The stage implementations a run drives.
pub struct Stages {
    pub source: PaperSource,
    pub extractor: DocumentExtractor,
    pub summarizer: Summarizer,
    /// `None` when the destination document is disabled.
    pub sink: Option<DocsSink>,
}

impl Stages {
    /// Build every stage from the loaded config.
    ///
    /// Fails when the document sink is enabled but its id or token is missing.
    pub fn from_config(config: &AppConfig, run: &RunConfig) -> Result<Self> {
        let api_key = resolve_api_key(&config.gemini);
        if api_key.is_none() {
            warn!(
                env = %config.gemini.api_key_env,
                "summarizer API key not set; summaries will be placeholders"
            );
        }

        let sink = if run.docs_enabled && !run.dry_run {
            let credentials = validate_docs_credentials(&config.docs)?;
            Some(DocsSink::new(&config.docs, credentials)?)
        } else {
            None
        };

        Ok(Self {
            source: PaperSource::new(&config.search)?,
            extractor: DocumentExtractor::new(&config.extractor)?,
            summarizer: Summarizer::new(&config.gemini, api_key)?,
            sink,
        })
    }
}

pub struct Pipeline {
    run: RunConfig,
    stages: Stages,
    cache: ResultCache,
    digest_date: NaiveDate,
}

impl Pipeline {
    /// `digest_date` heads the appended digest and the report.
    pub fn new(run: RunConfig, stages: Stages, digest_date: NaiveDate) -> Self {
        let cache = ResultCache::new(&run.cache_path);
        Self {
            run,
            stages,
            cache,
            digest_date,
        }
    }

    /// Build a pipeline from the loaded config, dated today in the reference timezone.
    pub fn from_config(config: &AppConfig, run: RunConfig) -> Result<Self> {
        let stages = Stages::from_config(config, &run)?;
        let today = reference_today(config.search.utc_offset_hours);
        Ok(Self::new(run, stages, today))
    }

    /// Execute one run.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, limit = self.run.limit, dry_run = self.run.dry_run))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<RunOutcome> {
        let start = Instant::now();
        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(&run_id));

        info!(%run_id, keywords = self.run.keywords.len(), "starting digest run");

        // --- Phase 1: Cache ---
        progress.phase("Loading processed papers");
        let mut processed = self.cache.load();

        // --- Phase 2: Search ---
        progress.phase("Searching for papers");
        let found = self
            .stages
            .source
            .search(&self.run.keywords, self.run.limit, self.run.combine)
            .await?;
        let found = filter_by_date(found, self.run.date_filter);
        let found_count = found.len();

        let mut fresh: Vec<PaperRecord> = found
            .into_iter()
            .filter(|r| !processed.contains(&r.id))
            .collect();

        info!(
            found = found_count,
            new = fresh.len(),
            known = processed.len(),
            "search results filtered"
        );

        let mut outcome = RunOutcome {
            run_id,
            found: found_count,
            records: Vec::new(),
            sink: if self.stages.sink.is_some() {
                SinkStatus::Skipped
            } else {
                SinkStatus::Disabled
            },
            export_path: None,
            report_path: None,
            dry_run: self.run.dry_run,
            elapsed: Duration::ZERO,
        };

        if self.run.dry_run || fresh.is_empty() {
            if fresh.is_empty() {
                info!("no new papers to summarize");
            }
            outcome.records = fresh;
            return Ok(self.finish(outcome, start, progress));
        }

        // --- Phase 3: Extract & summarize ---
        progress.phase("Summarizing papers");
        let total = fresh.len();
        for (i, record) in fresh.iter_mut().enumerate() {
            progress.paper_started(&record.title, i + 1, total);
            self.process(record).await;
            processed.insert(record.id.clone());
        }

        // --- Phase 4: Destination document ---
        if let Some(sink) = &self.stages.sink {
            progress.phase("Updating destination document");
            outcome.sink = match sink.append(&fresh, self.digest_date).await {
                Ok(()) => SinkStatus::Appended,
                Err(e) => {
                    error!(error = %e, "destination document update failed");
                    SinkStatus::Failed(e.to_string())
                }
            };

            if self.run.export_pdf {
                progress.phase("Exporting document");
                outcome.export_path = match sink.export_portable(&self.run.export_path).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        error!(error = %e, "document export failed");
                        None
                    }
                };
            }
        }

        // --- Phase 5: Local report ---
        progress.phase("Writing report");
        match paperdigest_report::write_report(
            &self.run.report_path,
            self.run.report_format,
            &fresh,
            self.digest_date,
        ) {
            Ok(()) => outcome.report_path = Some(self.run.report_path.clone()),
            Err(e) => error!(error = %e, "report could not be written"),
        }

        // --- Phase 6: Cache ---
        progress.phase("Saving processed papers");
        self.cache.save(&processed)?;

        outcome.records = fresh;
        Ok(self.finish(outcome, start, progress))
    }

    /// Fill in full text and summary, degrading each to its sentinel.
    async fn process(&self, record: &mut PaperRecord) {
        let full_text = match self.stages.extractor.extract_text(&record.document_link).await {
            Ok(text) => text,
            Err(e) => {
                warn!(id = %record.id, error = %e, "full text unavailable, using sentinel");
                e.sentinel()
            }
        };

        let summary = match self.stages.summarizer.summarize(&record.title, &full_text).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(id = %record.id, error = %e, "summary unavailable, using fallback");
                e.fallback().to_string()
            }
        };

        record.full_text = Some(full_text);
        record.summary = Some(summary);
    }

    fn finish(
        &self,
        mut outcome: RunOutcome,
        start: Instant,
        progress: &dyn ProgressReporter,
    ) -> RunOutcome {
        outcome.elapsed = start.elapsed();
        progress.done(&outcome);

        info!(
            run_id = %outcome.run_id,
            found = outcome.found,
            new = outcome.new_count(),
            sink = ?outcome.sink,
            elapsed_ms = outcome.elapsed.as_millis(),
            "digest run complete"
        );
        outcome
    }
}

/// Build the pipeline from config and execute one run.
pub async fn run_pipeline(
    config: &AppConfig,
    run: RunConfig,
    progress: &dyn ProgressReporter,
) -> Result<RunOutcome> {
    Pipeline::from_config(config, run)?.run(progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperdigest_shared::{
        CombineMode, DateFilter, DocsConfig, DocsCredentials, ExtractorConfig, GeminiConfig,
        PaperDigestError, ReportFormat, SearchConfig,
    };
    use paperdigest_storage::ProcessedIdSet;
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1/models/gemini-1.5-pro-002:generateContent";
    const BATCH_PATH: &str = "/v1/documents/doc-1:batchUpdate";

    struct Harness {
        server: MockServer,
        dir: tempfile::TempDir,
    }

    impl Harness {
        async fn start() -> Self {
            Self {
                server: MockServer::start().await,
                dir: tempfile::tempdir().expect("tempdir"),
            }
        }

        fn link(&self, name: &str) -> String {
            format!("{}/pdf/{name}", self.server.uri())
        }

        fn cache(&self) -> ResultCache {
            ResultCache::new(self.dir.path().join("summarized_papers.json"))
        }

        fn report_path(&self) -> PathBuf {
            self.dir.path().join("output.txt")
        }

        /// Serve a search feed with one entry per `(name, published)` pair.
        async fn mount_feed(&self, entries: &[(&str, &str)]) {
            let mut xml =
                String::from(r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom">"#);
            for (name, published) in entries {
                xml.push_str(&format!(
                    "<entry><id>http://arxiv.org/abs/{name}</id><published>{published}</published>\
                     <title>Paper {name}</title><summary>Abstract {name}</summary>\
                     <author><name>Author {name}</name></author>\
                     <link title=\"pdf\" href=\"{link}\" type=\"application/pdf\"/></entry>",
                    link = self.link(name)
                ));
            }
            xml.push_str("</feed>");

            Mock::given(method("GET"))
                .and(path("/api/query"))
                .respond_with(ResponseTemplate::new(200).set_body_string(xml))
                .mount(&self.server)
                .await;
        }

        async fn mount_documents_missing(&self) {
            Mock::given(method("GET"))
                .and(path_regex("^/pdf/"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&self.server)
                .await;
        }

        async fn mount_gemini(&self, response: ResponseTemplate, expected: u64) {
            Mock::given(method("POST"))
                .and(path(GENERATE_PATH))
                .respond_with(response)
                .expect(expected)
                .mount(&self.server)
                .await;
        }

        async fn mount_docs(&self, status: u16) {
            Mock::given(method("POST"))
                .and(path(BATCH_PATH))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({})))
                .mount(&self.server)
                .await;
        }

        fn run_config(&self, docs: bool) -> RunConfig {
            RunConfig {
                keywords: vec!["floods".into(), "droughts".into()],
                limit: 2,
                combine: CombineMode::Any,
                date_filter: DateFilter::Latest,
                docs_enabled: docs,
                export_pdf: false,
                export_path: self.dir.path().join("research_summary.pdf"),
                report_path: self.report_path(),
                report_format: ReportFormat::Text,
                cache_path: self.cache().path().to_path_buf(),
                dry_run: false,
            }
        }

        fn pipeline(&self, run: RunConfig) -> Pipeline {
            let uri = self.server.uri();
            let search = SearchConfig {
                endpoint: format!("{uri}/api/query"),
                ..Default::default()
            };
            let gemini = GeminiConfig {
                endpoint: uri.clone(),
                ..Default::default()
            };
            let sink = run.docs_enabled.then(|| {
                let docs = DocsConfig {
                    enabled: true,
                    docs_endpoint: uri.clone(),
                    drive_endpoint: uri.clone(),
                    ..Default::default()
                };
                let credentials = DocsCredentials {
                    document_id: "doc-1".into(),
                    token: "tok".into(),
                };
                DocsSink::new(&docs, credentials).expect("sink")
            });

            let stages = Stages {
                source: PaperSource::new(&search).expect("source"),
                extractor: DocumentExtractor::new(&ExtractorConfig::default()).expect("extractor"),
                summarizer: Summarizer::new(&gemini, Some("test-key".into())).expect("summarizer"),
                sink,
            };
            Pipeline::new(run, stages, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap())
        }

        async fn batch_bodies(&self) -> Vec<Value> {
            self.server
                .received_requests()
                .await
                .expect("recording enabled")
                .into_iter()
                .filter(|r| r.url.path() == BATCH_PATH)
                .map(|r| serde_json::from_slice(&r.body).expect("json body"))
                .collect()
        }
    }

    fn gemini_ok(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }))
    }

    #[tokio::test]
    async fn only_unseen_papers_are_processed() {
        let h = Harness::start().await;
        h.mount_feed(&[("A", "2025-03-03T10:00:00Z"), ("B", "2025-03-03T09:00:00Z")])
            .await;
        h.mount_documents_missing().await;
        h.mount_gemini(gemini_ok("Summary of B"), 1).await;
        h.mount_docs(200).await;

        let seeded: ProcessedIdSet = [h.link("A")].into_iter().collect();
        h.cache().save(&seeded).unwrap();

        let outcome = h.pipeline(h.run_config(true)).run(&SilentProgress).await.expect("run");

        assert_eq!(outcome.found, 2);
        assert_eq!(outcome.new_count(), 1);
        let b = &outcome.records[0];
        assert_eq!(b.id, h.link("B"));
        assert_eq!(b.full_text.as_deref(), Some("Full text unavailable."));
        assert_eq!(b.summary.as_deref(), Some("Summary of B"));
        assert_eq!(outcome.sink, SinkStatus::Appended);

        let expected: ProcessedIdSet = [h.link("A"), h.link("B")].into_iter().collect();
        assert_eq!(h.cache().load(), expected);

        let bodies = h.batch_bodies().await;
        assert_eq!(bodies.len(), 1);
        let text = bodies[0].to_string();
        assert!(text.contains("TITLE: Paper B"));
        assert!(!text.contains("TITLE: Paper A"));
    }

    #[tokio::test]
    async fn summarizer_error_still_appends_block() {
        let h = Harness::start().await;
        h.mount_feed(&[("A", "2025-03-03T10:00:00Z"), ("B", "2025-03-03T09:00:00Z")])
            .await;
        h.mount_documents_missing().await;
        h.mount_gemini(ResponseTemplate::new(500), 1).await;
        h.mount_docs(200).await;
        h.cache().save(&[h.link("A")].into_iter().collect()).unwrap();

        let outcome = h.pipeline(h.run_config(true)).run(&SilentProgress).await.expect("run");

        assert_eq!(
            outcome.records[0].summary.as_deref(),
            Some("Summary unavailable (API error).")
        );
        let bodies = h.batch_bodies().await;
        assert_eq!(bodies.len(), 1);
        assert!(bodies[0].to_string().contains("Summary unavailable (API error)."));
    }

    #[tokio::test]
    async fn second_run_processes_nothing() {
        let h = Harness::start().await;
        h.mount_feed(&[("A", "2025-03-03T10:00:00Z"), ("B", "2025-03-03T09:00:00Z")])
            .await;
        h.mount_documents_missing().await;
        h.mount_gemini(gemini_ok("ok"), 2).await;
        h.mount_docs(200).await;

        let pipeline = h.pipeline(h.run_config(true));
        let first = pipeline.run(&SilentProgress).await.expect("first run");
        assert_eq!(first.new_count(), 2);

        let report_after_first = std::fs::read_to_string(h.report_path()).unwrap();
        let second = pipeline.run(&SilentProgress).await.expect("second run");
        assert_eq!(second.new_count(), 0);
        assert_eq!(second.sink, SinkStatus::Skipped);
        assert!(second.report_path.is_none());

        assert_eq!(h.batch_bodies().await.len(), 1);
        assert_eq!(
            std::fs::read_to_string(h.report_path()).unwrap(),
            report_after_first
        );
    }

    #[tokio::test]
    async fn sink_failure_keeps_report_and_cache() {
        let h = Harness::start().await;
        h.mount_feed(&[("A", "2025-03-03T10:00:00Z")]).await;
        h.mount_documents_missing().await;
        h.mount_gemini(gemini_ok("ok"), 1).await;
        h.mount_docs(503).await;

        let outcome = h.pipeline(h.run_config(true)).run(&SilentProgress).await.expect("run");

        assert!(matches!(outcome.sink, SinkStatus::Failed(_)));
        assert_eq!(outcome.report_path.as_deref(), Some(h.report_path().as_path()));
        let report = std::fs::read_to_string(h.report_path()).unwrap();
        assert!(report.contains("TITLE: Paper A"));
        assert!(h.cache().load().contains(&h.link("A")));
    }

    #[tokio::test]
    async fn failed_export_yields_no_path() {
        let h = Harness::start().await;
        h.mount_feed(&[("A", "2025-03-03T10:00:00Z")]).await;
        h.mount_documents_missing().await;
        h.mount_gemini(gemini_ok("ok"), 1).await;
        h.mount_docs(200).await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/doc-1/export"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&h.server)
            .await;

        let mut run = h.run_config(true);
        run.export_pdf = true;
        let outcome = h.pipeline(run).run(&SilentProgress).await.expect("run");

        assert_eq!(outcome.sink, SinkStatus::Appended);
        assert!(outcome.export_path.is_none());
        assert!(h.cache().load().contains(&h.link("A")));
    }

    #[tokio::test]
    async fn search_failure_is_fatal_and_leaves_cache() {
        let h = Harness::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&h.server)
            .await;
        h.cache().save(&["http://x/pdf/old"].into_iter().collect()).unwrap();

        let err = h
            .pipeline(h.run_config(false))
            .run(&SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, PaperDigestError::SourceUnavailable(_)));
        let cache = h.cache().load();
        assert_eq!(cache.len(), 1);
        assert!(!h.report_path().exists());
    }

    #[tokio::test]
    async fn missing_document_credentials_abort_before_search() {
        let h = Harness::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&h.server)
            .await;
        h.cache().save(&["http://x/pdf/old"].into_iter().collect()).unwrap();

        let mut config = AppConfig::default();
        config.search.endpoint = format!("{}/api/query", h.server.uri());
        config.docs = DocsConfig {
            enabled: true,
            document_id: None,
            document_id_env: "PD_TEST_UNSET_DOCUMENT_ID_41807".into(),
            token_env: "PD_TEST_UNSET_DOCS_TOKEN_41807".into(),
            ..Default::default()
        };

        let err = run_pipeline(&config, h.run_config(true), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, PaperDigestError::Config { .. }));
        let cache = h.cache().load();
        assert_eq!(cache.len(), 1);
        assert!(!h.report_path().exists());
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let h = Harness::start().await;
        h.mount_feed(&[("A", "2025-03-03T10:00:00Z"), ("B", "2025-03-03T09:00:00Z")])
            .await;
        h.mount_gemini(gemini_ok("ok"), 0).await;

        let mut run = h.run_config(false);
        run.dry_run = true;
        let outcome = h.pipeline(run).run(&SilentProgress).await.expect("run");

        assert!(outcome.dry_run);
        assert_eq!(outcome.new_count(), 2);
        assert!(outcome.records.iter().all(|r| r.summary.is_none()));
        assert!(!h.cache().path().exists());
        assert!(!h.report_path().exists());
    }

    #[tokio::test]
    async fn date_filter_keeps_matching_day() {
        let h = Harness::start().await;
        h.mount_feed(&[("A", "2025-03-03T10:00:00Z"), ("B", "2025-03-02T09:00:00Z")])
            .await;
        h.mount_documents_missing().await;
        h.mount_gemini(gemini_ok("ok"), 1).await;

        let mut run = h.run_config(false);
        run.date_filter = DateFilter::PublishedOn(NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        let outcome = h.pipeline(run).run(&SilentProgress).await.expect("run");

        assert_eq!(outcome.found, 1);
        assert_eq!(outcome.records[0].id, h.link("A"));
        assert_eq!(outcome.sink, SinkStatus::Disabled);
    }

    #[tokio::test]
    async fn markdown_report_is_selectable() {
        let h = Harness::start().await;
        h.mount_feed(&[("A", "2025-03-03T10:00:00Z")]).await;
        h.mount_documents_missing().await;
        h.mount_gemini(gemini_ok("ok"), 1).await;

        let mut run = h.run_config(false);
        run.report_format = ReportFormat::Markdown;
        h.pipeline(run).run(&SilentProgress).await.expect("run");

        let report = std::fs::read_to_string(h.report_path()).unwrap();
        assert!(report.starts_with("# Research Paper Summaries (2025-03-03)"));
        assert!(report.contains("## Paper A"));
    }
}
