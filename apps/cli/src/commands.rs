//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use paperdigest_core::{ProgressReporter, RunOutcome, SinkStatus, run_pipeline};
use paperdigest_shared::{
    AppConfig, CombineMode, DateFilter, ReportFormat, RunConfig, init_config, load_config,
    load_config_from, reference_today,
};
use paperdigest_storage::ResultCache;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// PaperDigest: summarize the newest research papers for a keyword set.
#[derive(Parser)]
#[command(
    name = "paperdigest",
    version,
    about = "Search new research papers, summarize them with Gemini, and publish a dated digest.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.paperdigest/paperdigest.toml).
    #[arg(long, global = true, env = "PAPERDIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Search, summarize and publish papers not seen by earlier runs.
    Run(RunArgs),

    /// Inspect or reset the processed-paper cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Per-run overrides of the config file.
#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Search keyword (repeatable). Replaces the configured keyword set.
    #[arg(short, long = "keyword", value_name = "KEYWORD")]
    pub keywords: Vec<String>,

    /// Maximum number of search results.
    #[arg(short = 'n', long)]
    pub limit: Option<u32>,

    /// Keyword combination: any (OR) or all (AND).
    #[arg(long)]
    pub combine: Option<CombineMode>,

    /// Keep only papers published today in the reference timezone.
    #[arg(long)]
    pub today_only: bool,

    /// Append to the destination document even if disabled in config.
    #[arg(long, conflicts_with = "no_docs")]
    pub docs: bool,

    /// Skip the destination document.
    #[arg(long)]
    pub no_docs: bool,

    /// Skip the PDF export of the destination document.
    #[arg(long)]
    pub no_export: bool,

    /// Local report file.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Local report layout: text or markdown.
    #[arg(long)]
    pub format: Option<ReportFormat>,

    /// Search and list new papers without processing or writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// List processed paper ids.
    Show,
    /// Forget every processed paper.
    Clear,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "paperdigest=info",
        1 => "paperdigest=debug",
        _ => "paperdigest=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => cmd_run(config_path, args).await,
        Command::Cache { action } => match action {
            CacheAction::Show => cmd_cache_show(config_path),
            CacheAction::Clear => cmd_cache_clear(config_path),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Merge CLI flags over the config file.
fn resolve_run_config(config: &AppConfig, args: RunArgs) -> RunConfig {
    let mut run = RunConfig::from(config);

    if !args.keywords.is_empty() {
        run.keywords = args.keywords;
    }
    if let Some(limit) = args.limit {
        run.limit = limit;
    }
    if let Some(combine) = args.combine {
        run.combine = combine;
    }
    if args.today_only {
        run.date_filter =
            DateFilter::PublishedOn(reference_today(config.search.utc_offset_hours));
    }
    if args.docs {
        run.docs_enabled = true;
    }
    if args.no_docs {
        run.docs_enabled = false;
    }
    if args.no_export {
        run.export_pdf = false;
    }
    if let Some(report) = args.report {
        run.report_path = report;
    }
    if let Some(format) = args.format {
        run.report_format = format;
    }
    run.dry_run = args.dry_run;
    run
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let config = load(config_path)?;
    let run = resolve_run_config(&config, args);

    if run.limit == 0 {
        return Err(eyre!("--limit must be a positive integer"));
    }

    info!(
        keywords = run.keywords.len(),
        limit = run.limit,
        combine = %run.combine,
        docs = run.docs_enabled,
        dry_run = run.dry_run,
        "starting run"
    );

    let reporter = CliProgress::new();
    let outcome = run_pipeline(&config, run, &reporter).await?;

    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    println!();
    if outcome.records.is_empty() {
        println!("  No new papers to summarize ({} found).", outcome.found);
        println!();
        return;
    }

    if outcome.dry_run {
        println!("  Dry run: {} new paper(s) would be processed:", outcome.new_count());
        for record in &outcome.records {
            println!("  - {} ({})", record.title, record.published_date);
            println!("    {}", record.document_link);
        }
        println!();
        return;
    }

    println!("  Digest complete!");
    println!("  Run:      {}", outcome.run_id);
    println!("  Found:    {}", outcome.found);
    println!("  New:      {}", outcome.new_count());
    let sink = match &outcome.sink {
        SinkStatus::Disabled => "disabled".to_string(),
        SinkStatus::Skipped => "skipped".to_string(),
        SinkStatus::Appended => "appended".to_string(),
        SinkStatus::Failed(reason) => format!("FAILED ({reason})"),
    };
    println!("  Document: {sink}");
    if let Some(path) = &outcome.export_path {
        println!("  PDF:      {}", path.display());
    }
    if let Some(path) = &outcome.report_path {
        println!("  Report:   {}", path.display());
    }
    println!("  Time:     {:.1}s", outcome.elapsed.as_secs_f64());
    println!();
    for record in &outcome.records {
        println!("  - {}", record.title);
    }
    println!();
}

fn cmd_cache_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let cache = ResultCache::new(&config.output.cache_path);
    let ids = cache.load();

    println!("{} processed paper(s) in {}", ids.len(), cache.path().display());
    for id in ids.iter() {
        println!("  {id}");
    }
    Ok(())
}

fn cmd_cache_clear(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let cache = ResultCache::new(&config.output.cache_path);
    cache.clear()?;
    println!("Cache cleared: {}", cache.path().display());
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = init_config(config_path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn paper_started(&self, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Summarizing [{current}/{total}] {title}"));
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("paperdigest").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    fn run_args(cli: Cli) -> RunArgs {
        match cli.command {
            Command::Run(args) => args,
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn flags_override_config() {
        let cli = parse(&[
            "run", "-k", "heatwaves", "--keyword", "wildfires", "-n", "7", "--combine", "all",
            "--format", "markdown", "--report", "digest.md", "--no-export",
        ]);
        let run = resolve_run_config(&AppConfig::default(), run_args(cli));

        assert_eq!(run.keywords, vec!["heatwaves", "wildfires"]);
        assert_eq!(run.limit, 7);
        assert_eq!(run.combine, CombineMode::All);
        assert_eq!(run.report_format, ReportFormat::Markdown);
        assert_eq!(run.report_path, PathBuf::from("digest.md"));
        assert!(!run.export_pdf);
        assert!(!run.dry_run);
    }

    #[test]
    fn no_flags_keep_config_values() {
        let config = AppConfig::default();
        let run = resolve_run_config(&config, run_args(parse(&["run"])));

        assert_eq!(run.keywords, config.search.keywords);
        assert_eq!(run.limit, 3);
        assert_eq!(run.combine, CombineMode::Any);
        assert_eq!(run.date_filter, DateFilter::Latest);
        assert!(!run.docs_enabled);
    }

    #[test]
    fn today_only_sets_date_filter() {
        let run = resolve_run_config(
            &AppConfig::default(),
            run_args(parse(&["run", "--today-only", "--dry-run"])),
        );
        assert!(matches!(run.date_filter, DateFilter::PublishedOn(_)));
        assert!(run.dry_run);
    }

    #[test]
    fn docs_flags_toggle_sink() {
        let on = resolve_run_config(&AppConfig::default(), run_args(parse(&["run", "--docs"])));
        assert!(on.docs_enabled);

        let mut config = AppConfig::default();
        config.docs.enabled = true;
        let off = resolve_run_config(&config, run_args(parse(&["run", "--no-docs"])));
        assert!(!off.docs_enabled);

        assert!(
            Cli::try_parse_from(["paperdigest", "run", "--docs", "--no-docs"]).is_err()
        );
    }

    #[test]
    fn bad_combine_mode_is_rejected() {
        assert!(Cli::try_parse_from(["paperdigest", "run", "--combine", "xor"]).is_err());
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = parse(&["cache", "show", "--config", "/tmp/pd.toml"]);
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/pd.toml")));
    }
}
