//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use presswork_core::enrich::run_enrich;
use presswork_core::freshness;
use presswork_core::ingest::ingest_jsonl;
use presswork_core::keywords::{KeywordRunOptions, run_keywords};
use presswork_core::paa::run_paa;
use presswork_core::topic::{TopicRequest, TopicStatus, run_topic};
use presswork_core::{ItemOutcome, ProgressReporter, RunContext, RunSummary, write_report};
use presswork_gateway::{GatewaySet, SearchClient};
use presswork_shared::{AppConfig, WorkItemKind, init_config, load_config, load_config_from};
use presswork_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Presswork: news and keyword backlogs in, bilingual documents out.
#[derive(Parser)]
#[command(
    name = "presswork",
    version,
    about = "Generate, validate and publish bilingual (EN/ZH) Markdown documents from work-item backlogs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.presswork/presswork.toml).
    #[arg(long, env = "PRESSWORK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Select, dedup and log the planned actions without writing anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Cap the batch size.
    #[arg(long, global = true)]
    pub limit: Option<usize>,

    /// Override "today" (YYYY-MM-DD) for naming and filtering.
    #[arg(long, global = true)]
    pub date: Option<NaiveDate>,

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
    #[command(flatten)]
    Run(RunCommand),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Commands that work against the store.
#[derive(Subcommand)]
pub(crate) enum RunCommand {
    /// Research a topic and publish it as an EN/ZH blog pair.
    Topic {
        /// Topic to research.
        topic: String,

        /// News item ids the article draws on (repeatable).
        #[arg(long = "news-id")]
        news_ids: Vec<i64>,
    },

    /// Extract keywords from recent news and write a diversified batch.
    Keywords {
        /// Work the existing keyword backlog without a new extraction.
        #[arg(long)]
        skip_extract: bool,
    },

    /// Turn discovered search questions into FAQ pages.
    Paa {
        /// Skip search grounding even when a search key is configured.
        #[arg(long)]
        no_grounding: bool,
    },

    /// Keep published posts current with recent news.
    Freshness {
        #[command(subcommand)]
        action: FreshnessAction,
    },

    /// Fill search demand estimates for backlog keywords.
    Enrich,

    /// Load work items from a JSONL file.
    Ingest {
        /// Work-item kind: news, keyword, paa or freshness.
        kind: WorkItemKind,

        /// JSONL file, one item per line.
        file: PathBuf,
    },

    /// Show backlog counts and items stuck in writing.
    Status,

    /// Put a work item back into its initial status.
    Requeue {
        /// Work-item kind: keyword, paa or freshness.
        kind: WorkItemKind,

        /// Item id.
        id: i64,
    },
}

/// Freshness subcommands.
#[derive(Subcommand)]
pub(crate) enum FreshnessAction {
    /// Match recent news against published posts.
    Detect,
    /// Append update sections for detected matches.
    Update,
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
        0 => "presswork=info",
        1 => "presswork=debug",
        _ => "presswork=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    let opts = RunOptions {
        dry_run: cli.dry_run,
        limit: cli.limit,
        date: cli.date.unwrap_or_else(|| Local::now().date_naive()),
    };
    if opts.limit == Some(0) {
        return Err(eyre!("--limit must be at least 1"));
    }

    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()),
        },
        Command::Run(command) => {
            let config = resolve_config(cli.config.as_deref())?;
            let storage = open_storage(&config, opts.dry_run).await?;
            let result = dispatch(command, &config, &storage, &opts).await;
            storage.close().await;
            result
        }
    }
}

/// Flags shared by every pipeline command.
struct RunOptions {
    dry_run: bool,
    limit: Option<usize>,
    date: NaiveDate,
}

async fn dispatch(
    command: RunCommand,
    config: &AppConfig,
    storage: &Storage,
    opts: &RunOptions,
) -> Result<()> {
    match command {
        RunCommand::Topic { topic, news_ids } => cmd_topic(config, storage, opts, topic, news_ids).await,
        RunCommand::Keywords { skip_extract } => {
            cmd_keywords(config, storage, opts, skip_extract).await
        }
        RunCommand::Paa { no_grounding } => cmd_paa(config, storage, opts, no_grounding).await,
        RunCommand::Freshness { action } => match action {
            FreshnessAction::Detect => cmd_freshness_detect(config, storage, opts).await,
            FreshnessAction::Update => cmd_freshness_update(config, storage, opts).await,
        },
        RunCommand::Enrich => cmd_enrich(config, storage, opts).await,
        RunCommand::Ingest { kind, file } => cmd_ingest(storage, opts, kind, &file).await,
        RunCommand::Status => cmd_status(storage).await,
        RunCommand::Requeue { kind, id } => cmd_requeue(storage, opts, kind, id).await,
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

async fn open_storage(config: &AppConfig, dry_run: bool) -> Result<Storage> {
    let path = &config.paths.database;
    let storage = if dry_run {
        Storage::open_readonly(path).await?
    } else {
        Storage::open(path).await?
    };
    Ok(storage)
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_topic(
    config: &AppConfig,
    storage: &Storage,
    opts: &RunOptions,
    topic: String,
    news_ids: Vec<i64>,
) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(eyre!("topic must not be empty"));
    }
    let gateways = GatewaySet::from_config(config)?;
    let stuck = warn_stuck(storage).await?;
    let mut ctx = RunContext::new(storage, config, &gateways, opts.date, opts.dry_run).await?;

    info!(topic = %topic, dry_run = opts.dry_run, "starting topic pipeline");
    let request = TopicRequest {
        topic,
        source_news_ids: news_ids,
    };
    let progress = CliProgress::new();
    let report = run_topic(&mut ctx, &request, &progress).await?;
    progress.finish();

    println!();
    println!("  Topic:  {}", report.topic);
    println!("  Slug:   {}", report.slug_base);
    println!("  Status: {}", describe_topic_status(&report.status));
    for doc in &report.published {
        println!("  Wrote:  {}", doc.path.display());
    }
    for failure in &report.failures {
        println!("  Failed: {} ({})", failure.stage, failure.error);
    }

    let mut summary = report.summary();
    summary.stuck = stuck;
    finish_run(config, opts, "topic", summary)
}

fn describe_topic_status(status: &TopicStatus) -> String {
    match status {
        TopicStatus::Published => "published".into(),
        TopicStatus::Partial => "partial".into(),
        TopicStatus::Failed(stage) => format!("failed at {stage}"),
        TopicStatus::Duplicate => "duplicate".into(),
        TopicStatus::Planned => "planned (dry run)".into(),
    }
}

async fn cmd_keywords(
    config: &AppConfig,
    storage: &Storage,
    opts: &RunOptions,
    skip_extract: bool,
) -> Result<()> {
    let gateways = GatewaySet::from_config(config)?;
    let stuck = warn_stuck(storage).await?;
    let mut ctx = RunContext::new(storage, config, &gateways, opts.date, opts.dry_run).await?;

    let run_opts = KeywordRunOptions {
        limit: opts.limit,
        skip_extract,
    };
    let progress = CliProgress::new();
    let mut summary = run_keywords(&mut ctx, &run_opts, &progress).await?;
    progress.finish();

    summary.stuck = stuck;
    finish_run(config, opts, "keywords", summary)
}

async fn cmd_paa(
    config: &AppConfig,
    storage: &Storage,
    opts: &RunOptions,
    no_grounding: bool,
) -> Result<()> {
    let gateways = GatewaySet::from_config(config)?;
    let search = if no_grounding {
        None
    } else {
        match SearchClient::from_config(&config.search) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "search unavailable, writing without grounding");
                None
            }
        }
    };
    let stuck = warn_stuck(storage).await?;
    let mut ctx = RunContext::new(storage, config, &gateways, opts.date, opts.dry_run).await?;

    let progress = CliProgress::new();
    let mut summary = run_paa(&mut ctx, search.as_ref(), opts.limit, &progress).await?;
    progress.finish();

    summary.stuck = stuck;
    finish_run(config, opts, "paa", summary)
}

async fn cmd_freshness_detect(config: &AppConfig, storage: &Storage, opts: &RunOptions) -> Result<()> {
    let gateways = GatewaySet::from_config(config)?;
    let ctx = RunContext::new(storage, config, &gateways, opts.date, opts.dry_run).await?;
    let detected = freshness::detect(&ctx).await?;

    println!();
    println!("  Posts scanned: {}", detected.posts);
    println!("  News scanned:  {}", detected.news);
    println!("  Matches:       {}", detected.matches);
    println!("  New signals:   {}", detected.inserted);
    println!();
    Ok(())
}

async fn cmd_freshness_update(config: &AppConfig, storage: &Storage, opts: &RunOptions) -> Result<()> {
    let gateways = GatewaySet::from_config(config)?;
    let stuck = warn_stuck(storage).await?;
    let mut ctx = RunContext::new(storage, config, &gateways, opts.date, opts.dry_run).await?;

    let progress = CliProgress::new();
    let mut summary = freshness::update(&mut ctx, opts.limit, &progress).await?;
    progress.finish();

    summary.stuck = stuck;
    finish_run(config, opts, "freshness", summary)
}

async fn cmd_enrich(config: &AppConfig, storage: &Storage, opts: &RunOptions) -> Result<()> {
    let search = SearchClient::from_config(&config.search)?;
    let limit = opts.limit.unwrap_or(config.selector.default_limit);
    let delay = Duration::from_millis(config.search.dispatch_delay_ms);

    let summary = run_enrich(storage, &search, limit, delay, opts.dry_run).await?;

    println!();
    println!("  Keywords: {}", summary.candidates);
    println!("  Updated:  {}", summary.updated);
    println!("  Failed:   {}", summary.failed);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Store commands
// ---------------------------------------------------------------------------

async fn cmd_ingest(storage: &Storage, opts: &RunOptions, kind: WorkItemKind, file: &Path) -> Result<()> {
    let summary = ingest_jsonl(storage, kind, file, opts.dry_run).await?;

    println!();
    println!("  Lines read: {}", summary.read);
    println!("  Inserted:   {}", summary.inserted);
    println!("  Existing:   {}", summary.existing);
    println!("  Invalid:    {}", summary.invalid);
    println!();
    Ok(())
}

async fn cmd_status(storage: &Storage) -> Result<()> {
    println!();
    for kind in [
        WorkItemKind::News,
        WorkItemKind::Keyword,
        WorkItemKind::Paa,
        WorkItemKind::Freshness,
    ] {
        let counts = storage.status_counts(kind).await?;
        let line = if counts.is_empty() {
            "empty".to_string()
        } else {
            counts
                .iter()
                .map(|(status, n)| format!("{status} {n}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!("  {:<10} {line}", kind.to_string());
    }

    let stuck = storage.stuck_writing().await?;
    if !stuck.is_empty() {
        println!();
        println!("  Stuck in writing:");
        for item in &stuck {
            println!("    {} {} (since {})", item.item, item.label, item.since);
        }
    }
    println!();
    Ok(())
}

async fn cmd_requeue(storage: &Storage, opts: &RunOptions, kind: WorkItemKind, id: i64) -> Result<()> {
    if opts.dry_run {
        info!(dry_run = true, %kind, id, "would requeue work item");
        return Ok(());
    }
    let previous = storage.requeue(kind, id).await?;
    let initial = kind
        .initial_status()
        .ok_or_else(|| eyre!("{kind} items have no lifecycle"))?;
    println!("{kind} #{id}: {previous} -> {initial}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

/// Log items a previous run left in `writing`.
async fn warn_stuck(storage: &Storage) -> Result<Vec<presswork_storage::StuckItem>> {
    let stuck = storage.stuck_writing().await?;
    for item in &stuck {
        warn!(
            item = %item.item,
            label = %item.label,
            since = %item.since,
            "item stuck in writing; reset with `presswork requeue`"
        );
    }
    Ok(stuck)
}

/// Print the summary and, outside dry-run, write the Markdown report.
fn finish_run(config: &AppConfig, opts: &RunOptions, pipeline: &str, summary: RunSummary) -> Result<()> {
    println!();
    println!("  {pipeline}: {}", summary.headline());
    if !summary.stuck.is_empty() {
        println!("  {} item(s) stuck in writing, see `presswork status`", summary.stuck.len());
    }

    if !opts.dry_run {
        match write_report(&config.paths.output_dir, pipeline, opts.date, &summary) {
            Ok(path) => println!("  Report: {}", path.display()),
            Err(e) => warn!(error = %e, "failed to write run report"),
        }
    }
    println!();
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_started(&self, label: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("[{current}/{total}] {label}"));
    }

    fn item_finished(&self, label: &str, outcome: &ItemOutcome) {
        self.spinner.println(format!("  {label}: {outcome}"));
    }
}
