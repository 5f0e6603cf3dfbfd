//! CLI command definitions, routing, and tracing setup.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use scrapedesk_core::{JobOutcome, ProgressReporter, ScrapeOrchestrator};
use scrapedesk_export::{
    DETAILS_FILE_NAME, URLS_FILE_NAME, export_details, export_urls, write_export,
};
use scrapedesk_ingest::{NormalizeOptions, RawInput, ingest_file, normalize_input};
use scrapedesk_remote::{ClientOptions, RemoteClient};
use scrapedesk_shared::{
    AppConfig, JobPhase, PhaseKind, UrlSet, init_config, load_config,
};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ScrapeDesk — discover product URLs and scrape product details.
#[derive(Parser)]
#[command(
    name = "scrapedesk",
    version,
    about = "Discover product URLs from category pages and export product details to spreadsheets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Scraping service base URL (overrides the config file).
    #[arg(long, env = "SCRAPEDESK_BACKEND_URL", global = true)]
    pub backend: Option<String>,

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
    /// Discover product URLs and export them.
    Urls {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Discover product URLs, then scrape details for every product found.
    Run {
        #[command(flatten)]
        job: JobArgs,

        /// Stop after URL discovery.
        #[arg(long)]
        skip_details: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments shared by the scraping commands.
#[derive(Args, Debug)]
pub(crate) struct JobArgs {
    /// Category URLs (each may itself hold several, comma-separated).
    pub urls: Vec<String>,

    /// Read category URLs from a `.csv` or `.xlsx` file.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Maximum number of product URLs to discover in total.
    #[arg(short, long)]
    pub limit: Option<u32>,

    /// Drop repeated category URLs.
    #[arg(long)]
    pub dedupe: bool,

    /// Directory for exported spreadsheets.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Print the job log when finished.
    #[arg(long)]
    pub show_logs: bool,
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
        0 => "scrapedesk=info",
        1 => "scrapedesk=debug",
        _ => "scrapedesk=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Urls { job } => cmd_scrape(cli.backend.as_deref(), &job, true).await,
        Command::Run { job, skip_details } => {
            cmd_scrape(cli.backend.as_deref(), &job, skip_details).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.backend.as_deref()).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Scrape commands
// ---------------------------------------------------------------------------

/// Job settings after merging CLI flags over the config file.
#[derive(Debug)]
struct JobSettings {
    limit: Option<u32>,
    dedupe: bool,
    out_dir: PathBuf,
}

impl JobSettings {
    fn resolve(job: &JobArgs, config: &AppConfig) -> Self {
        Self {
            limit: job.limit.or(config.defaults.limit),
            dedupe: job.dedupe || config.defaults.dedupe_urls,
            out_dir: job
                .out
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir)),
        }
    }
}

async fn cmd_scrape(backend: Option<&str>, job: &JobArgs, skip_details: bool) -> Result<()> {
    let config = resolved_config(backend)?;
    let settings = JobSettings::resolve(job, &config);
    let categories = collect_category_urls(job, settings.dedupe)?;

    let client = RemoteClient::new(
        &config.backend.url,
        &ClientOptions {
            timeout_secs: config.backend.timeout_secs,
        },
    )?;
    info!(
        backend = %client.base_url(),
        categories = categories.len(),
        limit = ?settings.limit,
        "starting scrape"
    );

    let orchestrator =
        ScrapeOrchestrator::new(client).with_reporter(Arc::new(CliProgress::new()));
    let result = scrape_phases(&orchestrator, &categories, &settings, skip_details).await;

    if job.show_logs {
        print_logs(&orchestrator);
    }
    result
}

async fn scrape_phases(
    orchestrator: &ScrapeOrchestrator<RemoteClient>,
    categories: &UrlSet,
    settings: &JobSettings,
    skip_details: bool,
) -> Result<()> {
    let outcome = until_interrupted(
        orchestrator.run_url_discovery_phase(categories, settings.limit),
        || orchestrator.cancel_url_phase(),
    )
    .await?;

    let product_urls = match outcome {
        JobOutcome::Succeeded(result) => result,
        JobOutcome::Cancelled => {
            println!("URL discovery cancelled.");
            return Ok(());
        }
        JobOutcome::Failed(message) => return Err(eyre!(message)),
    };

    let bytes = export_urls(&product_urls)?;
    let urls_path = write_export(&settings.out_dir, URLS_FILE_NAME, &bytes)?;

    println!();
    println!("  Product URLs: {}", product_urls.len());
    println!("  Saved to:     {}", urls_path.display());
    println!();

    if skip_details {
        return Ok(());
    }
    if product_urls.is_empty() {
        warn!("no product URLs discovered; skipping detail extraction");
        return Ok(());
    }

    let outcome = until_interrupted(
        orchestrator.run_detail_phase(&product_urls),
        || orchestrator.cancel_detail_phase(),
    )
    .await?;

    let records = match outcome {
        JobOutcome::Succeeded(records) => records,
        JobOutcome::Cancelled => {
            println!("Detail extraction cancelled.");
            return Ok(());
        }
        JobOutcome::Failed(message) => return Err(eyre!(message)),
    };

    let bytes = export_details(&records)?;
    let details_path = write_export(&settings.out_dir, DETAILS_FILE_NAME, &bytes)?;

    println!("  Products:     {}", records.len());
    println!("  Saved to:     {}", details_path.display());
    println!();

    Ok(())
}

/// Drive a phase to completion, cancelling it on the first Ctrl-C.
async fn until_interrupted<T, F>(
    phase: F,
    cancel: impl FnOnce() -> bool,
) -> scrapedesk_shared::Result<JobOutcome<T>>
where
    F: Future<Output = scrapedesk_shared::Result<JobOutcome<T>>>,
{
    tokio::pin!(phase);
    tokio::select! {
        outcome = &mut phase => outcome,
        Ok(()) = tokio::signal::ctrl_c() => {
            if cancel() {
                info!("interrupt received, cancelling");
            }
            phase.await
        }
    }
}

/// Merge positional URLs and an optional upload into one category set.
fn collect_category_urls(job: &JobArgs, dedupe: bool) -> Result<UrlSet> {
    let opts = NormalizeOptions { dedupe: false };
    let mut inputs = vec![RawInput::Text(job.urls.join("\n"))];
    if let Some(path) = &job.file {
        inputs.push(ingest_file(path)?);
    }

    let merged: UrlSet = inputs
        .iter()
        .flat_map(|input| normalize_input(input, opts))
        .collect();
    let merged = if dedupe { merged.dedup() } else { merged };

    if merged.is_empty() {
        return Err(eyre!("no category URLs given; pass URLs or --file"));
    }
    Ok(merged)
}

fn print_logs(orchestrator: &ScrapeOrchestrator<RemoteClient>) {
    println!("Log:");
    for event in orchestrator.logs().snapshot() {
        println!("  [{}] {}", event.at.format("%H:%M:%S"), event.message);
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar per phase.
struct CliProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = guard.as_ref() {
            f(bar);
        }
    }
}

impl ProgressReporter for CliProgress {
    fn started(&self, phase: PhaseKind) {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg:<28} [{bar:30.cyan/blue}] {pos:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "]),
        );
        bar.set_message(format!("Running {phase}"));
        bar.enable_steady_tick(Duration::from_millis(80));
        *self.bar.lock().unwrap_or_else(PoisonError::into_inner) = Some(bar);
    }

    fn progress(&self, _phase: PhaseKind, percent: u8) {
        self.with_bar(|bar| bar.set_position(u64::from(percent)));
    }

    fn finished(&self, phase: PhaseKind, state: JobPhase) {
        self.with_bar(|bar| bar.finish_with_message(format!("{phase} {state}")));
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

/// Load the config file and apply the `--backend` override.
fn resolved_config(backend: Option<&str>) -> Result<AppConfig> {
    let mut config = load_config()?;
    if let Some(url) = backend {
        config.backend.url = url.to_string();
        config.validate()?;
    }
    Ok(config)
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(backend: Option<&str>) -> Result<()> {
    let config = resolved_config(backend)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
