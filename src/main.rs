//! # codectx CLI
//!
//! Builds and incrementally maintains a single markdown digest of a source
//! tree, one section per file.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `codectx update [DIR]` | Summarize new and changed files, merge, write |
//! | `codectx scan [DIR]` | Summarize every discovered file, merge, write |
//! | `codectx status [DIR]` | Show each file's state without writing anything |
//!
//! ## Examples
//!
//! ```bash
//! # Placeholder summaries, no API calls
//! codectx update --mode mock .
//!
//! # Remote summaries with a key from the environment
//! CODECTX_API_KEY=... codectx update ~/src/project
//!
//! # What would the next update touch?
//! codectx status ~/src/project
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use codectx::config::{self, Config, ProcessingMode};
use codectx::error::CodectxError;
use codectx::pipeline::{self, RunAction};
use codectx::progress::{ProgressMode, ProgressReporter};
use codectx::status;

/// Keep a markdown digest of a source tree up to date.
///
/// Configuration is layered: built-in defaults, then `.codectx.toml` in the
/// scanned directory (or `--config`), then `CODECTX_*` environment
/// variables, then command-line flags.
#[derive(Parser)]
#[command(name = "codectx", version, about = "Incremental source tree digests for AI tools")]
struct Cli {
    /// Path to a TOML configuration file. Defaults to `<DIR>/.codectx.toml` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Progress on stderr: `off`, `human` or `json`. Defaults to human on a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize new and changed files, then rewrite the digest.
    Update {
        /// Directory to scan.
        #[arg(default_value = ".")]
        dir: PathBuf,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// Summarize every file regardless of state, then rewrite the digest.
    Scan {
        /// Directory to scan.
        #[arg(default_value = ".")]
        dir: PathBuf,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// List discovered files with their state. Never writes and needs no API key.
    Status {
        /// Directory to scan.
        #[arg(default_value = ".")]
        dir: PathBuf,

        #[command(flatten)]
        opts: RunOpts,
    },
}

/// Per-run overrides, applied on top of file and environment settings.
#[derive(Args)]
struct RunOpts {
    /// Processing mode: `copy`, `mock` or `remote`.
    #[arg(long, value_enum)]
    mode: Option<ProcessingMode>,

    /// API key for the summarization service.
    #[arg(long)]
    api_key: Option<String>,

    /// Chat-completions endpoint URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Model identifier sent with each request.
    #[arg(long)]
    model: Option<String>,

    /// Files estimated below this many tokens are stored verbatim.
    #[arg(long)]
    token_threshold: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout: Option<f64>,

    /// Attempts per file before giving up.
    #[arg(long)]
    retry_attempts: Option<u32>,

    /// Size ceiling in MB; larger files get a placeholder.
    #[arg(long)]
    max_file_size: Option<f64>,

    /// Digest path, relative to the scanned directory unless absolute.
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Maximum files summarized at once.
    #[arg(long)]
    concurrency: Option<usize>,
}

impl RunOpts {
    fn apply(self, config: &mut Config) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(key) = self.api_key {
            config.remote.api_key = Some(key);
        }
        if let Some(url) = self.api_url {
            config.remote.api_url = Some(url);
        }
        if let Some(model) = self.model {
            config.remote.model = model;
        }
        if let Some(threshold) = self.token_threshold {
            config.token_threshold = threshold;
        }
        if let Some(timeout) = self.timeout {
            config.remote.timeout_secs = timeout;
        }
        if let Some(attempts) = self.retry_attempts {
            config.remote.retry_attempts = attempts;
        }
        if let Some(size) = self.max_file_size {
            config.max_file_size_mb = size;
        }
        if let Some(output) = self.output_file {
            config.output_file = output;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "codectx=debug" } else { "codectx=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}

fn build_config(explicit: Option<&Path>, dir: &Path, opts: RunOpts) -> anyhow::Result<Config> {
    let mut cfg = config::load_config(dir, explicit)?;
    cfg.apply_env(|name| std::env::var(name).ok())?;
    opts.apply(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let reporter: Arc<dyn ProgressReporter> = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter()
        .into();

    let (action, dir, opts) = match cli.command {
        Commands::Status { dir, opts } => {
            let cfg = build_config(cli.config.as_deref(), &dir, opts)?;
            let survey = pipeline::survey(&cfg, reporter.as_ref())
                .with_context(|| format!("cannot inspect {}", dir.display()))?;
            status::print_status(&survey.discovery.files, &survey.classification);
            return Ok(());
        }
        Commands::Update { dir, opts } => (RunAction::Update, dir, opts),
        Commands::Scan { dir, opts } => (RunAction::ScanAll, dir, opts),
    };

    let cfg = build_config(cli.config.as_deref(), &dir, opts)?;
    let output = cfg.output_path();

    let result = tokio::select! {
        result = pipeline::run(&cfg, action, reporter) => result,
        _ = tokio::signal::ctrl_c() => Err(CodectxError::Interrupted),
    };

    match result {
        Ok(report) => println!("{}", report),
        Err(CodectxError::Interrupted) => {
            eprintln!("Interrupted. {} was left unchanged.", output.display());
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
