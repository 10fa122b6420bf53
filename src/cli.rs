//! CLI parsing and orchestration. Merges flags over config, downloads each URL in turn,
//! maps errors to exit codes.

use crate::config::{self, Config, ConfigError};
use crate::download::{DownloadError, Downloader};
use crate::scraper::{
    HttpFetcher, PipelineError, PipelineOptions, Registry, RegistryError, RetryPolicy,
    DEFAULT_TIMEOUT_SECS,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DELAY_MS: u64 = 250;

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Site table is inconsistent: {0}")]
    Registry(#[from] RegistryError),

    #[error("{}", .0.user_message())]
    Download(#[source] DownloadError),

    #[error("{failed} of {total} downloads failed")]
    Batch {
        failed: usize,
        total: usize,
        exit_code: i32,
    },
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Config(_) | CliRunError::Registry(_) => 1,
            CliRunError::Download(e) => download_exit_code(e),
            CliRunError::Batch { exit_code, .. } => *exit_code,
        }
    }
}

fn download_exit_code(e: &DownloadError) -> i32 {
    match e {
        DownloadError::Pipeline(
            PipelineError::InvalidUrl { .. } | PipelineError::UnsupportedSite { .. },
        ) => 1,
        DownloadError::Pipeline(_) => 2,
        DownloadError::Assembly(_) | DownloadError::OutputDir { .. } => 3,
    }
}

#[derive(Parser, Debug)]
#[command(name = "lnbind")]
#[command(about = "Download web novels from supported sites and bind them into EPUB files")]
#[command(
    after_help = "Config file keys (output_dir, scratch_dir, user_agent, timeout_secs, request_delay_ms, workers, retry_count, retry_backoff_secs) are read from ./lnbind.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    /// Novel page URLs. Each one is downloaded in turn.
    #[arg(required_unless_present = "list_sources")]
    pub urls: Vec<String>,

    /// Directory for finished books. Default: current directory.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Chapters fetched concurrently (overrides config; default 4).
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub workers: Option<u16>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Minimum spacing between requests in milliseconds (overrides config; default 250).
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Attempts per chapter, including the first (overrides config; default 3).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub retries: Option<u32>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and full error chain.
    #[arg(long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Print supported hosts and exit.
    #[arg(long)]
    pub list_sources: bool,
}

/// Effective run settings after merging CLI flags, config file and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub scratch_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub timeout_secs: u64,
    pub delay_ms: u64,
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Settings {
    pub fn resolve(args: &Args, config: &Config) -> Self {
        let defaults = PipelineOptions::default();
        let mut retry = defaults.retry.clone();
        if let Some(n) = args.retries.or(config.retry_count) {
            retry.attempts = n.max(1);
        }
        if let Some(secs) = &config.retry_backoff_secs {
            retry.backoff = secs.iter().map(|s| Duration::from_secs(*s)).collect();
        }
        Self {
            output_dir: args
                .output_dir
                .clone()
                .or_else(|| config.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            scratch_dir: config.scratch_dir.clone(),
            user_agent: args.user_agent.clone().or_else(|| config.user_agent.clone()),
            timeout_secs: args
                .timeout
                .or(config.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            delay_ms: args
                .delay_ms
                .or(config.request_delay_ms)
                .unwrap_or(DEFAULT_DELAY_MS),
            workers: args
                .workers
                .map(usize::from)
                .or(config.workers)
                .unwrap_or(defaults.workers)
                .max(1),
            retry,
        }
    }
}

pub fn run(args: &Args) -> Result<(), CliRunError> {
    let registry = Registry::builtin()?;

    if args.list_sources {
        for (host, name) in registry.hosts() {
            println!("{:<24} {}", host, name);
        }
        return Ok(());
    }
    if args.urls.is_empty() {
        return Err(CliRunError::InvalidInput(
            "No URL given. Pass one or more novel URLs, or --list-sources.".into(),
        ));
    }

    let config = config::load_config()?.unwrap_or_default();
    let settings = Settings::resolve(args, &config);
    tracing::debug!(?settings, "Resolved settings");

    let mut builder = HttpFetcher::builder()
        .timeout_secs(settings.timeout_secs)
        .delay_ms(settings.delay_ms);
    if let Some(ref ua) = settings.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    let fetcher = builder.build().map_err(|e| {
        CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e))
    })?;

    let mut downloader = Downloader::new(&registry, &fetcher, settings.output_dir.clone());
    if let Some(ref dir) = settings.scratch_dir {
        downloader = downloader.scratch_dir(dir.clone());
    }

    let mut failures: Vec<(String, DownloadError)> = Vec::new();
    for url in &args.urls {
        match download_one(&downloader, url, &settings, args.quiet) {
            Ok(path) => {
                if !args.quiet {
                    eprintln!("Wrote {}", path.display());
                }
            }
            Err(e) => {
                if e.is_unsupported() {
                    tracing::info!(url = %url, "Unsupported site");
                } else {
                    tracing::error!(url = %url, error = %e, "Download failed");
                }
                failures.push((url.clone(), e));
            }
        }
    }

    let total = args.urls.len();
    if total == 1 {
        return match failures.pop() {
            Some((_, e)) => Err(CliRunError::Download(e)),
            None => Ok(()),
        };
    }
    if failures.is_empty() {
        return Ok(());
    }
    for (url, e) in &failures {
        eprintln!("{}: {}", url, e.user_message());
    }
    let exit_code = failures
        .iter()
        .map(|(_, e)| download_exit_code(e))
        .max()
        .unwrap_or(2);
    Err(CliRunError::Batch {
        failed: failures.len(),
        total,
        exit_code,
    })
}

fn download_one(
    downloader: &Downloader<'_>,
    url: &str,
    settings: &Settings,
    quiet: bool,
) -> Result<PathBuf, DownloadError> {
    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                .progress_chars("=>-"),
        );
        pb.set_message("Chapters");
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    };
    let on_progress = |done: usize, total: usize| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
    };
    let options = PipelineOptions {
        workers: settings.workers,
        retry: settings.retry.clone(),
        progress: Some(&on_progress),
        cancel: None,
    };
    let result = downloader.download(url, &options);
    bar.finish_and_clear();
    result
}
