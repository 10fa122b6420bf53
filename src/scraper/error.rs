//! Error types for fetching, strategy registration, and pipeline runs.

use std::fmt;
use thiserror::Error;

/// Failure of a single HTTP request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Timeouts, connection failures, HTTP 5xx and HTTP 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            FetchError::BodyRead { .. } => false,
        }
    }
}

/// Startup-time registry failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Host '{host}' is claimed by both {existing} and {incoming}")]
    DuplicateHost {
        host: String,
        existing: &'static str,
        incoming: &'static str,
    },

    #[error("Strategy {strategy} declares an invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl {
        strategy: &'static str,
        url: &'static str,
        reason: String,
    },
}

/// Pipeline phase, used for logging and to say where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    FetchingInfo,
    EnumeratingChapters,
    FetchingChapterBodies,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Resolving => "resolving site",
            Phase::FetchingInfo => "fetching novel page",
            Phase::EnumeratingChapters => "listing chapters",
            Phase::FetchingChapterBodies => "fetching chapters",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Terminal failure of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Unsupported site '{host}' ({url})")]
    UnsupportedSite { url: String, host: String },

    #[error("Failed while {phase}: {source}")]
    Fetch {
        phase: Phase,
        #[source]
        source: FetchError,
    },

    #[error("No chapters found at {url}")]
    NoChapters { url: String },

    #[error("None of the {total} chapter(s) listed at {url} could be retrieved")]
    NoChaptersRetrieved { url: String, total: usize },

    #[error("Cancelled after {completed} chapter(s) of {url}")]
    Cancelled { url: String, completed: usize },

    #[error("Could not start chapter workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl PipelineError {
    /// Unsupported sites are an expected outcome rather than a fault.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, PipelineError::UnsupportedSite { .. })
    }

    /// Phase the run was in when it failed.
    pub fn phase(&self) -> Phase {
        match self {
            PipelineError::InvalidUrl { .. } | PipelineError::UnsupportedSite { .. } => {
                Phase::Resolving
            }
            PipelineError::Fetch { phase, .. } => *phase,
            PipelineError::NoChapters { .. } => Phase::EnumeratingChapters,
            PipelineError::NoChaptersRetrieved { .. }
            | PipelineError::Cancelled { .. }
            | PipelineError::WorkerPool(_) => Phase::FetchingChapterBodies,
        }
    }
}
