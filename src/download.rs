//! Caller-facing entry point: novel URL in, `.epub` path out.

use crate::epub::{epub_filename, write_epub, EpubError, EpubOptions};
use crate::scraper::{Fetcher, Phase, Pipeline, PipelineError, PipelineOptions, Registry};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Assembly(#[from] EpubError),

    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// True when the URL belongs to no registered site. Not a failure of the tool.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DownloadError::Pipeline(e) if e.is_unsupported())
    }

    /// Short explanation suitable for an end user; details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            DownloadError::Pipeline(e) => match e {
                PipelineError::InvalidUrl { input, .. } => {
                    format!("'{}' does not look like a novel URL.", input)
                }
                PipelineError::UnsupportedSite { host, .. } => {
                    format!("Sorry, {} is not a supported site yet.", host)
                }
                PipelineError::Fetch { phase, source } => match phase {
                    Phase::FetchingInfo => format!(
                        "Could not open the novel page ({}). Check the link and try again.",
                        source
                    ),
                    _ => format!("Could not load the chapter list ({}).", source),
                },
                PipelineError::NoChapters { .. } => {
                    "No chapters were found for this novel.".to_string()
                }
                PipelineError::NoChaptersRetrieved { total, .. } => format!(
                    "None of the {} chapters could be downloaded. Try again later.",
                    total
                ),
                PipelineError::Cancelled { .. } => "The download was cancelled.".to_string(),
                PipelineError::WorkerPool(_) => {
                    "Could not start the download workers.".to_string()
                }
            },
            DownloadError::Assembly(_) | DownloadError::OutputDir { .. } => {
                "The novel was downloaded but the e-book could not be written.".to_string()
            }
        }
    }
}

/// Runs the pipeline for one URL and writes the result into `output_dir`.
pub struct Downloader<'a> {
    registry: &'a Registry,
    fetcher: &'a dyn Fetcher,
    output_dir: PathBuf,
    epub: EpubOptions,
}

impl<'a> Downloader<'a> {
    pub fn new(
        registry: &'a Registry,
        fetcher: &'a dyn Fetcher,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            output_dir: output_dir.into(),
            epub: EpubOptions::default(),
        }
    }

    /// Parent directory for the assembler's scratch workspaces.
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.epub.scratch_dir = Some(dir.into());
        self
    }

    /// Scrape `url` and bind it into `<output_dir>/<sanitized title>.epub`.
    /// An existing file with the same name is replaced.
    pub fn download(
        &self,
        url: &str,
        options: &PipelineOptions<'_>,
    ) -> Result<PathBuf, DownloadError> {
        let novel = Pipeline::new(self.registry, self.fetcher).run(url, options)?;

        std::fs::create_dir_all(&self.output_dir).map_err(|e| DownloadError::OutputDir {
            path: self.output_dir.clone(),
            source: e,
        })?;
        let path = self.output_dir.join(epub_filename(&novel.title));
        write_epub(&novel, &path, self.fetcher, &self.epub)?;
        Ok(path)
    }
}
