//! lnbind: scrape web novels from supported sites and bind them into EPUB 2 e-books.

pub mod cli;
pub mod config;
pub mod download;
pub mod epub;
pub mod model;
pub mod scraper;
pub mod sources;

// Re-exports for the CLI and library callers.
pub use download::{DownloadError, Downloader};
pub use epub::{epub_filename, write_epub, EpubError, EpubOptions};
pub use model::{Chapter, ChapterLink, Novel};
pub use scraper::{
    Fetcher, HttpFetcher, Pipeline, PipelineError, PipelineOptions, Registry, RetryPolicy,
    StaticFetcher, Strategy,
};
