//! Site-agnostic scraping: fetcher, extraction strategy contract, registry, and pipeline.

mod client;
mod document;
mod error;
mod pipeline;
mod registry;

pub use client::{
    Fetcher, HttpFetcher, HttpFetcherBuilder, Page, StaticFetcher, DEFAULT_TIMEOUT_SECS,
};
pub use document::{clean_html, element_text, escape_attr, escape_text, selector, Document};
pub use error::{FetchError, Phase, PipelineError, RegistryError};
pub use pipeline::{Pipeline, PipelineOptions, RetryPolicy};
pub use registry::{normalize_host, Registry, StrategyDescriptor};

use crate::model::ChapterLink;
use reqwest::Url;

/// Author used when a page names nobody.
pub const UNKNOWN_AUTHOR: &str = "<unknown>";

/// Strip a known site suffix from the end of a page title (e.g. " - Royal Road", " | Scribble Hub")
/// so that titles containing " - " or " | " in the actual title are preserved.
pub fn strip_title_site_suffix(s: &str, suffixes: &[&str]) -> String {
    let mut t = s.trim();
    for suffix in suffixes {
        if t.ends_with(suffix) {
            t = t[..t.len() - suffix.len()].trim();
            break;
        }
    }
    t.to_string()
}

/// Extraction contract implemented once per supported site family.
///
/// A strategy instance is built for one novel URL by its [`StrategyDescriptor`] and
/// used by a single pipeline run. The `find_*` hooks carry the site-specific rules;
/// the `extract_*` methods layer the generic fallbacks on top and are not meant to be
/// overridden. Nothing here returns an error for a selector miss: misses fall back or
/// yield an empty value. Only [`list_chapters`](Strategy::list_chapters) can fail, when
/// a secondary request does.
pub trait Strategy: Send + Sync {
    /// Landing page this instance was built for.
    fn novel_url(&self) -> &Url;

    fn find_title(&self, _doc: &Document) -> Option<String> {
        None
    }

    fn find_author(&self, _doc: &Document) -> Option<String> {
        None
    }

    fn find_cover_url(&self, _doc: &Document) -> Option<String> {
        None
    }

    /// Chapter entries in reading order. `Ok(vec![])` when the page lists none.
    fn list_chapters(
        &self,
        doc: &Document,
        fetcher: &dyn Fetcher,
    ) -> Result<Vec<ChapterLink>, FetchError>;

    /// Sanitized chapter XHTML, or `None` when the content container is missing or empty.
    fn extract_body(&self, doc: &Document) -> Option<String>;

    /// Site rule, then `og:title`, then `<title>`.
    fn extract_title(&self, doc: &Document) -> String {
        self.find_title(doc)
            .or_else(|| doc.meta_content("og:title"))
            .or_else(|| doc.page_title())
            .unwrap_or_default()
    }

    /// Site rule, else [`UNKNOWN_AUTHOR`].
    fn extract_author(&self, doc: &Document) -> String {
        self.find_author(doc)
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
    }

    /// Site rule, then `og:image`.
    fn extract_cover_url(&self, doc: &Document) -> Option<String> {
        self.find_cover_url(doc).or_else(|| {
            doc.meta_content("og:image")
                .and_then(|u| doc.absolute_url(&u))
        })
    }
}
