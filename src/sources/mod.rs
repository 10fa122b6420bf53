//! Built-in site strategies and the static table the registry is built from.
//!
//! Adding a site: write a module implementing [`Strategy`](crate::scraper::Strategy)
//! and append its descriptor to [`BUILTIN`].

pub mod fannovels;
pub mod royalroad;
pub mod scribblehub;

use crate::model::ChapterLink;
use crate::scraper::{element_text, Document, StrategyDescriptor};

/// Every strategy shipped with the crate.
pub const BUILTIN: &[StrategyDescriptor] = &[
    fannovels::DESCRIPTOR,
    royalroad::DESCRIPTOR,
    scribblehub::DESCRIPTOR,
];

/// Anchors matching `sel` as chapter links, in document order. Anchors without
/// an `href` are skipped; blank text falls back to the `title` attribute.
pub(crate) fn links_from(doc: &Document, sel: &str) -> Vec<ChapterLink> {
    doc.select_all(sel)
        .into_iter()
        .filter_map(|a| {
            let url = doc.absolute_url(a.value().attr("href")?)?;
            let title = element_text(&a)
                .or_else(|| a.value().attr("title").map(|t| t.trim().to_string()))
                .filter(|t| !t.is_empty())?;
            Some(ChapterLink { title, url })
        })
        .collect()
}

/// First JSON-LD block whose `@type` is `Book`.
pub(crate) fn json_ld_book(doc: &Document) -> Option<serde_json::Value> {
    doc.select_all("script[type=\"application/ld+json\"]")
        .into_iter()
        .filter_map(|script| {
            let text = script.text().collect::<String>();
            serde_json::from_str::<serde_json::Value>(text.trim()).ok()
        })
        .find(|v| v.get("@type").and_then(|t| t.as_str()) == Some("Book"))
}

/// Non-empty string at `path` inside a JSON value.
pub(crate) fn json_str(value: &serde_json::Value, path: &[&str]) -> Option<String> {
    let mut v = value;
    for key in path {
        v = v.get(key)?;
    }
    v.as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
