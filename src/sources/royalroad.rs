//! Royal Road. Metadata comes from the JSON-LD `Book` block with DOM fallbacks; the
//! chapter list is embedded in the fiction page as `window.chapters = [...]`.
//!
//! Cloudflare challenges are not handled; the fetcher's cookie jar and browser-like
//! User-Agent are usually enough.

use super::{json_ld_book, json_str};
use crate::model::ChapterLink;
use crate::scraper::{
    clean_html, strip_title_site_suffix, Document, FetchError, Fetcher, Strategy,
    StrategyDescriptor,
};
use reqwest::Url;
use serde::Deserialize;

const ROYALROAD_BASE: &str = "https://www.royalroad.com/";
const TITLE_SUFFIXES: &[&str] = &[" _ Royal Road", " - Royal Road", " | Royal Road"];

pub const DESCRIPTOR: StrategyDescriptor = StrategyDescriptor {
    name: "royalroad",
    base_urls: &[ROYALROAD_BASE],
    build,
};

fn build(url: Url) -> Box<dyn Strategy> {
    Box::new(RoyalRoad { url })
}

pub struct RoyalRoad {
    url: Url,
}

/// One entry of `window.chapters` (relative url, 0-based order, lock flag).
#[derive(Debug, Deserialize)]
struct WindowChapter {
    title: String,
    url: String,
    #[serde(default)]
    order: u32,
    #[serde(rename = "isUnlocked", default = "default_true")]
    is_unlocked: bool,
}

fn default_true() -> bool {
    true
}

/// Find the matching closing bracket for the first '[' in s, skipping content inside JSON strings.
fn extract_json_array_with_strings(s: &str) -> Option<&str> {
    let start = s.find('[')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (byte_offset, c) in s[start..].char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            if c == '\\' {
                escape = true;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + byte_offset + 1]);
                }
            }
            '"' => in_string = true,
            _ => {}
        }
    }
    None
}

/// Unlocked entries of the embedded `window.chapters` array, sorted by order.
/// `None` when no script carries a parseable array.
fn window_chapters(doc: &Document) -> Option<Vec<WindowChapter>> {
    const NEEDLE: &str = "window.chapters = ";
    let script = doc
        .select_all("script")
        .into_iter()
        .map(|s| s.text().collect::<String>())
        .find(|text| text.contains(NEEDLE))?;
    let start = script.find(NEEDLE)? + NEEDLE.len();
    let array = extract_json_array_with_strings(&script[start..])?;
    let mut chapters: Vec<WindowChapter> = match serde_json::from_str(array) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(url = %doc.url(), error = %e, "Malformed window.chapters");
            return None;
        }
    };
    let locked = chapters.iter().filter(|c| !c.is_unlocked).count();
    if locked > 0 {
        tracing::info!(locked, "Skipping locked chapters");
    }
    chapters.retain(|c| c.is_unlocked);
    chapters.sort_by_key(|c| c.order);
    Some(chapters)
}

impl Strategy for RoyalRoad {
    fn novel_url(&self) -> &Url {
        &self.url
    }

    fn find_title(&self, doc: &Document) -> Option<String> {
        json_ld_book(doc)
            .and_then(|book| json_str(&book, &["name"]))
            .or_else(|| doc.text_of("h1.font-white"))
            .or_else(|| {
                doc.meta_content("og:title")
                    .map(|t| strip_title_site_suffix(&t, TITLE_SUFFIXES))
                    .filter(|t| !t.is_empty())
            })
    }

    fn find_author(&self, doc: &Document) -> Option<String> {
        json_ld_book(doc)
            .and_then(|book| json_str(&book, &["author", "name"]))
            .or_else(|| doc.text_of("h4 a.font-white"))
    }

    fn find_cover_url(&self, doc: &Document) -> Option<String> {
        json_ld_book(doc)
            .and_then(|book| json_str(&book, &["image"]))
            .and_then(|src| doc.absolute_url(&src))
    }

    fn list_chapters(
        &self,
        doc: &Document,
        _fetcher: &dyn Fetcher,
    ) -> Result<Vec<ChapterLink>, FetchError> {
        let Some(chapters) = window_chapters(doc) else {
            tracing::warn!(url = %doc.url(), "window.chapters not found");
            return Ok(Vec::new());
        };
        let Ok(base) = Url::parse(ROYALROAD_BASE) else {
            return Ok(Vec::new());
        };
        Ok(chapters
            .into_iter()
            .filter_map(|c| {
                let url = base.join(&c.url).ok()?;
                Some(ChapterLink {
                    title: c.title.trim().to_string(),
                    url: url.to_string(),
                })
            })
            .collect())
    }

    /// Direct `<p>` children of the chapter container only; injected anti-piracy
    /// paragraphs sit in nested, randomly-classed elements.
    fn extract_body(&self, doc: &Document) -> Option<String> {
        let root = doc.select_first("div.chapter-inner.chapter-content")?;
        let paragraphs = doc.select_all("div.chapter-inner.chapter-content > p");
        if paragraphs.is_empty() {
            return Some(clean_html(root, &[], doc.url()));
        }
        Some(
            paragraphs
                .into_iter()
                .map(|p| format!("<p>{}</p>", clean_html(p, &[], doc.url())))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}
