//! Scribble Hub. The series page only renders ~15 chapters per TOC page, so the full
//! list is requested from the "Show All Chapters" AJAX endpoint first; the paginated
//! series TOC is the fallback. Chapter body: `#chp_raw`.

use super::{json_ld_book, json_str};
use crate::model::ChapterLink;
use crate::scraper::{
    clean_html, element_text, selector, strip_title_site_suffix, Document, FetchError, Fetcher,
    Strategy, StrategyDescriptor,
};
use reqwest::Url;
use std::collections::HashSet;

const AJAX_PATH: &str = "/wp-admin/admin-ajax.php";
const TITLE_SUFFIXES: &[&str] = &[" | Scribble Hub", " - Scribble Hub"];
/// Upper bound on followed TOC pages, in case pagination links loop.
const MAX_TOC_PAGES: usize = 500;

/// Author notes and footnote popups inside `#chp_raw`.
const BODY_NOISE: &[&str] = &[
    ".wi_authornotes",
    ".wi_news",
    ".modern-footnotes-footnote__note",
];

pub const DESCRIPTOR: StrategyDescriptor = StrategyDescriptor {
    name: "scribblehub",
    base_urls: &["https://www.scribblehub.com/"],
    build,
};

fn build(url: Url) -> Box<dyn Strategy> {
    Box::new(ScribbleHub { url })
}

pub struct ScribbleHub {
    url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TocEntry {
    order: u32,
    link: ChapterLink,
}

/// Series ID from `/series/{id}/{slug}/`.
fn extract_series_id_from_url(url: &Url) -> Option<&str> {
    let after_series = url.path().strip_prefix("/series/")?;
    let id = after_series.split('/').next()?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(id)
}

/// Entries of one TOC listing: `li.toc_w` (with an `order` attribute) holding `a.toc_a`.
fn parse_toc_page(doc: &Document) -> Vec<TocEntry> {
    let Some(link_sel) = selector("a.toc_a") else {
        return Vec::new();
    };
    doc.select_all("ol.toc_ol li.toc_w")
        .into_iter()
        .filter_map(|li| {
            let order = li
                .value()
                .attr("order")
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(0);
            let a = li.select(&link_sel).next()?;
            let url = doc.absolute_url(a.value().attr("href")?)?;
            let title = element_text(&a)?;
            Some(TocEntry {
                order,
                link: ChapterLink { title, url },
            })
        })
        .collect()
}

/// Sort TOC entries by order and deduplicate by URL (first occurrence kept).
fn merge_toc_entries(mut entries: Vec<TocEntry>) -> Vec<ChapterLink> {
    entries.sort_by_key(|e| e.order);
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.link.url.clone()))
        .map(|e| e.link)
        .collect()
}

/// `toc=N` from the query string; 1 when absent.
fn toc_page_number(url: &Url) -> u32 {
    url.query_pairs()
        .find(|(k, _)| k == "toc")
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(1)
}

/// Next TOC page from `#pagination-mesh-toc a.page-link.next`, or any pagination
/// link pointing at `toc=current+1` (the "»" link sometimes lacks the `.next` class).
fn next_toc_page_url(doc: &Document, current_page: u32) -> Option<Url> {
    let usable = |href: &str| !href.is_empty() && href != "#";
    if let Some(href) = doc.attr_of("#pagination-mesh-toc a.page-link.next", "href") {
        if usable(href.as_str()) {
            if let Ok(u) = doc.url().join(&href) {
                return Some(u);
            }
        }
    }
    doc.select_all("#pagination-mesh-toc a[href*=\"toc=\"]")
        .into_iter()
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| usable(*href))
        .filter_map(|href| doc.url().join(href).ok())
        .find(|u| toc_page_number(u) == current_page + 1)
}

impl ScribbleHub {
    fn fetch_toc_via_ajax(
        &self,
        doc: &Document,
        fetcher: &dyn Fetcher,
        series_id: &str,
    ) -> Result<Vec<ChapterLink>, FetchError> {
        let Ok(ajax_url) = doc.url().join(AJAX_PATH) else {
            return Ok(Vec::new());
        };
        tracing::debug!(url = %ajax_url, series_id, "Requesting full TOC");
        let page = fetcher.post_form(
            &ajax_url,
            &[
                ("action", "wi_getreleases_pagination"),
                ("pagenum", "-1"),
                ("mypostid", series_id),
            ],
        )?;
        Ok(merge_toc_entries(parse_toc_page(&page.into_document())))
    }

    fn fetch_toc_pages(
        &self,
        doc: &Document,
        fetcher: &dyn Fetcher,
    ) -> Result<Vec<ChapterLink>, FetchError> {
        let mut entries = parse_toc_page(doc);
        let mut visited = HashSet::from([doc.url().to_string()]);
        let mut next = next_toc_page_url(doc, toc_page_number(doc.url()));
        while let Some(url) = next.take() {
            if visited.len() >= MAX_TOC_PAGES || !visited.insert(url.to_string()) {
                break;
            }
            tracing::debug!(%url, "Fetching TOC page");
            let page = fetcher.fetch(&url)?;
            entries.extend(parse_toc_page(&page));
            next = next_toc_page_url(&page, toc_page_number(&url));
        }
        Ok(merge_toc_entries(entries))
    }
}

impl Strategy for ScribbleHub {
    fn novel_url(&self) -> &Url {
        &self.url
    }

    fn find_title(&self, doc: &Document) -> Option<String> {
        doc.text_of("div.fic_title")
            .or_else(|| json_ld_book(doc).and_then(|book| json_str(&book, &["name"])))
            .or_else(|| {
                doc.page_title()
                    .map(|t| strip_title_site_suffix(&t, TITLE_SUFFIXES))
                    .filter(|t| !t.is_empty())
            })
    }

    fn find_author(&self, doc: &Document) -> Option<String> {
        doc.text_of("span.auth_name_fic")
            .or_else(|| json_ld_book(doc).and_then(|book| json_str(&book, &["author", "name"])))
    }

    fn find_cover_url(&self, doc: &Document) -> Option<String> {
        doc.attr_of("div.fic_image img", "src")
            .or_else(|| json_ld_book(doc).and_then(|book| json_str(&book, &["image"])))
            .and_then(|src| doc.absolute_url(&src))
    }

    fn list_chapters(
        &self,
        doc: &Document,
        fetcher: &dyn Fetcher,
    ) -> Result<Vec<ChapterLink>, FetchError> {
        if let Some(series_id) = extract_series_id_from_url(&self.url) {
            match self.fetch_toc_via_ajax(doc, fetcher, series_id) {
                Ok(links) if !links.is_empty() => return Ok(links),
                Ok(_) => tracing::debug!("AJAX TOC empty; using series page"),
                Err(e) => tracing::warn!(error = %e, "AJAX TOC failed; using series page"),
            }
        }
        self.fetch_toc_pages(doc, fetcher)
    }

    fn extract_body(&self, doc: &Document) -> Option<String> {
        let root = doc.select_first("#chp_raw")?;
        Some(clean_html(root, BODY_NOISE, doc.url()))
    }
}
