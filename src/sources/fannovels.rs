//! FanNovels family (fannovels.com, fannovel.net, fannovel.com).
//!
//! The novel page carries a hidden `input#novelId`; the chapter list is served by
//! `/ajax/chapter-archive?novelId=<id>` as an HTML fragment.

use super::links_from;
use crate::model::ChapterLink;
use crate::scraper::{clean_html, Document, FetchError, Fetcher, Strategy, StrategyDescriptor};
use reqwest::Url;

pub const DESCRIPTOR: StrategyDescriptor = StrategyDescriptor {
    name: "fannovels",
    base_urls: &[
        "https://fannovels.com/",
        "https://fannovel.net/",
        "https://www.fannovel.com/",
    ],
    build,
};

/// Ads, social widgets and translator notes inside the chapter container.
const BODY_NOISE: &[&str] = &[".ads-holder", ".cha-note"];

fn build(url: Url) -> Box<dyn Strategy> {
    Box::new(FanNovels { url })
}

pub struct FanNovels {
    url: Url,
}

impl FanNovels {
    fn archive_url(doc: &Document) -> Option<Url> {
        let Some(novel_id) = doc.attr_of("input#novelId", "value") else {
            tracing::warn!(url = %doc.url(), "Novel id not found; cannot list chapters");
            return None;
        };
        let mut url = doc.url().join("/ajax/chapter-archive").ok()?;
        url.query_pairs_mut().append_pair("novelId", &novel_id);
        Some(url)
    }
}

impl Strategy for FanNovels {
    fn novel_url(&self) -> &Url {
        &self.url
    }

    fn find_title(&self, doc: &Document) -> Option<String> {
        doc.text_of("h3.title")
    }

    fn find_author(&self, doc: &Document) -> Option<String> {
        doc.text_of("div.info a[href*=\"/author/\"]")
    }

    fn find_cover_url(&self, doc: &Document) -> Option<String> {
        doc.attr_of("div.book img", "src")
            .and_then(|src| doc.absolute_url(&src))
    }

    fn list_chapters(
        &self,
        doc: &Document,
        fetcher: &dyn Fetcher,
    ) -> Result<Vec<ChapterLink>, FetchError> {
        let Some(archive_url) = Self::archive_url(doc) else {
            return Ok(Vec::new());
        };
        tracing::debug!(url = %archive_url, "Fetching chapter archive");
        let archive = fetcher.fetch(&archive_url)?;
        Ok(links_from(&archive, "ul.list-chapter li a"))
    }

    fn extract_body(&self, doc: &Document) -> Option<String> {
        let root = doc.select_first("#chapter-content")?;
        Some(clean_html(root, BODY_NOISE, doc.url()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::{StaticFetcher, UNKNOWN_AUTHOR};

    const NOVEL_URL: &str = "https://fannovels.com/novel/the-long-road";

    const NOVEL_PAGE: &str = r#"<html><head>
<title>The Long Road - FanNovels</title>
<meta property="og:title" content="The Long Road | Read Online"/>
<meta property="og:image" content="https://fannovels.com/og.png"/>
</head><body>
<div class="book"><img src="/media/covers/long-road.jpg"/></div>
<h3 class="title">The Long Road</h3>
<div class="info"><a href="/author/jane-doe">Jane Doe</a></div>
<input type="hidden" id="novelId" value="4711"/>
</body></html>"#;

    const ARCHIVE: &str = r#"<ul class="list-chapter">
<li><a href="/novel/the-long-road/chapter-1" title="Chapter 1">Chapter 1: Departure</a></li>
<li><a href="/novel/the-long-road/chapter-2" title="Chapter 2">Chapter 2: Rain</a></li>
</ul>"#;

    fn page(html: &str, url: &str) -> Document {
        Document::parse(html, Url::parse(url).unwrap())
    }

    #[test]
    fn extracts_metadata_with_site_rules() {
        let s = FanNovels {
            url: Url::parse(NOVEL_URL).unwrap(),
        };
        let doc = page(NOVEL_PAGE, NOVEL_URL);
        assert_eq!(s.extract_title(&doc), "The Long Road");
        assert_eq!(s.extract_author(&doc), "Jane Doe");
        assert_eq!(
            s.extract_cover_url(&doc).as_deref(),
            Some("https://fannovels.com/media/covers/long-road.jpg")
        );
    }

    #[test]
    fn metadata_falls_back_to_generic_rules() {
        let s = FanNovels {
            url: Url::parse(NOVEL_URL).unwrap(),
        };
        let doc = page(
            r#"<html><head><title>Bare</title><meta property="og:image" content="/og.png"/></head></html>"#,
            NOVEL_URL,
        );
        assert_eq!(s.extract_title(&doc), "Bare");
        assert_eq!(s.extract_author(&doc), UNKNOWN_AUTHOR);
        assert_eq!(
            s.extract_cover_url(&doc).as_deref(),
            Some("https://fannovels.com/og.png")
        );
    }

    #[test]
    fn lists_chapters_through_archive_endpoint() -> Result<(), FetchError> {
        let s = FanNovels {
            url: Url::parse(NOVEL_URL).unwrap(),
        };
        let fetcher = StaticFetcher::new().with_page(
            "https://fannovels.com/ajax/chapter-archive?novelId=4711",
            ARCHIVE,
        );
        let links = s.list_chapters(&page(NOVEL_PAGE, NOVEL_URL), &fetcher)?;
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].title, "Chapter 1: Departure");
        assert_eq!(
            links[0].url,
            "https://fannovels.com/novel/the-long-road/chapter-1"
        );
        assert_eq!(links[1].title, "Chapter 2: Rain");
        Ok(())
    }

    #[test]
    fn missing_novel_id_lists_nothing_without_fetching() -> Result<(), FetchError> {
        let s = FanNovels {
            url: Url::parse(NOVEL_URL).unwrap(),
        };
        let fetcher = StaticFetcher::new();
        let links = s.list_chapters(&page("<html></html>", NOVEL_URL), &fetcher)?;
        assert!(links.is_empty());
        assert!(fetcher.requests().is_empty());
        Ok(())
    }

    #[test]
    fn archive_failure_is_an_error() {
        let s = FanNovels {
            url: Url::parse(NOVEL_URL).unwrap(),
        };
        let fetcher = StaticFetcher::new().with_status(
            "https://fannovels.com/ajax/chapter-archive?novelId=4711",
            502,
        );
        assert!(matches!(
            s.list_chapters(&page(NOVEL_PAGE, NOVEL_URL), &fetcher),
            Err(FetchError::HttpStatus { status: 502, .. })
        ));
    }

    #[test]
    fn body_drops_ads_and_notes() {
        let s = FanNovels {
            url: Url::parse(NOVEL_URL).unwrap(),
        };
        let doc = page(
            r#"<html><body><div id="chapter-content">
<p>It rained.</p><div class="ads-holder"><script>ad()</script>AD</div>
<p class="cha-note">Translator: thanks!</p><p>The end.</p></div></body></html>"#,
            "https://fannovels.com/novel/the-long-road/chapter-2",
        );
        let body = s.extract_body(&doc).expect("body");
        assert!(body.contains("<p>It rained.</p>"));
        assert!(body.contains("<p>The end.</p>"));
        assert!(!body.contains("AD"));
        assert!(!body.contains("Translator"));
        assert!(s
            .extract_body(&page("<html><body></body></html>", NOVEL_URL))
            .is_none());
    }
}
