//! In-memory novel produced by the pipeline and consumed by the EPUB writer.

/// Body used for chapters whose page could not be fetched or yielded no content.
pub const PLACEHOLDER_BODY: &str = "<p><i>Chapter content could not be downloaded.</i></p>";

/// One novel: metadata plus chapters in reading order.
///
/// Built by [`Pipeline::run`](crate::scraper::Pipeline::run) and handed to
/// [`write_epub`](crate::epub::write_epub) by reference; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Novel {
    pub title: String,
    pub author: String,
    pub cover_url: Option<String>,
    /// Landing page the novel was scraped from.
    pub source_url: String,
    pub chapters: Vec<Chapter>,
}

/// One chapter in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// 1-based position in the site's chapter listing.
    pub number: u32,
    pub title: String,
    pub source_url: String,
    /// Sanitized XHTML. `None` until the body phase has run.
    pub body: Option<String>,
}

/// One entry of a strategy's chapter listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterLink {
    pub title: String,
    pub url: String,
}

impl Chapter {
    pub fn new(number: u32, link: ChapterLink) -> Self {
        Self {
            number,
            title: link.title,
            source_url: link.url,
            body: None,
        }
    }

    /// Body to render, substituting the placeholder when none was set.
    pub fn body_or_placeholder(&self) -> &str {
        self.body.as_deref().unwrap_or(PLACEHOLDER_BODY)
    }
}

impl Novel {
    /// True when chapter numbers are strictly increasing (and therefore unique).
    pub fn chapters_in_order(&self) -> bool {
        self.chapters.windows(2).all(|w| w[0].number < w[1].number)
            && self.chapters.first().map_or(true, |c| c.number >= 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(number: u32) -> Chapter {
        Chapter::new(
            number,
            ChapterLink {
                title: format!("Chapter {}", number),
                url: format!("https://example.com/c/{}", number),
            },
        )
    }

    fn novel(chapters: Vec<Chapter>) -> Novel {
        Novel {
            title: "Test".to_string(),
            author: "Author".to_string(),
            cover_url: None,
            source_url: "https://example.com/novel".to_string(),
            chapters,
        }
    }

    #[test]
    fn chapter_from_link_has_no_body() {
        let ch = chapter(3);
        assert_eq!(ch.number, 3);
        assert_eq!(ch.title, "Chapter 3");
        assert_eq!(ch.source_url, "https://example.com/c/3");
        assert!(ch.body.is_none());
        assert_eq!(ch.body_or_placeholder(), PLACEHOLDER_BODY);
    }

    #[test]
    fn chapters_in_order_accepts_strictly_increasing() {
        assert!(novel(vec![chapter(1), chapter(2), chapter(5)]).chapters_in_order());
        assert!(novel(vec![]).chapters_in_order());
    }

    #[test]
    fn chapters_in_order_rejects_duplicates_and_zero() {
        assert!(!novel(vec![chapter(1), chapter(1)]).chapters_in_order());
        assert!(!novel(vec![chapter(2), chapter(1)]).chapters_in_order());
        assert!(!novel(vec![chapter(0), chapter(1)]).chapters_in_order());
    }
}
