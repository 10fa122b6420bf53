//! Novel extraction pipeline: resolve strategy, read novel page, list chapters,
//! fetch chapter bodies on a bounded worker pool, reassemble in reading order.

use super::error::{FetchError, Phase, PipelineError};
use super::{Document, Fetcher, Registry, Strategy};
use crate::model::{Chapter, ChapterLink, Novel, PLACEHOLDER_BODY};
use rayon::prelude::*;
use reqwest::Url;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_BACKOFF_SECS: [u64; 2] = [1, 2];

/// Retry policy for chapter-body requests. The fetcher itself never retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub attempts: u32,
    /// Wait before each retry; the last value is reused when shorter than `attempts - 1`.
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_COUNT,
            backoff: DEFAULT_BACKOFF_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Vec::new(),
        }
    }

    fn delay_after(&self, attempt: usize) -> Duration {
        self.backoff
            .get(attempt)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Options for one pipeline run.
pub struct PipelineOptions<'a> {
    /// Chapter bodies fetched concurrently. At least 1.
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Called with (chapters done, total) after each chapter body.
    pub progress: Option<&'a (dyn Fn(usize, usize) + Sync)>,
    /// When set, no further chapter fetches are started.
    pub cancel: Option<&'a AtomicBool>,
}

impl Default for PipelineOptions<'_> {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            progress: None,
            cancel: None,
        }
    }
}

/// Why a single chapter has no body. Never fatal on its own.
#[derive(Debug, Error)]
enum ChapterError {
    #[error("invalid chapter URL {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no content found")]
    EmptyBody,

    #[error("cancelled before fetching")]
    Cancelled,
}

/// Drives one [`Strategy`] through the fetch phases to build a [`Novel`].
pub struct Pipeline<'a> {
    registry: &'a Registry,
    fetcher: &'a dyn Fetcher,
}

impl<'a> Pipeline<'a> {
    pub fn new(registry: &'a Registry, fetcher: &'a dyn Fetcher) -> Self {
        Self { registry, fetcher }
    }

    /// Scrape the novel at `url`.
    pub fn run(&self, url: &str, options: &PipelineOptions<'_>) -> Result<Novel, PipelineError> {
        tracing::debug!(phase = %Phase::Resolving, url, "Pipeline phase");
        let novel_url = parse_novel_url(url)?;
        let strategy = self.registry.resolve(&novel_url).ok_or_else(|| {
            PipelineError::UnsupportedSite {
                url: novel_url.to_string(),
                host: novel_url.host_str().unwrap_or_default().to_string(),
            }
        })?;

        tracing::debug!(phase = %Phase::FetchingInfo, url = %novel_url, "Pipeline phase");
        let doc = self
            .fetcher
            .fetch(&novel_url)
            .map_err(|source| PipelineError::Fetch {
                phase: Phase::FetchingInfo,
                source,
            })?;
        let title = strategy.extract_title(&doc);
        let author = strategy.extract_author(&doc);
        let cover_url = strategy.extract_cover_url(&doc);
        tracing::info!(title = %title, author = %author, "Read novel info");

        tracing::debug!(phase = %Phase::EnumeratingChapters, url = %novel_url, "Pipeline phase");
        let links = self.list_chapters(strategy.as_ref(), &doc)?;
        drop(doc);
        if links.is_empty() {
            return Err(PipelineError::NoChapters {
                url: novel_url.to_string(),
            });
        }
        tracing::info!(title = %title, chapters = links.len(), "Found chapters");

        tracing::debug!(phase = %Phase::FetchingChapterBodies, url = %novel_url, "Pipeline phase");
        let results = self.fetch_bodies(strategy.as_ref(), &links, options)?;
        let chapters = combine(&novel_url, links, results)?;

        tracing::debug!(phase = %Phase::Done, url = %novel_url, "Pipeline phase");
        Ok(Novel {
            title,
            author,
            cover_url,
            source_url: novel_url.to_string(),
            chapters,
        })
    }

    fn list_chapters(
        &self,
        strategy: &dyn Strategy,
        doc: &Document,
    ) -> Result<Vec<ChapterLink>, PipelineError> {
        strategy
            .list_chapters(doc, self.fetcher)
            .map_err(|source| PipelineError::Fetch {
                phase: Phase::EnumeratingChapters,
                source,
            })
    }

    /// One result per link, in link order regardless of completion order.
    fn fetch_bodies(
        &self,
        strategy: &dyn Strategy,
        links: &[ChapterLink],
        options: &PipelineOptions<'_>,
    ) -> Result<Vec<Result<String, ChapterError>>, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers.max(1))
            .thread_name(|i| format!("chapter-worker-{}", i))
            .build()?;
        let total = links.len();
        let done = AtomicUsize::new(0);
        let fetcher = self.fetcher;
        let results = pool.install(|| {
            links
                .par_iter()
                .map(|link| {
                    if options.cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                        return Err(ChapterError::Cancelled);
                    }
                    let result = fetch_body(fetcher, strategy, link, &options.retry);
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(progress) = options.progress {
                        progress(n, total);
                    }
                    result
                })
                .collect::<Vec<_>>()
        });
        Ok(results)
    }
}

fn parse_novel_url(input: &str) -> Result<Url, PipelineError> {
    let input = input.trim();
    let url = Url::parse(input).map_err(|e| PipelineError::InvalidUrl {
        input: input.to_string(),
        reason: e.to_string(),
    })?;
    if url.host_str().is_none() || !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::InvalidUrl {
            input: input.to_string(),
            reason: "expected an http(s) URL with a host".to_string(),
        });
    }
    Ok(url)
}

fn fetch_body(
    fetcher: &dyn Fetcher,
    strategy: &dyn Strategy,
    link: &ChapterLink,
    retry: &RetryPolicy,
) -> Result<String, ChapterError> {
    let url = Url::parse(&link.url).map_err(|_| ChapterError::InvalidUrl(link.url.clone()))?;
    let doc = fetch_with_retry(fetcher, &url, retry)?;
    strategy
        .extract_body(&doc)
        .filter(|body| !body.trim().is_empty())
        .ok_or(ChapterError::EmptyBody)
}

fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    url: &Url,
    retry: &RetryPolicy,
) -> Result<Document, FetchError> {
    let attempts = retry.attempts.max(1) as usize;
    let mut attempt = 0;
    loop {
        match fetcher.fetch(url) {
            Ok(doc) => return Ok(doc),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let wait = retry.delay_after(attempt);
                tracing::debug!(%url, attempt = attempt + 1, error = %e, ?wait, "Retrying chapter");
                std::thread::sleep(wait);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Pair links with their results in listing order, substituting the placeholder for failures.
fn combine(
    novel_url: &Url,
    links: Vec<ChapterLink>,
    results: Vec<Result<String, ChapterError>>,
) -> Result<Vec<Chapter>, PipelineError> {
    let total = links.len();
    if results
        .iter()
        .any(|r| matches!(r, Err(ChapterError::Cancelled)))
    {
        let completed = results
            .iter()
            .filter(|r| !matches!(r, Err(ChapterError::Cancelled)))
            .count();
        return Err(PipelineError::Cancelled {
            url: novel_url.to_string(),
            completed,
        });
    }

    let mut failed = 0;
    let mut chapters = Vec::with_capacity(total);
    for (i, (link, result)) in links.into_iter().zip(results).enumerate() {
        let number = i as u32 + 1;
        let mut chapter = Chapter::new(number, link);
        match result {
            Ok(body) => chapter.body = Some(body),
            Err(e) => {
                failed += 1;
                tracing::warn!(
                    chapter = number,
                    url = %chapter.source_url,
                    error = %e,
                    "Chapter unavailable; using placeholder"
                );
                chapter.body = Some(PLACEHOLDER_BODY.to_string());
            }
        }
        chapters.push(chapter);
    }

    if failed == total {
        return Err(PipelineError::NoChaptersRetrieved {
            url: novel_url.to_string(),
            total,
        });
    }
    if failed > 0 {
        tracing::warn!(failed, total, "Some chapters could not be downloaded");
    }
    Ok(chapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::{StaticFetcher, StrategyDescriptor};
    use std::sync::Mutex;

    /// Test strategy: chapters are `li a` links, body is `div.text`.
    struct ListStrategy {
        url: Url,
    }

    impl Strategy for ListStrategy {
        fn novel_url(&self) -> &Url {
            &self.url
        }

        fn find_author(&self, doc: &Document) -> Option<String> {
            doc.text_of(".author")
        }

        fn list_chapters(
            &self,
            doc: &Document,
            _fetcher: &dyn Fetcher,
        ) -> Result<Vec<ChapterLink>, FetchError> {
            Ok(doc
                .select_all("li a")
                .into_iter()
                .filter_map(|a| {
                    Some(ChapterLink {
                        title: crate::scraper::element_text(&a)?,
                        url: doc.absolute_url(a.value().attr("href")?)?,
                    })
                })
                .collect())
        }

        fn extract_body(&self, doc: &Document) -> Option<String> {
            let root = doc.select_first("div.text")?;
            Some(crate::scraper::clean_html(root, &[], doc.url()))
        }
    }

    fn build(url: Url) -> Box<dyn Strategy> {
        Box::new(ListStrategy { url })
    }

    const LIST: StrategyDescriptor = StrategyDescriptor {
        name: "list",
        base_urls: &["https://novels.test/"],
        build,
    };

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register(LIST).unwrap();
        r
    }

    fn landing(chapters: usize) -> String {
        let items: String = (1..=chapters)
            .map(|i| format!(r#"<li><a href="/c/{i}">Chapter {i}</a></li>"#))
            .collect();
        format!(
            r#"<html><head><title>Test Novel</title></head><body>
<span class="author">Writer</span><ul>{items}</ul></body></html>"#
        )
    }

    fn chapter_page(i: usize) -> String {
        format!(r#"<html><body><div class="text"><p>Body {i}</p></div></body></html>"#)
    }

    fn fast<'a>() -> PipelineOptions<'a> {
        PipelineOptions {
            workers: 3,
            retry: RetryPolicy::none(),
            ..Default::default()
        }
    }

    #[test]
    fn run_builds_novel_in_listing_order() -> Result<(), PipelineError> {
        let mut fetcher =
            StaticFetcher::new().with_page("https://novels.test/n/1", landing(12));
        for i in 1..=12 {
            fetcher = fetcher.with_page(&format!("https://novels.test/c/{i}"), chapter_page(i));
        }
        let r = registry();
        let novel = Pipeline::new(&r, &fetcher).run("https://novels.test/n/1", &fast())?;
        assert_eq!(novel.title, "Test Novel");
        assert_eq!(novel.author, "Writer");
        assert_eq!(novel.chapters.len(), 12);
        for (i, ch) in novel.chapters.iter().enumerate() {
            assert_eq!(ch.number as usize, i + 1);
            assert_eq!(ch.title, format!("Chapter {}", i + 1));
            assert_eq!(ch.body.as_deref(), Some(format!("<p>Body {}</p>", i + 1).as_str()));
        }
        Ok(())
    }

    /// Delays chapter `/c/{i}` by `(slowest - i)` x 40 ms so early chapters finish last.
    struct SlowEarlyChapters {
        inner: StaticFetcher,
        slowest: u64,
        finished: Mutex<Vec<String>>,
    }

    impl Fetcher for SlowEarlyChapters {
        fn get(&self, url: &Url) -> Result<crate::scraper::Page, FetchError> {
            let index = url
                .path()
                .strip_prefix("/c/")
                .and_then(|n| n.parse::<u64>().ok());
            if let Some(i) = index {
                let wait = self.slowest.saturating_sub(i) * 40;
                std::thread::sleep(Duration::from_millis(wait));
            }
            let page = self.inner.get(url);
            if index.is_some() {
                self.finished.lock().unwrap().push(url.path().to_string());
            }
            page
        }

        fn post_form(
            &self,
            url: &Url,
            form: &[(&str, &str)],
        ) -> Result<crate::scraper::Page, FetchError> {
            self.inner.post_form(url, form)
        }
    }

    #[test]
    fn out_of_order_completion_keeps_listing_order() -> Result<(), PipelineError> {
        let mut inner = StaticFetcher::new().with_page("https://novels.test/n/1", landing(6));
        for i in 1..=6 {
            inner = inner.with_page(&format!("https://novels.test/c/{i}"), chapter_page(i));
        }
        let fetcher = SlowEarlyChapters {
            inner,
            slowest: 6,
            finished: Mutex::new(Vec::new()),
        };
        let options = PipelineOptions {
            workers: 6,
            ..fast()
        };
        let r = registry();
        let novel = Pipeline::new(&r, &fetcher).run("https://novels.test/n/1", &options)?;

        let finished = fetcher.finished.lock().unwrap().clone();
        assert_eq!(finished.len(), 6);
        assert_ne!(finished.first().map(String::as_str), Some("/c/1"));

        let bodies: Vec<_> = novel
            .chapters
            .iter()
            .map(|c| c.body.clone().unwrap_or_default())
            .collect();
        let expected: Vec<_> = (1..=6).map(|i| format!("<p>Body {i}</p>")).collect();
        assert_eq!(bodies, expected);
        let numbers: Vec<_> = novel.chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, [1, 2, 3, 4, 5, 6]);
        Ok(())
    }

    #[test]
    fn unsupported_site_is_reported() {
        let fetcher = StaticFetcher::new();
        let r = registry();
        let err = Pipeline::new(&r, &fetcher)
            .run("https://elsewhere.test/n/1", &fast())
            .unwrap_err();
        assert!(err.is_unsupported());
        assert!(fetcher.requests().is_empty());
    }

    #[test]
    fn invalid_url_is_reported() {
        let fetcher = StaticFetcher::new();
        let r = registry();
        for input in ["not a url", "mailto:x@novels.test", "file:///tmp/x"] {
            let err = Pipeline::new(&r, &fetcher).run(input, &fast()).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidUrl { .. }), "{input}");
        }
    }

    #[test]
    fn empty_listing_fails_with_no_chapters() {
        let fetcher = StaticFetcher::new().with_page("https://novels.test/n/1", landing(0));
        let r = registry();
        let err = Pipeline::new(&r, &fetcher)
            .run("https://novels.test/n/1", &fast())
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoChapters { .. }));
    }

    #[test]
    fn failed_chapter_gets_placeholder() -> Result<(), PipelineError> {
        let fetcher = StaticFetcher::new()
            .with_page("https://novels.test/n/1", landing(3))
            .with_page("https://novels.test/c/1", chapter_page(1))
            .with_status("https://novels.test/c/2", 500)
            .with_page("https://novels.test/c/3", "<html><body>no container</body></html>");
        let r = registry();
        let novel = Pipeline::new(&r, &fetcher).run("https://novels.test/n/1", &fast())?;
        assert_eq!(novel.chapters.len(), 3);
        assert_eq!(novel.chapters[0].body.as_deref(), Some("<p>Body 1</p>"));
        assert_eq!(novel.chapters[1].body.as_deref(), Some(PLACEHOLDER_BODY));
        assert_eq!(novel.chapters[1].title, "Chapter 2");
        assert_eq!(novel.chapters[2].body.as_deref(), Some(PLACEHOLDER_BODY));
        Ok(())
    }

    #[test]
    fn all_chapters_failing_is_terminal() {
        let fetcher = StaticFetcher::new().with_page("https://novels.test/n/1", landing(2));
        let r = registry();
        let err = Pipeline::new(&r, &fetcher)
            .run("https://novels.test/n/1", &fast())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NoChaptersRetrieved { total: 2, .. }
        ));
    }

    #[test]
    fn landing_page_failure_is_fatal() {
        let fetcher = StaticFetcher::new().with_status("https://novels.test/n/1", 403);
        let r = registry();
        let err = Pipeline::new(&r, &fetcher)
            .run("https://novels.test/n/1", &fast())
            .unwrap_err();
        assert_eq!(err.phase(), Phase::FetchingInfo);
    }

    #[test]
    fn retryable_failures_are_retried() {
        let fetcher = StaticFetcher::new().with_status("https://novels.test/c/1", 503);
        let retry = RetryPolicy {
            attempts: 3,
            backoff: vec![Duration::ZERO],
        };
        let url = Url::parse("https://novels.test/c/1").unwrap();
        assert!(fetch_with_retry(&fetcher, &url, &retry).is_err());
        assert_eq!(fetcher.requests().len(), 3);

        let fetcher = StaticFetcher::new().with_status("https://novels.test/c/1", 404);
        assert!(fetch_with_retry(&fetcher, &url, &retry).is_err());
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn progress_reports_every_chapter() -> Result<(), PipelineError> {
        let mut fetcher = StaticFetcher::new().with_page("https://novels.test/n/1", landing(5));
        for i in 1..=5 {
            fetcher = fetcher.with_page(&format!("https://novels.test/c/{i}"), chapter_page(i));
        }
        let seen = Mutex::new(Vec::new());
        let progress = |done: usize, total: usize| {
            seen.lock().unwrap().push((done, total));
        };
        let options = PipelineOptions {
            progress: Some(&progress),
            ..fast()
        };
        let r = registry();
        Pipeline::new(&r, &fetcher).run("https://novels.test/n/1", &options)?;
        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, (1..=5).map(|n| (n, 5)).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn cancelled_run_stops_scheduling() {
        let fetcher = StaticFetcher::new().with_page("https://novels.test/n/1", landing(4));
        let cancel = AtomicBool::new(true);
        let options = PipelineOptions {
            cancel: Some(&cancel),
            ..fast()
        };
        let r = registry();
        let err = Pipeline::new(&r, &fetcher)
            .run("https://novels.test/n/1", &options)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { completed: 0, .. }));
        assert_eq!(fetcher.requests(), vec!["https://novels.test/n/1"]);
    }

    #[test]
    fn retry_delay_reuses_last_backoff() {
        let retry = RetryPolicy {
            attempts: 5,
            backoff: vec![Duration::from_secs(1), Duration::from_secs(2)],
        };
        assert_eq!(retry.delay_after(0), Duration::from_secs(1));
        assert_eq!(retry.delay_after(1), Duration::from_secs(2));
        assert_eq!(retry.delay_after(3), Duration::from_secs(2));
        assert_eq!(RetryPolicy::none().delay_after(0), Duration::ZERO);
    }
}
