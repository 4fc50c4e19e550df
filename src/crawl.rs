//! One run of one source: listing, known-link filter, detail fetches, persist.
//!
//! The driver is the same for every site. It owns the feed [`History`], the
//! [`HttpClient`] with the site's session attached, and the login refresh for
//! non-headless runs. Scrapers only know how to read their own pages.

use crate::config::SpiderContext;
use crate::errors::ScrapeError;
use crate::fetch::HttpClient;
use crate::history::History;
use crate::models::Article;
use crate::scrapers::SiteScraper;
use crate::session::StorageSource;
use itertools::Itertools;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Counters for one finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlReport {
    /// Candidates returned by the listing, duplicates included.
    pub listed: usize,
    /// Candidates whose link was already in the feed.
    pub known: usize,
    /// Candidates dropped for an empty title, empty body or a failed detail fetch.
    pub skipped: usize,
    pub inserted: usize,
    /// Whether the feed file was rewritten.
    pub written: bool,
}

#[instrument(level = "info", skip_all, fields(source = S::NAME))]
pub async fn crawl<S: SiteScraper>(site: &S, ctx: &SpiderContext) -> Result<CrawlReport, ScrapeError> {
    let settings = &ctx.settings;
    let mut history = History::load(settings.feed_path(S::NAME), S::CAP).await;
    let mut http = HttpClient::new(settings.request_timeout)?;

    let session = match S::SESSION {
        Some(name) => {
            let source = ctx.sessions.resolve(name).await?;
            http.set_session(ctx.sessions.load(name, &source).await?);
            Some((name, source))
        }
        None => None,
    };

    let listing = match site.listing(&http).await {
        Ok(listing) => listing,
        Err(e) if e.is_auth() => match session {
            Some((name, StorageSource::File(_))) if !settings.headless => {
                refresh_and_list(site, ctx, &mut http, name, e).await?
            }
            _ => return Err(e),
        },
        Err(e) => return Err(e),
    };

    let mut report = CrawlReport {
        listed: listing.len(),
        ..CrawlReport::default()
    };
    info!(count = report.listed, "Listing fetched");

    let mut fetched_any = false;
    for mut article in listing.into_iter().unique_by(|a| a.link.clone()) {
        if history.contains(&article.link) {
            debug!(link = %article.link, "exists link");
            report.known += 1;
            continue;
        }
        if article.title.is_empty() {
            info!(link = %article.link, "Skipping entry without a title");
            report.skipped += 1;
            continue;
        }

        if S::DETAIL_FETCH && fetched_any {
            pause(settings.detail_pause_ms).await;
        }
        fetched_any = true;

        match site.detail(&http, &article).await {
            Ok(Some(body)) if !body.trim().is_empty() => {
                article.description = body;
                history.insert(article);
            }
            Ok(_) => {
                info!(link = %article.link, "No content; skipping");
                report.skipped += 1;
            }
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                warn!(link = %article.link, error = %e, kind = %e.kind(), "Detail fetch failed; skipping");
                report.skipped += 1;
            }
        }
    }

    report.inserted = history.inserted();
    report.written = history.persist().await?;
    info!(
        path = %history.path().display(),
        feed_len = history.articles().len(),
        known = report.known,
        skipped = report.skipped,
        inserted = report.inserted,
        written = report.written,
        "Crawl finished"
    );
    Ok(report)
}

/// Wait for a human to refresh the session file, then retry the listing once.
///
/// On success the storage state is written back to its file.
async fn refresh_and_list<S: SiteScraper>(
    site: &S,
    ctx: &SpiderContext,
    http: &mut HttpClient,
    name: &str,
    cause: ScrapeError,
) -> Result<Vec<Article>, ScrapeError> {
    ctx.sink
        .log_action_error(&format!("{} needs manual login: {cause}", S::NAME), None)
        .await;

    let Some(state) = ctx.sessions.wait_for_refresh(name, ctx.settings.login_wait).await? else {
        return Err(cause);
    };
    http.set_session(state.clone());
    let listing = site.listing(http).await?;
    ctx.sessions.persist(name, &state).await?;
    info!(session = name, "Login refreshed");
    Ok(listing)
}

async fn pause((min_ms, max_ms): (u64, u64)) {
    if max_ms == 0 {
        return;
    }
    let ms = rand::rng().random_range(min_ms.min(max_ms)..=max_ms);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::history::load_feed;
    use crate::models::{KIND_ARTICLE, StorageState};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::fs;

    fn candidate(n: usize, title: &str) -> Article {
        Article::new(
            "fake",
            title,
            format!("https://fake.test/{n}"),
            "2025-05-06 12:00:00",
            KIND_ARTICLE,
            "en",
        )
    }

    fn context(root: &Path, headless: bool) -> SpiderContext {
        let settings = Settings {
            data_dir: root.join("data"),
            auth_dir: root.join("auth"),
            error_log: root.join("tmp/action_errors.log"),
            headless,
            detail_pause_ms: (0, 0),
            login_wait: Duration::from_secs(3),
            ..Settings::default()
        };
        SpiderContext::new("fake", Arc::new(settings))
    }

    /// Serves a fixed listing. Bodies: link ending in `/3` fails, `/4` is
    /// empty, `/9` hits a login wall, everything else gets a paragraph.
    struct Fake {
        listing: Vec<Article>,
        listing_calls: AtomicUsize,
        detail_calls: AtomicUsize,
    }

    impl Fake {
        fn new(listing: Vec<Article>) -> Self {
            Self {
                listing,
                listing_calls: AtomicUsize::new(0),
                detail_calls: AtomicUsize::new(0),
            }
        }

        fn body(&self, article: &Article) -> Result<Option<String>, ScrapeError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            match article.link.rsplit('/').next() {
                Some("3") => Err(ScrapeError::structure(&article.link, "no body")),
                Some("4") => Ok(Some("   ".to_string())),
                Some("9") => Err(ScrapeError::LoginRequired { site: "fake" }),
                _ => Ok(Some(format!("<p>{}</p>", article.title))),
            }
        }
    }

    impl SiteScraper for Fake {
        const NAME: &'static str = "fake";

        async fn listing(&self, _http: &HttpClient) -> Result<Vec<Article>, ScrapeError> {
            self.listing_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.listing.clone())
        }

        async fn detail(&self, _http: &HttpClient, article: &Article) -> Result<Option<String>, ScrapeError> {
            self.body(article)
        }
    }

    /// Needs a session; the first listing attempt is refused.
    struct Gated(Fake);

    impl SiteScraper for Gated {
        const NAME: &'static str = "fake";
        const SESSION: Option<&'static str> = Some("fake_cookie");

        async fn listing(&self, http: &HttpClient) -> Result<Vec<Article>, ScrapeError> {
            if self.0.listing_calls.load(Ordering::SeqCst) == 0 {
                self.0.listing_calls.fetch_add(1, Ordering::SeqCst);
                return Err(ScrapeError::LoginRequired { site: "fake" });
            }
            self.0.listing(http).await
        }

        async fn detail(&self, _http: &HttpClient, article: &Article) -> Result<Option<String>, ScrapeError> {
            self.0.body(article)
        }
    }

    #[tokio::test]
    async fn test_new_items_are_fetched_and_written() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), true);
        let site = Fake::new(vec![candidate(1, "One"), candidate(2, "Two")]);

        let report = crawl(&site, &ctx).await.unwrap();
        assert_eq!(report.inserted, 2);
        assert!(report.written);

        let (stored, _) = load_feed(&ctx.settings.feed_path("fake")).await;
        // listing order one, two: the later insert ends up on top
        assert_eq!(stored[0].title, "Two");
        assert_eq!(stored[0].description, "<p>Two</p>");
        assert_eq!(stored[1].title, "One");
    }

    #[tokio::test]
    async fn test_known_links_skip_detail_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), true);
        let first = Fake::new(vec![candidate(1, "One")]);
        crawl(&first, &ctx).await.unwrap();
        let path = ctx.settings.feed_path("fake");
        let before = fs::read(&path).await.unwrap();

        let again = Fake::new(vec![candidate(1, "One")]);
        let report = crawl(&again, &ctx).await.unwrap();
        assert_eq!(report.known, 1);
        assert_eq!(again.detail_calls.load(Ordering::SeqCst), 0);
        assert!(!report.written);
        assert_eq!(fs::read(&path).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_item_failures_are_isolated() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), true);
        let site = Fake::new(vec![
            candidate(1, "One"),
            candidate(2, ""),
            candidate(3, "Broken"),
            candidate(4, "Blank"),
            candidate(5, "Five"),
            candidate(1, "One again"),
        ]);

        let report = crawl(&site, &ctx).await.unwrap();
        assert_eq!(report.listed, 6);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 3);
        // untitled entry and the duplicate never reach the detail page
        assert_eq!(site.detail_calls.load(Ordering::SeqCst), 4);

        let (stored, links) = load_feed(&ctx.settings.feed_path("fake")).await;
        assert_eq!(stored.len(), 2);
        assert!(links.contains("https://fake.test/5"));
        assert!(!links.contains("https://fake.test/3"));
    }

    #[tokio::test]
    async fn test_login_wall_on_detail_ends_run() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), true);
        let site = Fake::new(vec![candidate(1, "One"), candidate(9, "Walled"), candidate(5, "Five")]);

        let err = crawl(&site, &ctx).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(site.detail_calls.load(Ordering::SeqCst), 2);
        assert!(!ctx.settings.feed_path("fake").exists());
    }

    #[tokio::test]
    async fn test_headless_login_failure_is_returned() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), true);
        let site = Gated(Fake::new(vec![candidate(1, "One")]));

        let err = crawl(&site, &ctx).await.unwrap_err();
        assert!(matches!(err, ScrapeError::LoginRequired { .. }));
        assert_eq!(site.0.listing_calls.load(Ordering::SeqCst), 1);
        // the placeholder session file was created for the human to fill in
        assert!(ctx.sessions.path_for("fake_cookie").exists());
    }

    #[tokio::test]
    async fn test_interactive_login_waits_for_refreshed_session() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), false);
        let site = Gated(Fake::new(vec![candidate(1, "One")]));

        let sessions = ctx.sessions.clone();
        let refresher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1100)).await;
            let state = StorageState::from_cookie_string("token=fresh", "fake.test", true);
            sessions.persist("fake_cookie", &state).await.unwrap();
        });

        let report = crawl(&site, &ctx).await.unwrap();
        refresher.await.unwrap();
        assert_eq!(site.0.listing_calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.inserted, 1);

        let saved = fs::read_to_string(ctx.sessions.path_for("fake_cookie")).await.unwrap();
        assert!(saved.contains("fresh"));
        let log = fs::read_to_string(&ctx.settings.error_log).await.unwrap();
        assert!(log.starts_with("fake needs manual login"));
    }

    /// Bodies come with the listing.
    struct Inline(Fake);

    impl SiteScraper for Inline {
        const NAME: &'static str = "fake";
        const DETAIL_FETCH: bool = false;

        async fn listing(&self, http: &HttpClient) -> Result<Vec<Article>, ScrapeError> {
            self.0.listing(http).await
        }

        async fn detail(&self, _http: &HttpClient, article: &Article) -> Result<Option<String>, ScrapeError> {
            self.0.body(article)
        }
    }

    #[tokio::test]
    async fn test_no_pause_between_inline_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context(tmp.path(), true);
        let mut settings = (*ctx.settings).clone();
        settings.detail_pause_ms = (400, 400);
        ctx.settings = Arc::new(settings);
        let site = Inline(Fake::new((1..=5).map(|n| candidate(n * 10, "Flash")).collect()));

        let started = std::time::Instant::now();
        let report = crawl(&site, &ctx).await.unwrap();
        assert_eq!(report.inserted, 5);
        assert!(started.elapsed() < Duration::from_millis(400), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_pause_honours_zero_range() {
        let started = std::time::Instant::now();
        pause((0, 0)).await;
        pause((5, 5)).await;
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
