//! Site scrapers for the financial news sources.
//!
//! Each scraper follows the same two-phase pattern:
//!
//! 1. **Listing**: fetch the source's index (an XHR/JSON endpoint or an HTML
//!    page) and turn it into [`Article`] candidates without descriptions
//! 2. **Detail**: fetch one candidate's own page and return its sanitized body
//!
//! Everything around those two phases (history, sessions, deduplication,
//! persistence) lives in [`crate::crawl`].
//!
//! # Supported Sources
//!
//! | Source | Module | Listing | Session | Cap |
//! |--------|--------|---------|---------|-----|
//! | STCN live | [`stcn`] | XHR JSON, content inline | – | 20 |
//! | Xueqiu | [`xueqiu`] | Home timeline JSON | `xueqiu_cookie` | 20 |
//! | Seeking Alpha | [`seekingalpha`] | Transcript feed JSON | `seekingalpha_cookie` | 10 |
//! | AInvest | [`ainvest`] | HTML | – | 20 |
//! | The Smart Investor | [`thesmartinvestor`] | HTML | – | 20 |
//! | The Edge Malaysia | [`theedgemalaysia`] | HTML | – | 20 |
//! | Dollars and Sense | [`dollarsandsense`] | HTML | `dollarsandsense` | 20 |

use crate::config::SpiderContext;
use crate::crawl::{CrawlReport, crawl};
use crate::errors::ScrapeError;
use crate::fetch::HttpClient;
use crate::history::DEFAULT_CAP;
use crate::models::Article;
use clap::ValueEnum;
use scraper::{ElementRef, Selector};
use std::future::Future;
use std::time::Duration;
use url::Url;

pub mod ainvest;
pub mod dollarsandsense;
pub mod seekingalpha;
pub mod stcn;
pub mod theedgemalaysia;
pub mod thesmartinvestor;
pub mod xueqiu;

/// One news source: how to list it and how to read a single entry.
pub trait SiteScraper: Sync {
    /// Identifier stored in `source` and used for the feed directory.
    const NAME: &'static str;
    /// Maximum feed length.
    const CAP: usize = DEFAULT_CAP;
    /// Storage state needed to read the source, if any.
    const SESSION: Option<&'static str> = None;
    /// Whether [`detail`](Self::detail) goes to the network. Sources whose
    /// listing already carries the body get no pause between entries.
    const DETAIL_FETCH: bool = true;

    /// Fetch the index and return candidates, newest first as the site lists them.
    fn listing(
        &self,
        http: &HttpClient,
    ) -> impl Future<Output = Result<Vec<Article>, ScrapeError>> + Send;

    /// Fetch the body of `article`. `Ok(None)` means "skip this one".
    fn detail(
        &self,
        http: &HttpClient,
        article: &Article,
    ) -> impl Future<Output = Result<Option<String>, ScrapeError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    Stcn,
    Xueqiu,
    Seekingalpha,
    Ainvest,
    Thesmartinvestor,
    Theedgemalaysia,
    Dollarsandsense,
}

impl Source {
    pub const ALL: [Source; 7] = [
        Source::Stcn,
        Source::Xueqiu,
        Source::Seekingalpha,
        Source::Ainvest,
        Source::Thesmartinvestor,
        Source::Theedgemalaysia,
        Source::Dollarsandsense,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Source::Stcn => stcn::Stcn::NAME,
            Source::Xueqiu => xueqiu::Xueqiu::NAME,
            Source::Seekingalpha => seekingalpha::SeekingAlpha::NAME,
            Source::Ainvest => ainvest::AInvest::NAME,
            Source::Thesmartinvestor => thesmartinvestor::TheSmartInvestor::NAME,
            Source::Theedgemalaysia => theedgemalaysia::TheEdgeMalaysia::NAME,
            Source::Dollarsandsense => dollarsandsense::DollarsAndSense::NAME,
        }
    }

    /// Wall-clock budget for one run of this source.
    pub fn timeout(self) -> Duration {
        match self {
            Source::Stcn | Source::Ainvest => Duration::from_secs(50),
            _ => Duration::from_secs(120),
        }
    }

    pub async fn crawl(self, ctx: &SpiderContext) -> Result<CrawlReport, ScrapeError> {
        match self {
            Source::Stcn => crawl(&stcn::Stcn, ctx).await,
            Source::Xueqiu => crawl(&xueqiu::Xueqiu, ctx).await,
            Source::Seekingalpha => crawl(&seekingalpha::SeekingAlpha, ctx).await,
            Source::Ainvest => crawl(&ainvest::AInvest, ctx).await,
            Source::Thesmartinvestor => crawl(&thesmartinvestor::TheSmartInvestor, ctx).await,
            Source::Theedgemalaysia => crawl(&theedgemalaysia::TheEdgeMalaysia, ctx).await,
            Source::Dollarsandsense => crawl(&dollarsandsense::DollarsAndSense, ctx).await,
        }
    }
}

/// Parse a selector, reporting failures against `url`.
pub(crate) fn selector(url: &str, s: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(s).map_err(|e| ScrapeError::structure(url, format!("selector {s}: {e}")))
}

/// Resolve `href` against `base` into an absolute URL.
pub(crate) fn absolute(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

/// Whitespace-normalised text content of an element.
pub(crate) fn element_text(e: &ElementRef<'_>) -> String {
    e.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// Map the statuses sites use for "not logged in" / "bot check" onto auth errors.
pub(crate) fn auth_gate<T>(
    res: Result<T, ScrapeError>,
    site: &'static str,
) -> Result<T, ScrapeError> {
    match res {
        Err(ScrapeError::Status { status: 401, .. }) => Err(ScrapeError::LoginRequired { site }),
        Err(ScrapeError::Status { status: 403, .. }) => {
            Err(ScrapeError::VerificationRequired { site })
        }
        other => other,
    }
}
