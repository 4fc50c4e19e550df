//! Seeking Alpha earnings call transcripts.
//!
//! Transcripts are listed through the site's JSON feed API and read from the
//! article page. Both need the `seekingalpha_cookie` session; the site answers
//! 401 to anonymous API calls and a "Before we continue..." bot check page
//! (403) when it wants a human.

use super::{SiteScraper, auth_gate};
use crate::errors::ScrapeError;
use crate::fetch::HttpClient;
use crate::models::{Article, KIND_ARTICLE};
use crate::sanitize::Sanitizer;
use crate::utils::current_time_string;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

const FEED_URL: &str = "https://seekingalpha.com/api/v3/feed?all[]=sa-transcripts&page[size]=20";
const BASE_URL: &str = "https://seekingalpha.com";
const PER_RUN: usize = 5;

const CHALLENGE_MARKER: &str = "Before we continue...";
/// Pages showing this are the paywalled "latest transcripts" teaser.
const TEASER_MARKER: &str = "Review the latest";

const DETAIL: Sanitizer = Sanitizer::new("div[data-test-id='content-container']", "script, style");

#[derive(Debug, Deserialize)]
struct FeedPage {
    #[serde(default)]
    data: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(default)]
    id: Value,
    #[serde(rename = "type", default)]
    item_type: Value,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Attributes {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(rename = "self", default)]
    self_link: String,
}

pub struct SeekingAlpha;

impl SiteScraper for SeekingAlpha {
    const NAME: &'static str = "seekingalpha";
    const CAP: usize = 10;
    const SESSION: Option<&'static str> = Some("seekingalpha_cookie");

    #[instrument(level = "info", skip_all)]
    async fn listing(&self, http: &HttpClient) -> Result<Vec<Article>, ScrapeError> {
        let page = auth_gate(http.get_json::<FeedPage>(FEED_URL).await, Self::NAME)?;
        info!(count = page.data.len(), "Fetched Seeking Alpha transcripts");
        Ok(to_articles(page))
    }

    #[instrument(level = "info", skip_all, fields(link = %article.link))]
    async fn detail(&self, http: &HttpClient, article: &Article) -> Result<Option<String>, ScrapeError> {
        let html = auth_gate(http.get_html(&article.link).await, Self::NAME)?;
        read_detail(&html)
    }
}

fn read_detail(html: &str) -> Result<Option<String>, ScrapeError> {
    if html.contains(CHALLENGE_MARKER) {
        return Err(ScrapeError::VerificationRequired {
            site: SeekingAlpha::NAME,
        });
    }
    if html.contains(TEASER_MARKER) {
        info!("Transcript page is a teaser; skipping");
        return Ok(None);
    }
    Ok(DETAIL.apply(html))
}

fn to_articles(page: FeedPage) -> Vec<Article> {
    page.data
        .into_iter()
        .take(PER_RUN)
        .filter(|item| !item.links.self_link.is_empty())
        .map(|item| {
            let mut article = Article::new(
                SeekingAlpha::NAME,
                item.attributes.title.trim(),
                format!("{BASE_URL}{}", item.links.self_link),
                current_time_string(),
                KIND_ARTICLE,
                "en",
            );
            article.id = (!item.id.is_null()).then_some(item.id);
            article.post_type = Some(item.item_type);
            article
        })
        .collect()
}
