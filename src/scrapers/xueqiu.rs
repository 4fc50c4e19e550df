//! Xueqiu (雪球) original posts from the followed timeline.
//!
//! The home timeline is only served to a logged-in session, so this source
//! needs the `xueqiu_cookie` storage state. A logged-out session gets a 400
//! with an error code instead of the timeline.

use super::{SiteScraper, auth_gate};
use crate::errors::ScrapeError;
use crate::fetch::HttpClient;
use crate::models::{Article, KIND_ARTICLE};
use crate::sanitize::Sanitizer;
use crate::utils::{current_time_string, epoch_from_value, epoch_to_local, truncate_chars};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

const TIMELINE_URL: &str =
    "https://xueqiu.com/v4/statuses/home_timeline.json?source=user&sub_type=original";
const BASE_URL: &str = "https://xueqiu.com";
const PER_RUN: usize = 10;
const FALLBACK_TITLE_CHARS: usize = 40;

const DETAIL: Sanitizer = Sanitizer::new(".article__bd__detail", "script, style").drop_hidden();

#[derive(Debug, Deserialize)]
struct Timeline {
    #[serde(default)]
    home_timeline: Vec<Status>,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    user_id: Value,
    #[serde(default)]
    title: String,
    /// Plain-text excerpt, used when a post has no title.
    #[serde(default)]
    description: String,
    #[serde(default)]
    cover_pic: Option<String>,
    #[serde(rename = "type", default)]
    post_type: Value,
    /// Milliseconds since the epoch.
    #[serde(default)]
    created_at: Value,
    target: String,
}

pub struct Xueqiu;

impl SiteScraper for Xueqiu {
    const NAME: &'static str = "xueqiu";
    const SESSION: Option<&'static str> = Some("xueqiu_cookie");

    #[instrument(level = "info", skip_all)]
    async fn listing(&self, http: &HttpClient) -> Result<Vec<Article>, ScrapeError> {
        let timeline = match http.get_json::<Timeline>(TIMELINE_URL).await {
            Err(ScrapeError::Status { status: 400, .. }) => {
                return Err(ScrapeError::LoginRequired { site: Self::NAME });
            }
            other => auth_gate(other, Self::NAME)?,
        };
        info!(count = timeline.home_timeline.len(), "Fetched Xueqiu original posts");
        Ok(to_articles(timeline))
    }

    #[instrument(level = "info", skip_all, fields(link = %article.link))]
    async fn detail(&self, http: &HttpClient, article: &Article) -> Result<Option<String>, ScrapeError> {
        let html = http.get_html(&article.link).await?;
        Ok(DETAIL.apply(&html))
    }
}

fn to_articles(timeline: Timeline) -> Vec<Article> {
    timeline
        .home_timeline
        .into_iter()
        .take(PER_RUN)
        .map(|status| {
            let pub_date = epoch_from_value(&status.created_at)
                .and_then(|ms| epoch_to_local(ms / 1000.0))
                .unwrap_or_else(current_time_string);
            let title = if status.title.trim().is_empty() {
                truncate_chars(status.description.trim(), FALLBACK_TITLE_CHARS).to_string()
            } else {
                status.title.trim().to_string()
            };
            let mut article = Article::new(
                Xueqiu::NAME,
                title,
                format!("{BASE_URL}{}", status.target),
                pub_date,
                KIND_ARTICLE,
                "zh-CN",
            );
            article.id = Some(status.id);
            article.user_id = Some(status.user_id);
            article.post_type = Some(status.post_type);
            article.image = status.cover_pic.filter(|p| !p.is_empty());
            article
        })
        .collect()
}
