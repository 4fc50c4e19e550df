//! AInvest news articles.

use super::{SiteScraper, absolute, element_text, selector};
use crate::errors::ScrapeError;
use crate::fetch::HttpClient;
use crate::models::{Article, KIND_ARTICLE};
use crate::sanitize::Sanitizer;
use crate::utils::current_time_string;
use scraper::Html;
use tracing::{debug, info, instrument};

const LIST_URL: &str = "https://www.ainvest.com/news/articles/";
const BASE_URL: &str = "https://www.ainvest.com";
const PER_RUN: usize = 5;

const DETAIL: Sanitizer = Sanitizer::new(".news-content", "script, style, visualization");

pub struct AInvest;

impl SiteScraper for AInvest {
    const NAME: &'static str = "ainvest";

    #[instrument(level = "info", skip_all)]
    async fn listing(&self, http: &HttpClient) -> Result<Vec<Article>, ScrapeError> {
        let html = http.get_html(LIST_URL).await?;
        let articles = parse_listing(&html)?;
        info!(count = articles.len(), "Found AInvest articles");
        Ok(articles)
    }

    #[instrument(level = "info", skip_all, fields(link = %article.link))]
    async fn detail(&self, http: &HttpClient, article: &Article) -> Result<Option<String>, ScrapeError> {
        let html = http.get_html(&article.link).await?;
        Ok(DETAIL.apply(&html))
    }
}

fn parse_listing(html: &str) -> Result<Vec<Article>, ScrapeError> {
    let items = selector(LIST_URL, "#news-articles .grid a")?;
    let heading = selector(LIST_URL, "h3")?;
    let document = Html::parse_document(html);

    let articles = document
        .select(&items)
        .take(PER_RUN)
        .filter_map(|item| {
            let Some(link) = item.value().attr("href").and_then(|h| absolute(BASE_URL, h)) else {
                debug!("Listing entry without href");
                return None;
            };
            let title = item
                .select(&heading)
                .next()
                .map(|h| element_text(&h))
                .unwrap_or_default();
            Some(Article::new(
                AInvest::NAME,
                title,
                link,
                current_time_string(),
                KIND_ARTICLE,
                "en",
            ))
        })
        .collect();
    Ok(articles)
}
