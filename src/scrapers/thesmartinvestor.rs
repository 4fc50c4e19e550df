//! The Smart Investor (Singapore) front page.

use super::{SiteScraper, element_text, selector};
use crate::errors::ScrapeError;
use crate::fetch::HttpClient;
use crate::models::{Article, KIND_ARTICLE};
use crate::sanitize::Sanitizer;
use crate::utils::current_time_string;
use scraper::Html;
use tracing::{debug, info, instrument};

const LIST_URL: &str = "https://thesmartinvestor.com.sg/";
const PER_RUN: usize = 2;

const DETAIL: Sanitizer = Sanitizer::new(".post-content", "script, style, iframe");

pub struct TheSmartInvestor;

impl SiteScraper for TheSmartInvestor {
    const NAME: &'static str = "thesmartinvestor";

    #[instrument(level = "info", skip_all)]
    async fn listing(&self, http: &HttpClient) -> Result<Vec<Article>, ScrapeError> {
        let html = http.get_html(LIST_URL).await?;
        let articles = parse_listing(&html)?;
        info!(count = articles.len(), "Found Smart Investor articles");
        Ok(articles)
    }

    #[instrument(level = "info", skip_all, fields(link = %article.link))]
    async fn detail(&self, http: &HttpClient, article: &Article) -> Result<Option<String>, ScrapeError> {
        let html = http.get_html(&article.link).await?;
        Ok(DETAIL.apply(&html))
    }
}

fn parse_listing(html: &str) -> Result<Vec<Article>, ScrapeError> {
    let items = selector(LIST_URL, ".loop-list > article")?;
    let title_link = selector(LIST_URL, ".post-title > a")?;
    let thumbnail = selector(LIST_URL, ".media > a > img")?;
    let document = Html::parse_document(html);

    let articles = document
        .select(&items)
        .take(PER_RUN)
        .filter_map(|item| {
            let anchor = item.select(&title_link).next()?;
            let Some(link) = anchor.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
                debug!("Post without a title link");
                return None;
            };
            let mut article = Article::new(
                TheSmartInvestor::NAME,
                element_text(&anchor),
                link,
                current_time_string(),
                KIND_ARTICLE,
                "en",
            );
            article.image = item
                .select(&thumbnail)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(|src| src.trim().to_string())
                .filter(|src| !src.is_empty());
            Some(article)
        })
        .collect();
    Ok(articles)
}
