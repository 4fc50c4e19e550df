//! The Edge Malaysia, corporate category.
//!
//! Story cards link to `/node/<id>`; the headline sits in a nested
//! `.row > .col-12 > span`.

use super::{SiteScraper, absolute, element_text, selector};
use crate::errors::ScrapeError;
use crate::fetch::HttpClient;
use crate::models::{Article, KIND_ARTICLE};
use crate::sanitize::Sanitizer;
use crate::utils::current_time_string;
use scraper::Html;
use tracing::{info, instrument};

const LIST_URL: &str = "https://theedgemalaysia.com/categories/corporate";
const BASE_URL: &str = "https://theedgemalaysia.com";
const PER_RUN: usize = 2;

const DETAIL: Sanitizer = Sanitizer::new(
    "div[class*=news-detail_newsTextDataWrap]",
    "script, style, iframe, .sharethis-inline-share-buttons, .insert_ads, [class*=tisg-], \
     .post-share, .instagram-media, .navigation",
)
.cut_after("Read also");

pub struct TheEdgeMalaysia;

impl SiteScraper for TheEdgeMalaysia {
    const NAME: &'static str = "theedgemalaysia";

    #[instrument(level = "info", skip_all)]
    async fn listing(&self, http: &HttpClient) -> Result<Vec<Article>, ScrapeError> {
        let html = http.get_html(LIST_URL).await?;
        let articles = parse_listing(&html)?;
        info!(count = articles.len(), "Found Edge Malaysia stories");
        Ok(articles)
    }

    #[instrument(level = "info", skip_all, fields(link = %article.link))]
    async fn detail(&self, http: &HttpClient, article: &Article) -> Result<Option<String>, ScrapeError> {
        let html = http.get_html(&article.link).await?;
        Ok(DETAIL.apply(&html))
    }
}

fn parse_listing(html: &str) -> Result<Vec<Article>, ScrapeError> {
    let cards = selector(LIST_URL, "a[href^='/node/']")?;
    let headline = selector(LIST_URL, ".row > .col-12 > span")?;
    let document = Html::parse_document(html);

    let articles = document
        .select(&cards)
        .take(PER_RUN)
        .filter_map(|card| {
            let link = absolute(BASE_URL, card.value().attr("href")?)?;
            let title = card
                .select(&headline)
                .next()
                .map(|s| element_text(&s))
                .unwrap_or_default();
            Some(Article::new(
                TheEdgeMalaysia::NAME,
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
