//! STCN (证券时报) live flashes.
//!
//! The flash list page loads its entries through an XHR endpoint that
//! returns JSON when asked with `X-Requested-With`. Each entry already
//! carries its full text, so there is no detail fetch.

use super::SiteScraper;
use crate::errors::ScrapeError;
use crate::fetch::HttpClient;
use crate::models::{Article, KIND_FLASH};
use crate::utils::{current_time_string, epoch_from_value, epoch_to_local};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

const LIST_URL: &str = "https://www.stcn.com/article/list.html?type=kx";
const BASE_URL: &str = "https://www.stcn.com";
const PER_RUN: usize = 10;

#[derive(Debug, Deserialize)]
struct FlashList {
    #[serde(default)]
    data: Vec<Flash>,
}

#[derive(Debug, Deserialize)]
struct Flash {
    #[serde(default)]
    id: Value,
    title: String,
    url: String,
    #[serde(default)]
    show_time: Value,
    #[serde(default)]
    content: String,
}

pub struct Stcn;

impl SiteScraper for Stcn {
    const NAME: &'static str = "stcn";
    const DETAIL_FETCH: bool = false;

    #[instrument(level = "info", skip_all)]
    async fn listing(&self, http: &HttpClient) -> Result<Vec<Article>, ScrapeError> {
        let list: FlashList = http.get_xhr_json(LIST_URL).await?;
        info!(count = list.data.len(), "Fetched STCN flashes");
        Ok(to_articles(list))
    }

    async fn detail(&self, _http: &HttpClient, article: &Article) -> Result<Option<String>, ScrapeError> {
        Ok(Some(article.description.clone()))
    }
}

fn to_articles(list: FlashList) -> Vec<Article> {
    list.data
        .into_iter()
        .take(PER_RUN)
        .map(|flash| {
            let pub_date = epoch_from_value(&flash.show_time)
                .and_then(epoch_to_local)
                .unwrap_or_else(current_time_string);
            let mut article = Article::new(
                Stcn::NAME,
                flash.title.trim(),
                format!("{BASE_URL}{}", flash.url),
                pub_date,
                KIND_FLASH,
                "zh-CN",
            );
            article.id = (!flash.id.is_null()).then_some(flash.id);
            article.description = flash.content.trim().to_string();
            article
        })
        .collect()
}
