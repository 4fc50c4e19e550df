//! HTTP access for the site scrapers.
//!
//! [`HttpClient`] sends browser-like headers and, when a session is attached,
//! the storage-state cookies that apply to each request URL.

use crate::errors::ScrapeError;
use crate::models::StorageState;
use crate::utils::truncate_for_log;
use chrono::Utc;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    session: Option<StorageState>,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9,zh-CN;q=0.8"),
        );
        headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
        headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"macOS\""));
        headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ScrapeError::Fetch {
                url: String::new(),
                source: e,
            })?;
        Ok(Self {
            client,
            session: None,
        })
    }

    /// Attach (or replace) the storage state used for cookies.
    pub fn set_session(&mut self, state: StorageState) {
        self.session = Some(state);
    }

    fn request(&self, url: &str) -> Result<RequestBuilder, ScrapeError> {
        let parsed = Url::parse(url).map_err(|e| ScrapeError::structure(url, format!("bad url: {e}")))?;
        let mut req = self.client.get(parsed.clone());
        if let Some(cookie) = self
            .session
            .as_ref()
            .and_then(|s| s.cookie_header(&parsed, Utc::now()))
        {
            req = req.header(header::COOKIE, cookie);
        }
        Ok(req)
    }

    async fn send(&self, url: &str, req: RequestBuilder) -> Result<String, ScrapeError> {
        let rsp = req.send().await.map_err(|e| ScrapeError::Fetch {
            url: url.to_string(),
            source: e,
        })?;
        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %truncate_for_log(&body, 200), "Non-success response");
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = rsp.text().await.map_err(|e| ScrapeError::Fetch {
            url: url.to_string(),
            source: e,
        })?;
        debug!(bytes = body.len(), "Fetched");
        Ok(body)
    }

    /// GET a page and return its body.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_html(&self, url: &str) -> Result<String, ScrapeError> {
        let req = self.request(url)?.header(header::ACCEPT, "text/html,application/xhtml+xml");
        self.send(url, req).await
    }

    /// GET a JSON document.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ScrapeError> {
        let req = self.request(url)?.header(header::ACCEPT, "application/json");
        let body = self.send(url, req).await?;
        parse_json(url, &body)
    }

    /// GET a JSON document the way a page's own XHR would.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_xhr_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ScrapeError> {
        let req = self
            .request(url)?
            .header(header::ACCEPT, "application/json, text/javascript, */*; q=0.01")
            .header("X-Requested-With", "XMLHttpRequest");
        let body = self.send(url, req).await?;
        parse_json(url, &body)
    }
}

fn parse_json<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, ScrapeError> {
    serde_json::from_str(body).map_err(|e| ScrapeError::Json {
        context: format!("decoding {url}"),
        source: e,
    })
}
