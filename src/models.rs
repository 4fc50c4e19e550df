//! Data models persisted by the spider.
//!
//! - [`Article`]: one entry of a source's feed file
//! - [`Feed`]: the `{ "data": [...] }` envelope written to `list.json`
//! - [`StorageState`] / [`Cookie`]: the browser storage-state shape used for
//!   session reuse between runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Content category of an [`Article`].
pub const KIND_ARTICLE: u8 = 1;
/// Live-flash / ticker style entry.
pub const KIND_FLASH: u8 = 2;

/// A single scraped record as it appears in the feed file.
///
/// `link` is the deduplication key. `description` holds sanitized HTML; an
/// empty description means the record has no content and is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Value>,
    pub title: String,
    /// Site-specific post type (`type` on the wire).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub post_type: Option<Value>,
    #[serde(default)]
    pub description: String,
    pub link: String,
    /// `YYYY-MM-DD HH:MM:SS` in UTC+8.
    pub pub_date: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub kind: u8,
    pub language: String,
}

impl Article {
    /// A listing entry whose description is filled in by the detail fetch.
    pub fn new(
        source: &str,
        title: impl Into<String>,
        link: impl Into<String>,
        pub_date: impl Into<String>,
        kind: u8,
        language: &str,
    ) -> Self {
        Self {
            id: None,
            user_id: None,
            title: title.into(),
            post_type: None,
            description: String::new(),
            link: link.into(),
            pub_date: pub_date.into(),
            source: source.to_string(),
            image: None,
            author: None,
            kind,
            language: language.to_string(),
        }
    }
}

/// On-disk envelope of a feed file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Feed {
    pub data: Vec<Article>,
}

/// Browser storage state: cookies plus origin-scoped storage.
///
/// Origins are kept opaque; only cookies are interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub origins: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Unix seconds; `-1` marks a session cookie.
    #[serde(default = "default_cookie_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_cookie_expiry() -> f64 {
    -1.0
}

impl Cookie {
    /// Whether the cookie would be sent by a browser for `url` at `now`.
    pub fn matches(&self, url: &Url, now: DateTime<Utc>) -> bool {
        if self.expires >= 0.0 && self.expires < now.timestamp() as f64 {
            return false;
        }
        if self.secure && url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let domain = self.domain.trim_start_matches('.');
        let domain_ok = host == domain || host.ends_with(&format!(".{domain}"));
        domain_ok && url.path().starts_with(&self.path)
    }
}

impl StorageState {
    /// Build a state from a `document.cookie` style string (`a=1; b=2`).
    ///
    /// Every cookie is scoped to `domain` with path `/` and no expiry.
    pub fn from_cookie_string(raw: &str, domain: &str, secure: bool) -> Self {
        let cookies = raw
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some(Cookie {
                    name: name.to_string(),
                    value: value.trim().to_string(),
                    domain: domain.to_string(),
                    path: default_cookie_path(),
                    expires: default_cookie_expiry(),
                    http_only: false,
                    secure,
                    same_site: Some("Lax".to_string()),
                })
            })
            .collect();
        Self {
            cookies,
            origins: Vec::new(),
        }
    }

    /// `Cookie` header value for a request to `url`, if any cookie applies.
    pub fn cookie_header(&self, url: &Url, now: DateTime<Utc>) -> Option<String> {
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.matches(url, now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}
