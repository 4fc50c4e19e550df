//! Feed history: the capped, deduplicated article list of one source.
//!
//! A run reads `<data_dir>/<source>/list.json` once, prepends whatever is new
//! and, only if something was inserted, replaces the whole file. Loading is
//! fail-soft: a missing or unreadable feed simply means "no history yet".

use crate::errors::ScrapeError;
use crate::models::{Article, Feed};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Feed length used by most sources.
pub const DEFAULT_CAP: usize = 20;

/// Read a feed file into its articles and the set of their links.
///
/// Any error (missing file, empty file, malformed JSON) yields empty results.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn load_feed(path: &Path) -> (Vec<Article>, HashSet<String>) {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "No readable history; starting empty");
            return (Vec::new(), HashSet::new());
        }
    };
    match serde_json::from_slice::<Feed>(&raw) {
        Ok(feed) => {
            let links = feed.data.iter().map(|a| a.link.clone()).collect();
            (feed.data, links)
        }
        Err(e) => {
            warn!(error = %e, "History is not a valid feed; starting empty");
            (Vec::new(), HashSet::new())
        }
    }
}

/// Serialize `{"data": articles}` and atomically replace `path`.
///
/// The document is rendered in memory, written to a sibling temp file and
/// renamed over the target, so a failure leaves the previous feed intact.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = articles.len()))]
pub async fn save_feed(path: &Path, articles: &[Article]) -> Result<(), ScrapeError> {
    #[derive(Serialize)]
    struct FeedRef<'a> {
        data: &'a [Article],
    }

    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    FeedRef { data: articles }
        .serialize(&mut ser)
        .map_err(|e| ScrapeError::Json {
            context: format!("serializing {}", path.display()),
            source: e,
        })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ScrapeError::io(parent, e))?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, &buf).await.map_err(|e| ScrapeError::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(ScrapeError::io(path, e));
    }
    info!("Feed written");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// In-memory working copy of a source's feed for one run.
#[derive(Debug)]
pub struct History {
    path: PathBuf,
    cap: usize,
    articles: Vec<Article>,
    links: HashSet<String>,
    inserted: usize,
}

impl History {
    pub async fn load(path: impl Into<PathBuf>, cap: usize) -> Self {
        let path = path.into();
        let (articles, links) = load_feed(&path).await;
        debug!(path = %path.display(), existing = articles.len(), "Loaded history");
        Self {
            path,
            cap,
            articles,
            links,
            inserted: 0,
        }
    }

    /// Whether `link` is already known; checked before any detail fetch.
    pub fn contains(&self, link: &str) -> bool {
        self.links.contains(link)
    }

    /// Prepend `article` unless its link is known or it has no content.
    ///
    /// The list is cut back to the cap right away, so it never holds more
    /// than `cap` records. Returns whether the article was inserted.
    pub fn insert(&mut self, article: Article) -> bool {
        if article.description.is_empty() || self.links.contains(&article.link) {
            return false;
        }
        self.links.insert(article.link.clone());
        self.articles.insert(0, article);
        self.articles.truncate(self.cap);
        self.inserted += 1;
        true
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn inserted(&self) -> usize {
        self.inserted
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the feed if this run inserted anything. Returns whether it wrote.
    pub async fn persist(&mut self) -> Result<bool, ScrapeError> {
        if self.inserted == 0 || self.articles.is_empty() {
            debug!(path = %self.path.display(), "Nothing new; feed left untouched");
            return Ok(false);
        }
        save_feed(&self.path, &self.articles).await?;
        self.inserted = 0;
        Ok(true)
    }
}
