//! Declarative cleanup of article bodies.
//!
//! Each site describes its detail page as a [`Sanitizer`]: which element
//! holds the article, which descendants are noise, and an optional marker
//! paragraph ("Read Also") after which everything is dropped. The result is
//! the container's inner HTML.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error, warn};

static HIDDEN_STYLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"display:\s*none").unwrap());

#[derive(Debug, Clone, Copy)]
pub struct Sanitizer {
    /// Selector of the element holding the article body.
    pub container: &'static str,
    /// Descendants to remove (selector list).
    pub strip: &'static str,
    /// Remove `<p>` elements hidden with an inline `display: none`.
    pub drop_hidden: bool,
    /// Remove the first `<p>` containing this text and every sibling after it.
    pub cut_after: Option<&'static str>,
}

impl Sanitizer {
    pub const fn new(container: &'static str, strip: &'static str) -> Self {
        Self {
            container,
            strip,
            drop_hidden: false,
            cut_after: None,
        }
    }

    pub const fn drop_hidden(mut self) -> Self {
        self.drop_hidden = true;
        self
    }

    pub const fn cut_after(mut self, marker: &'static str) -> Self {
        self.cut_after = Some(marker);
        self
    }

    /// Clean `html` and return the container's inner HTML.
    ///
    /// Returns `None` when the container is missing or a selector is invalid.
    pub fn apply(&self, html: &str) -> Option<String> {
        let container = parse(self.container)?;
        let strip = parse(self.strip)?;
        let mut document = Html::parse_document(html);

        let Some(root) = document.select(&container).next() else {
            error!(container = self.container, "Content container not found");
            return None;
        };

        let mut doomed: Vec<_> = root.select(&strip).map(|e| e.id()).collect();
        if self.drop_hidden {
            let p = parse("p[style]")?;
            doomed.extend(
                root.select(&p)
                    .filter(|e| e.value().attr("style").is_some_and(|s| HIDDEN_STYLE.is_match(s)))
                    .map(|e| e.id()),
            );
        }
        if let Some(marker) = self.cut_after {
            let p = parse("p")?;
            if let Some(hit) = root.select(&p).find(|e| text_of(e).contains(marker)) {
                debug!(marker, text = %text_of(&hit).chars().take(30).collect::<String>(), "Cutting trailing content");
                doomed.push(hit.id());
                doomed.extend(hit.next_siblings().map(|n| n.id()));
            }
        }
        let root_id = root.id();

        for id in doomed {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }

        let root = document.tree.get(root_id).and_then(ElementRef::wrap)?;
        Some(root.inner_html().trim().to_string())
    }
}

fn parse(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(selector, error = %e, "Invalid selector");
            None
        }
    }
}

fn text_of(e: &ElementRef<'_>) -> String {
    e.text().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scripts_and_styles() {
        let rules = Sanitizer::new(".post-content", "script, style, iframe");
        let html = r#"<html><body><div class="post-content">
            <p>Keep me</p><script>track()</script><style>p{}</style><iframe src="x"></iframe>
        </div></body></html>"#;
        let out = rules.apply(html).unwrap();
        assert!(out.contains("<p>Keep me</p>"));
        assert!(!out.contains("script"));
        assert!(!out.contains("style"));
        assert!(!out.contains("iframe"));
    }

    #[test]
    fn test_missing_container_is_none() {
        let rules = Sanitizer::new(".news-content", "script");
        assert_eq!(rules.apply("<html><body><p>nothing</p></body></html>"), None);
    }

    #[test]
    fn test_drops_hidden_paragraphs() {
        let rules = Sanitizer::new(".article__bd__detail", "script, style").drop_hidden();
        let html = r#"<div class="article__bd__detail">
            <p style="display: none;">hidden</p><p style="display:none">also</p>
            <p style="color: red">visible</p></div>"#;
        let out = rules.apply(html).unwrap();
        assert!(!out.contains("hidden"));
        assert!(!out.contains("also"));
        assert!(out.contains("visible"));
    }

    #[test]
    fn test_cut_after_marker_removes_tail() {
        let rules = Sanitizer::new("#mvp-content-main", "script, .adsbygoogle").cut_after("Read Also");
        let html = r#"<div id="mvp-content-main">
            <p>First</p><ins class="adsbygoogle"></ins>
            <p><strong><em>Read Also: <a href="/x">Something</a></em></strong></p>
            <p>Related 1</p><div class="posts-nav-link">nav</div></div>"#;
        let out = rules.apply(html).unwrap();
        assert!(out.contains("First"));
        assert!(!out.contains("adsbygoogle"));
        assert!(!out.contains("Read Also"));
        assert!(!out.contains("Related 1"));
        assert!(!out.contains("nav"));
    }

    #[test]
    fn test_invalid_selector_is_none() {
        let rules = Sanitizer::new("div[", "script");
        assert_eq!(rules.apply("<div></div>"), None);
    }
}
