//! DollarsAndSense (Singapore) personal finance articles.
//!
//! The site sits behind a Cloudflare check. A session file named
//! `dollarsandsense` holds the clearance cookies once a human has passed it.

use super::{SiteScraper, auth_gate, element_text, selector};
use crate::errors::ScrapeError;
use crate::fetch::HttpClient;
use crate::models::{Article, KIND_ARTICLE};
use crate::sanitize::Sanitizer;
use crate::utils::current_time_string;
use scraper::Html;
use tracing::{info, instrument};

const LIST_URL: &str = "https://dollarsandsense.sg/";
const PER_RUN: usize = 1;

const CLOUDFLARE_MARKER: &str = "needs to review the security of your connection";

const DETAIL: Sanitizer = Sanitizer::new(
    "#mvp-content-main",
    "script, style, iframe, .adsbygoogle, div.posts-nav-link, div.mvp-org-wrap",
)
.drop_hidden()
.cut_after("Read Also");

pub struct DollarsAndSense;

impl SiteScraper for DollarsAndSense {
    const NAME: &'static str = "dollarsandsense";
    const SESSION: Option<&'static str> = Some("dollarsandsense");

    #[instrument(level = "info", skip_all)]
    async fn listing(&self, http: &HttpClient) -> Result<Vec<Article>, ScrapeError> {
        let html = auth_gate(http.get_html(LIST_URL).await, Self::NAME)?;
        check_challenge(&html)?;
        let articles = parse_listing(&html)?;
        info!(count = articles.len(), "Found DollarsAndSense articles");
        Ok(articles)
    }

    #[instrument(level = "info", skip_all, fields(link = %article.link))]
    async fn detail(&self, http: &HttpClient, article: &Article) -> Result<Option<String>, ScrapeError> {
        let html = auth_gate(http.get_html(&article.link).await, Self::NAME)?;
        check_challenge(&html)?;
        Ok(DETAIL.apply(&html))
    }
}

fn check_challenge(html: &str) -> Result<(), ScrapeError> {
    if html.contains(CLOUDFLARE_MARKER) {
        return Err(ScrapeError::VerificationRequired {
            site: DollarsAndSense::NAME,
        });
    }
    Ok(())
}

fn parse_listing(html: &str) -> Result<Vec<Article>, ScrapeError> {
    let links = selector(LIST_URL, ".mvp-side-tab-story h2 > a")?;
    let document = Html::parse_document(html);

    let articles = document
        .select(&links)
        .filter_map(|a| {
            let href = a.value().attr("href").map(str::trim).filter(|h| !h.is_empty())?;
            Some(Article::new(
                DollarsAndSense::NAME,
                element_text(&a),
                href,
                current_time_string(),
                KIND_ARTICLE,
                "en",
            ))
        })
        .take(PER_RUN)
        .collect();
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_page_needs_verification() {
        let page = "<p>dollarsandsense.sg needs to review the security of your connection before proceeding.</p>";
        assert!(matches!(
            check_challenge(page),
            Err(ScrapeError::VerificationRequired { site: "dollarsandsense" })
        ));
        assert!(check_challenge("<p>Welcome</p>").is_ok());
    }

    #[test]
    fn test_parse_listing_takes_first_story() {
        let html = r#"<div class="mvp-side-tab-story">
            <h2><a href="https://dollarsandsense.sg/cpf-changes-2025/">CPF Changes In 2025</a></h2>
            <h2><a href="https://dollarsandsense.sg/second/">Second</a></h2>
        </div>"#;
        let articles = parse_listing(html).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "CPF Changes In 2025");
        assert_eq!(articles[0].link, "https://dollarsandsense.sg/cpf-changes-2025/");
    }

    #[test]
    fn test_detail_cleanup() {
        let page = r#"<html><body><div id="mvp-content-main">
            <p>Here is what changes for your CPF.</p>
            <p style="display:none">tracking pixel text</p>
            <ins class="adsbygoogle"></ins>
            <p><strong><em>Read Also: <a href="/x">Older post</a></em></strong></p>
            <p>Related reading</p>
            <div class="posts-nav-link">Next</div>
        </div><div class="mvp-org-wrap">org</div></body></html>"#;
        let body = DETAIL.apply(page).unwrap();
        assert_eq!(body, "<p>Here is what changes for your CPF.</p>");
    }
}
