//! # Feed Spider
//!
//! Scrapes a fixed set of financial news sources and keeps one capped,
//! deduplicated JSON feed per source, meant to run unattended on a schedule.
//!
//! ## Usage
//!
//! ```sh
//! feed_spider                              # every source, concurrently
//! feed_spider scrape xueqiu stcn           # selected sources
//! feed_spider flush-errors                 # forward queued errors to Feishu
//! feed_spider import-cookie --name xueqiu_cookie --domain xueqiu.com 'xq_a_token=...'
//! ```
//!
//! ## Architecture
//!
//! 1. **Listing**: each source lists candidate entries ([`scrapers`])
//! 2. **Filtering**: known links are dropped against the feed history ([`history`])
//! 3. **Detail**: new entries are fetched and sanitized ([`sanitize`])
//! 4. **Persist**: the feed file is replaced atomically when something was added
//!
//! Every source runs under its own deadline ([`executor`]); failures end up in
//! an append-only error log that `flush-errors` forwards and clears ([`notify`]).

use clap::Parser;
use futures::stream::{self, StreamExt};
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod crawl;
mod errors;
mod executor;
mod fetch;
mod history;
mod models;
mod notify;
mod sanitize;
mod scrapers;
mod session;
mod utils;

use cli::{Cli, Command};
use config::{Settings, SpiderContext};
use errors::ScrapeError;
use executor::{BoundedExecutor, RunOutcome};
use models::StorageState;
use notify::{FlushOutcome, flush_action_errors};
use scrapers::Source;
use utils::ensure_writable_dir;

/// Sources scraped at the same time.
const PARALLEL_SOURCES: usize = 7;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");
    let settings = Arc::new(Settings::from_cli(&args));

    match args.command {
        None => run_sources(settings, &Source::ALL).await,
        Some(Command::Scrape { sources }) if sources.is_empty() => {
            run_sources(settings, &Source::ALL).await
        }
        Some(Command::Scrape { sources }) => run_sources(settings, &sources).await,
        Some(Command::FlushErrors { webhook }) => {
            let sink = settings.sink();
            match flush_action_errors(sink.path(), webhook.as_deref()).await {
                FlushOutcome::Forwarded { bytes } => info!(bytes, "Error log forwarded and cleared"),
                FlushOutcome::ForwardFailed { reason } => {
                    error!(%reason, "Error log kept for the next flush")
                }
                FlushOutcome::ReadFailed { reason } => error!(%reason, "Error log unreadable"),
                other => info!(outcome = ?other, "Nothing forwarded"),
            }
            Ok(())
        }
        Some(Command::ImportCookie {
            name,
            domain,
            cookies,
        }) => {
            let state = StorageState::from_cookie_string(&cookies, &domain, true);
            let path = settings.sessions().persist(&name, &state).await?;
            info!(path = %path.display(), cookies = state.cookies.len(), "Cookie imported");
            Ok(())
        }
    }
}

/// Scrape `sources` concurrently, each under its own deadline.
///
/// Failures are reported through the error log; the process still exits 0.
async fn run_sources(settings: Arc<Settings>, sources: &[Source]) -> Result<(), Box<dyn Error>> {
    let jobs = sources.iter().map(|&source| {
        let ctx = SpiderContext::new(source.name(), settings.clone());
        let job = move || async move {
            let report = source.crawl(&ctx).await?;
            debug!(source = ctx.source, ?report, "Source done");
            Ok(())
        };
        (source.name(), job, source.timeout())
    });
    run_jobs(&settings, jobs).await
}

/// Run labelled jobs through one [`BoundedExecutor`], at most
/// [`PARALLEL_SOURCES`] at a time. Never fails on a job's behalf.
async fn run_jobs<I, F, Fut>(settings: &Settings, jobs: I) -> Result<(), Box<dyn Error>>
where
    I: IntoIterator<Item = (&'static str, F, Duration)>,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ScrapeError>> + Send + 'static,
{
    let start_time = std::time::Instant::now();
    let sink = settings.sink();

    if let Err(e) = ensure_writable_dir(&settings.data_dir).await {
        error!(
            path = %settings.data_dir.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        sink.log_action_error(
            &format!("data dir {} not writable: {e}", settings.data_dir.display()),
            None,
        )
        .await;
        return Ok(());
    }

    let executor = BoundedExecutor::new(sink);
    let runs: Vec<_> = jobs
        .into_iter()
        .map(|(label, job, timeout)| executor.run_with_timeout(label, job, timeout, None))
        .collect();
    info!(count = runs.len(), notify = settings.notify, "Starting sources");
    let outcomes: Vec<RunOutcome> = stream::iter(runs).buffer_unordered(PARALLEL_SOURCES).collect().await;

    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    info!(
        completed,
        failed = outcomes.len() - completed,
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "All sources finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn settings_in(root: &Path, data_dir: std::path::PathBuf) -> Settings {
        Settings {
            data_dir,
            auth_dir: root.join("auth"),
            error_log: root.join("tmp/action_errors.log"),
            ..Settings::default()
        }
    }

    fn entries(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .split("\n\n")
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_unwritable_data_dir_is_logged_not_returned() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        std::fs::write(&blocker, "plain file").unwrap();
        let settings = Arc::new(settings_in(tmp.path(), blocker.join("data")));

        let result = run_sources(settings.clone(), &Source::ALL).await;
        assert!(result.is_ok());

        let logged = entries(&settings.error_log);
        assert_eq!(logged.len(), 1, "{logged:?}");
        assert!(logged[0].starts_with("data dir "), "{}", logged[0]);
        assert!(!tmp.path().join("data").exists());
    }

    #[tokio::test]
    async fn test_mixed_job_results_still_succeed() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path(), tmp.path().join("data"));

        let jobs = [("stcn", 0u8), ("xueqiu", 1), ("ainvest", 2)]
            .into_iter()
            .map(|(label, kind)| {
                let job = move || async move {
                    match kind {
                        0 => Ok(()),
                        1 => Err(ScrapeError::LoginRequired { site: "xueqiu" }),
                        _ => {
                            tokio::time::sleep(Duration::from_secs(30)).await;
                            Ok(())
                        }
                    }
                };
                (label, job, Duration::from_millis(100))
            });

        let result = run_jobs(&settings, jobs).await;
        assert!(result.is_ok());

        let logged = entries(&settings.error_log);
        assert_eq!(logged.len(), 2, "{logged:?}");
        assert!(logged.iter().any(|e| e.starts_with("xueqiu main.rs#")));
        assert!(logged.iter().any(|e| e.starts_with("ainvest main.rs#") && e.contains("timed out")));
        assert!(!logged.iter().any(|e| e.starts_with("stcn")));
    }
}
