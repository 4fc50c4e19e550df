//! Command-line interface definitions for the spider.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Options can be provided via command-line flags or environment variables,
//! so CI jobs can configure a run without touching the command line.

use crate::scrapers::Source;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser, Subcommand};

/// Command-line arguments for the spider.
///
/// # Examples
///
/// ```sh
/// # Scrape every source
/// feed_spider
///
/// # Scrape two sources with a visible login wait
/// CRAWLER_HEADLESS=false feed_spider scrape xueqiu seekingalpha
///
/// # Forward queued errors to the webhook
/// feishu_webhook=https://open.feishu.cn/... feed_spider flush-errors
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding `<source>/list.json` feed files
    #[arg(long, env = "SPIDER_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Directory holding `<name>.json` storage state files
    #[arg(long, env = "SPIDER_AUTH_DIR", default_value = "./auth")]
    pub auth_dir: String,

    /// Append-only error log consumed by `flush-errors`
    #[arg(long, env = "SPIDER_ERROR_LOG", default_value = "./tmp/action_errors.log")]
    pub error_log: String,

    /// Run without waiting for a human to refresh an expired session
    #[arg(
        long,
        env = "CRAWLER_HEADLESS",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = FalseyValueParser::new()
    )]
    pub headless: bool,

    /// Read storage state for supported sessions from environment variables
    #[arg(
        long,
        env = "from_env",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = FalseyValueParser::new()
    )]
    pub session_from_env: bool,

    /// Only print errors, do not append them to the error log
    #[arg(long)]
    pub no_notify: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape the given sources (all of them when none are named)
    Scrape {
        #[arg(value_enum)]
        sources: Vec<Source>,
    },
    /// Forward the error log to the webhook, then clear it
    FlushErrors {
        #[arg(long, env = "feishu_webhook")]
        webhook: Option<String>,
    },
    /// Store a `document.cookie` string as a storage state file
    ImportCookie {
        /// Session name, e.g. `xueqiu_cookie`
        #[arg(long)]
        name: String,
        /// Cookie domain, e.g. `xueqiu.com`
        #[arg(long)]
        domain: String,
        /// Raw `a=1; b=2` cookie string
        cookies: String,
    },
}
