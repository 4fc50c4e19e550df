//! Run configuration.
//!
//! [`Settings`] is built once from the parsed [`Cli`]. Each source run gets
//! its own [`SpiderContext`], which carries the source name used to tag log
//! events and the notify switch of its error sink.

use crate::cli::Cli;
use crate::notify::NotificationSink;
use crate::session::SessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Per-request timeout for listing and detail fetches.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a non-headless run waits for a refreshed session file.
pub const LOGIN_WAIT: Duration = Duration::from_secs(20);
/// Random pause between two detail fetches of the same source, in milliseconds.
pub const DETAIL_PAUSE_MS: (u64, u64) = (300, 1000);

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub auth_dir: PathBuf,
    pub error_log: PathBuf,
    pub headless: bool,
    pub session_from_env: bool,
    pub notify: bool,
    pub request_timeout: Duration,
    pub login_wait: Duration,
    pub detail_pause_ms: (u64, u64),
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            auth_dir: PathBuf::from("./auth"),
            error_log: PathBuf::from("./tmp/action_errors.log"),
            headless: true,
            session_from_env: false,
            notify: true,
            request_timeout: REQUEST_TIMEOUT,
            login_wait: LOGIN_WAIT,
            detail_pause_ms: DETAIL_PAUSE_MS,
        }
    }
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            data_dir: PathBuf::from(&cli.data_dir),
            auth_dir: PathBuf::from(&cli.auth_dir),
            error_log: PathBuf::from(&cli.error_log),
            headless: cli.headless,
            session_from_env: cli.session_from_env,
            notify: !cli.no_notify,
            ..Self::default()
        }
    }

    /// `<data_dir>/<source>/list.json`
    pub fn feed_path(&self, source: &str) -> PathBuf {
        self.data_dir.join(source).join("list.json")
    }

    pub fn sink(&self) -> NotificationSink {
        NotificationSink::new(&self.error_log, self.notify)
    }

    pub fn sessions(&self) -> SessionManager {
        SessionManager::new(&self.auth_dir, self.session_from_env)
    }
}

/// Everything one source run needs, passed explicitly.
#[derive(Debug, Clone)]
pub struct SpiderContext {
    pub source: &'static str,
    pub settings: Arc<Settings>,
    pub sink: NotificationSink,
    pub sessions: SessionManager,
}

impl SpiderContext {
    pub fn new(source: &'static str, settings: Arc<Settings>) -> Self {
        let sink = settings.sink();
        let sessions = settings.sessions();
        Self {
            source,
            settings,
            sink,
            sessions,
        }
    }
}
