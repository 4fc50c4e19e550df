//! Error notification: a local append-only log plus a webhook forwarder.
//!
//! Scrape runs never talk to the webhook directly. They append short messages
//! to the error log through [`NotificationSink::log_action_error`]; a separate
//! `flush-errors` invocation reads the whole log, forwards it as one Feishu
//! text message and clears the log once the forward succeeded.
//!
//! # Log format
//!
//! Plain text. Each entry is at most [`MAX_MESSAGE_CHARS`] characters and is
//! followed by a blank line.

use crate::utils::truncate_chars;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// Longest message kept in the error log.
pub const MAX_MESSAGE_CHARS: usize = 100;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Serialises appends from concurrently running sources.
static APPEND_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Debug, Clone)]
pub struct NotificationSink {
    path: PathBuf,
    notify: bool,
}

impl NotificationSink {
    pub fn new(path: impl Into<PathBuf>, notify: bool) -> Self {
        Self {
            path: path.into(),
            notify,
        }
    }

    pub fn notify(&self) -> bool {
        self.notify
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Print `message` and, when notifying, append it to the error log.
    ///
    /// `notify` overrides the sink's default for this one message. Failures to
    /// write the log are reported but never returned.
    pub async fn log_action_error(&self, message: &str, notify: Option<bool>) {
        error!(%message, "action error");
        if !notify.unwrap_or(self.notify) {
            return;
        }
        let entry = format!("{}\n\n", truncate_chars(message, MAX_MESSAGE_CHARS).trim_end());
        if let Err(e) = self.append(&entry).await {
            error!(path = %self.path.display(), error = %e, "Failed to append to error log");
        }
    }

    async fn append(&self, entry: &str) -> std::io::Result<()> {
        let _guard = APPEND_LOCK.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        // single write so O_APPEND keeps entries from other processes intact
        file.write_all(entry.as_bytes()).await?;
        file.flush().await
    }
}

/// What a flush did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The log file does not exist.
    Missing,
    /// The log exists but holds only whitespace.
    Empty,
    /// The log could not be read; nothing was sent.
    ReadFailed { reason: String },
    /// No webhook configured; the log was left untouched.
    NoWebhook,
    /// Forwarded and cleared.
    Forwarded { bytes: usize },
    /// Forward failed; the log was kept for the next flush.
    ForwardFailed { reason: String },
}

#[derive(Serialize)]
struct FeishuText {
    text: String,
}

#[derive(Serialize)]
struct FeishuPayload {
    msg_type: &'static str,
    content: FeishuText,
}

impl FeishuPayload {
    fn text(message: String) -> Self {
        Self {
            msg_type: "text",
            content: FeishuText { text: message },
        }
    }
}

/// Forward the error log to `webhook` and clear it after a successful send.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn flush_action_errors(path: &Path, webhook: Option<&str>) -> FlushOutcome {
    let _guard = APPEND_LOCK.lock().await;
    let contents = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Error log not found");
            return FlushOutcome::Missing;
        }
        Err(e) => {
            error!(error = %e, "Failed to read error log");
            return FlushOutcome::ReadFailed {
                reason: e.to_string(),
            };
        }
    };
    let contents = contents.trim();
    if contents.is_empty() {
        warn!("Error log is empty");
        return FlushOutcome::Empty;
    }
    let Some(webhook) = webhook.filter(|w| !w.trim().is_empty()) else {
        error!("feishu_webhook is not set; keeping error log");
        return FlushOutcome::NoWebhook;
    };

    if let Err(reason) = send_webhook(webhook, format!("pw: {contents}")).await {
        error!(%reason, "Failed to forward error log; keeping it for the next flush");
        return FlushOutcome::ForwardFailed { reason };
    }
    info!(bytes = contents.len(), "Forwarded error log");

    if let Err(e) = fs::write(path, b"").await {
        error!(error = %e, "Forwarded but failed to clear error log");
    } else {
        info!("Error log cleared");
    }
    FlushOutcome::Forwarded {
        bytes: contents.len(),
    }
}

async fn send_webhook(webhook: &str, message: String) -> Result<(), String> {
    let client = Client::builder()
        .timeout(WEBHOOK_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())?;
    let rsp = client
        .post(webhook)
        .json(&FeishuPayload::text(message))
        .send()
        .await
        .map_err(|e| format!("webhook request failed: {e}"))?;
    let status = rsp.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = rsp.text().await.unwrap_or_default();
        Err(format!("webhook answered {status}: {body}"))
    }
}
