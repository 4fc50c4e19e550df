//! Error type shared by the crawlers, the history store and the session manager.
//!
//! Every failure that can end a source's run is a [`ScrapeError`]. The
//! [`ErrorKind`] returned by [`ScrapeError::kind`] groups the variants so that
//! callers (and whoever reads the error log) can tell a flaky network apart
//! from an expired login or a full disk.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Coarse classification of a [`ScrapeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network error, navigation timeout or non-success status.
    Transient,
    /// The page or payload did not have the expected shape.
    Structure,
    /// Login or human verification is required before the source can be read.
    Auth,
    /// The run exceeded its wall-clock budget or panicked.
    Timeout,
    /// Reading or writing local state failed.
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Structure => "structure",
            ErrorKind::Auth => "auth",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Persistence => "persistence",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum ScrapeError {
    /// The request could not be sent or the body could not be read.
    Fetch { url: String, source: reqwest::Error },
    /// The server answered with a non-success status.
    Status { url: String, status: u16 },
    /// Expected content was missing from a page or payload.
    Structure { url: String, detail: String },
    /// The site shows a logged-out state.
    LoginRequired { site: &'static str },
    /// The site shows a human verification / bot challenge page.
    VerificationRequired { site: &'static str },
    /// A storage state blob could not be used.
    Session { name: String, detail: String },
    Io { path: PathBuf, source: std::io::Error },
    Json { context: String, source: serde_json::Error },
    Timeout { after: Duration },
    Panicked { message: String },
}

impl ScrapeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::Fetch { .. } | ScrapeError::Status { .. } => ErrorKind::Transient,
            ScrapeError::Structure { .. } | ScrapeError::Json { .. } => ErrorKind::Structure,
            ScrapeError::LoginRequired { .. }
            | ScrapeError::VerificationRequired { .. }
            | ScrapeError::Session { .. } => ErrorKind::Auth,
            ScrapeError::Timeout { .. } | ScrapeError::Panicked { .. } => ErrorKind::Timeout,
            ScrapeError::Io { .. } => ErrorKind::Persistence,
        }
    }

    /// True when a human (or a fresh storage state) has to step in.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ScrapeError::LoginRequired { .. } | ScrapeError::VerificationRequired { .. }
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScrapeError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn structure(url: impl Into<String>, detail: impl Into<String>) -> Self {
        ScrapeError::Structure {
            url: url.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeError::Fetch { url, source } => write!(f, "request to {url} failed: {source}"),
            ScrapeError::Status { url, status } => write!(f, "{url} answered with status {status}"),
            ScrapeError::Structure { url, detail } => write!(f, "unexpected page structure at {url}: {detail}"),
            ScrapeError::LoginRequired { site } => write!(f, "{site} requires login"),
            ScrapeError::VerificationRequired { site } => {
                write!(f, "{site} requires human verification")
            }
            ScrapeError::Session { name, detail } => write!(f, "session {name} unusable: {detail}"),
            ScrapeError::Io { path, source } => write!(f, "{}: {source}", path.display()),
            ScrapeError::Json { context, source } => write!(f, "{context}: {source}"),
            ScrapeError::Timeout { after } => write!(f, "timed out after {:.1}s", after.as_secs_f64()),
            ScrapeError::Panicked { message } => write!(f, "panicked: {message}"),
        }
    }
}

impl Error for ScrapeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ScrapeError::Fetch { source, .. } => Some(source),
            ScrapeError::Io { source, .. } => Some(source),
            ScrapeError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}
