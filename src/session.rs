//! Session (storage state) resolution and persistence.
//!
//! A session is named after the file it lives in: `<auth_dir>/<name>.json`.
//! Deployments that cannot keep files between runs (ephemeral CI containers)
//! enable `from_env` and put the raw storage-state JSON into an environment
//! variable of the same name. Only sessions in [`ENV_SESSION_ALLOWLIST`] may
//! be injected that way.

use crate::errors::ScrapeError;
use crate::models::StorageState;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Sessions that may be provided through the environment.
pub const ENV_SESSION_ALLOWLIST: &[&str] = &["xueqiu_cookie", "seekingalpha_cookie"];

/// Exact contents written for a session that has never been used.
pub const EMPTY_STORAGE_STATE: &str = r#"{"cookies": [], "origins": []}"#;

const REFRESH_POLL: Duration = Duration::from_millis(500);

/// Where a session's storage state comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageSource {
    /// Parsed from an environment variable; cannot be written back.
    Inline(StorageState),
    /// A file on disk, created empty if it did not exist.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct SessionManager {
    auth_dir: PathBuf,
    from_env: bool,
}

impl SessionManager {
    pub fn new(auth_dir: impl Into<PathBuf>, from_env: bool) -> Self {
        Self {
            auth_dir: auth_dir.into(),
            from_env,
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.auth_dir.join(format!("{name}.json"))
    }

    /// Resolve `name` using the process environment.
    pub async fn resolve(&self, name: &str) -> Result<StorageSource, ScrapeError> {
        self.resolve_with(name, |key| std::env::var(key).ok()).await
    }

    /// Resolve `name`, reading environment variables through `lookup`.
    #[instrument(level = "info", skip(self, lookup))]
    pub async fn resolve_with<F>(&self, name: &str, lookup: F) -> Result<StorageSource, ScrapeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.from_env && ENV_SESSION_ALLOWLIST.contains(&name) {
            match lookup(name) {
                Some(raw) => {
                    info!("Using storage state from environment");
                    let state = serde_json::from_str(&raw).map_err(|e| ScrapeError::Session {
                        name: name.to_string(),
                        detail: format!("environment value is not a storage state: {e}"),
                    })?;
                    return Ok(StorageSource::Inline(state));
                }
                None => warn!("from_env is set but the variable is missing; falling back to file"),
            }
        }

        let path = self.path_for(name);
        if fs::try_exists(&path).await.map_err(|e| ScrapeError::io(&path, e))? {
            debug!(path = %path.display(), "Using storage state file");
        } else {
            info!(path = %path.display(), "Storage state file missing; creating placeholder");
            fs::create_dir_all(&self.auth_dir)
                .await
                .map_err(|e| ScrapeError::io(&self.auth_dir, e))?;
            fs::write(&path, EMPTY_STORAGE_STATE)
                .await
                .map_err(|e| ScrapeError::io(&path, e))?;
        }
        Ok(StorageSource::File(path))
    }

    /// Materialise the storage state behind `source`.
    pub async fn load(&self, name: &str, source: &StorageSource) -> Result<StorageState, ScrapeError> {
        match source {
            StorageSource::Inline(state) => Ok(state.clone()),
            StorageSource::File(path) => read_state(name, path).await,
        }
    }

    /// Write `state` to the session's file, replacing it.
    #[instrument(level = "info", skip(self, state), fields(cookies = state.cookies.len()))]
    pub async fn persist(&self, name: &str, state: &StorageState) -> Result<PathBuf, ScrapeError> {
        let path = self.path_for(name);
        fs::create_dir_all(&self.auth_dir)
            .await
            .map_err(|e| ScrapeError::io(&self.auth_dir, e))?;
        let json = serde_json::to_vec_pretty(state).map_err(|e| ScrapeError::Json {
            context: format!("serializing session {name}"),
            source: e,
        })?;
        fs::write(&path, json).await.map_err(|e| ScrapeError::io(&path, e))?;
        info!(path = %path.display(), "Stored storage state");
        Ok(path)
    }

    /// Wait until the session file is rewritten, then return its new state.
    ///
    /// Returns `Ok(None)` if nothing changed within `timeout` or the rewritten
    /// file does not parse yet.
    #[instrument(level = "info", skip(self))]
    pub async fn wait_for_refresh(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<StorageState>, ScrapeError> {
        let path = self.path_for(name);
        let before = modified(&path).await;
        let deadline = tokio::time::Instant::now() + timeout;
        info!(path = %path.display(), ?timeout, "Waiting for a refreshed storage state");

        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(REFRESH_POLL).await;
            if modified(&path).await != before {
                match read_state(name, &path).await {
                    Ok(state) => {
                        info!(cookies = state.cookies.len(), "Storage state refreshed");
                        return Ok(Some(state));
                    }
                    Err(e) => debug!(error = %e, "Storage state changed but is not readable yet"),
                }
            }
        }
        warn!("No refreshed storage state before the deadline");
        Ok(None)
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).await.ok().and_then(|m| m.modified().ok())
}

async fn read_state(name: &str, path: &Path) -> Result<StorageState, ScrapeError> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| ScrapeError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| ScrapeError::Session {
        name: name.to_string(),
        detail: format!("{} is not a storage state: {e}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cookie;

    const BLOB: &str = r#"{"cookies":[{"name":"session","value":"s3cr3t","domain":".seekingalpha.com","path":"/","expires":-1,"httpOnly":true,"secure":true,"sameSite":"Lax"}],"origins":[]}"#;

    #[tokio::test]
    async fn test_resolve_creates_placeholder_file() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(tmp.path().join("auth"), false);

        let source = sessions.resolve_with("dollarsandsense", |_| None).await.unwrap();
        let path = tmp.path().join("auth/dollarsandsense.json");
        assert_eq!(source, StorageSource::File(path.clone()));
        assert_eq!(fs::read_to_string(&path).await.unwrap(), EMPTY_STORAGE_STATE);

        let state = sessions.load("dollarsandsense", &source).await.unwrap();
        assert_eq!(state, StorageState::default());
    }

    #[tokio::test]
    async fn test_resolve_keeps_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(tmp.path(), false);
        fs::write(sessions.path_for("xueqiu_cookie"), BLOB).await.unwrap();

        let source = sessions.resolve_with("xueqiu_cookie", |_| None).await.unwrap();
        let state = sessions.load("xueqiu_cookie", &source).await.unwrap();
        assert_eq!(state.cookies.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_prefers_environment_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(tmp.path(), true);

        let source = sessions
            .resolve_with("seekingalpha_cookie", |key| {
                (key == "seekingalpha_cookie").then(|| BLOB.to_string())
            })
            .await
            .unwrap();
        match source {
            StorageSource::Inline(state) => assert_eq!(state.cookies[0].value, "s3cr3t"),
            other => panic!("expected inline state, got {other:?}"),
        }
        assert!(!sessions.path_for("seekingalpha_cookie").exists());
    }

    #[tokio::test]
    async fn test_resolve_ignores_environment_when_flag_off_or_not_allowlisted() {
        let tmp = tempfile::tempdir().unwrap();
        let lookup = |_: &str| Some(BLOB.to_string());

        let off = SessionManager::new(tmp.path(), false);
        let source = off.resolve_with("seekingalpha_cookie", lookup).await.unwrap();
        assert!(matches!(source, StorageSource::File(_)));

        let on = SessionManager::new(tmp.path(), true);
        let source = on.resolve_with("dollarsandsense", lookup).await.unwrap();
        assert!(matches!(source, StorageSource::File(_)));
    }

    #[tokio::test]
    async fn test_resolve_rejects_malformed_environment_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(tmp.path(), true);
        let err = sessions
            .resolve_with("xueqiu_cookie", |_| Some("not json".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Session { .. }));
    }

    #[tokio::test]
    async fn test_persist_then_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(tmp.path().join("auth"), false);
        let state = StorageState {
            cookies: vec![Cookie {
                name: "xq_a_token".to_string(),
                value: "abc".to_string(),
                domain: ".xueqiu.com".to_string(),
                path: "/".to_string(),
                expires: -1.0,
                http_only: true,
                secure: false,
                same_site: None,
            }],
            origins: vec![],
        };
        let path = sessions.persist("xueqiu_cookie", &state).await.unwrap();
        let loaded = sessions
            .load("xueqiu_cookie", &StorageSource::File(path))
            .await
            .unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_wait_for_refresh_sees_rewritten_file() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(tmp.path(), false);
        let path = sessions.path_for("xueqiu_cookie");
        fs::write(&path, EMPTY_STORAGE_STATE).await.unwrap();

        let writer = {
            let path = path.clone();
            tokio::spawn(async move {
                // mtime granularity can be a full second on some filesystems
                tokio::time::sleep(Duration::from_millis(1100)).await;
                fs::write(&path, BLOB).await.unwrap();
            })
        };

        let refreshed = sessions
            .wait_for_refresh("xueqiu_cookie", Duration::from_secs(5))
            .await
            .unwrap()
            .expect("refreshed state");
        writer.await.unwrap();
        assert_eq!(refreshed.cookies.len(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_refresh_gives_up() {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(tmp.path(), false);
        fs::write(sessions.path_for("xueqiu_cookie"), EMPTY_STORAGE_STATE)
            .await
            .unwrap();
        let refreshed = sessions
            .wait_for_refresh("xueqiu_cookie", Duration::from_millis(600))
            .await
            .unwrap();
        assert!(refreshed.is_none());
    }
}
