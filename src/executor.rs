//! Timeout-bounded execution of one scrape job.
//!
//! [`BoundedExecutor::run_with_timeout`] spawns the job as its own task and
//! waits at most `timeout` for it. Whatever happens inside the job (an error,
//! a panic, running past the deadline) ends up as one message in the
//! [`NotificationSink`] and a [`RunOutcome`] for the caller; nothing is
//! propagated further.
//!
//! On timeout the task is aborted, which drops the job's future at its next
//! await point and with it any in-flight request.

use crate::errors::ScrapeError;
use crate::notify::NotificationSink;
use std::any::Any;
use std::future::Future;
use std::panic::Location;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Jobs running longer than this get a timing line in the log.
pub const SLOW_THRESHOLD: Duration = Duration::from_secs(2);

/// How a bounded run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed { elapsed: Duration },
    Failed { elapsed: Duration, error: ScrapeError },
    TimedOut { after: Duration },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    sink: NotificationSink,
    slow_threshold: Duration,
}

impl BoundedExecutor {
    pub fn new(sink: NotificationSink) -> Self {
        Self {
            sink,
            slow_threshold: SLOW_THRESHOLD,
        }
    }

    /// Run `job` on its own task, giving up after `timeout`.
    ///
    /// Failure messages start with `label` (the source name) followed by
    /// the caller's `file#line`. `notify` overrides the sink's default for
    /// this run.
    #[track_caller]
    pub fn run_with_timeout<F, Fut>(
        &self,
        label: &'static str,
        job: F,
        timeout: Duration,
        notify: Option<bool>,
    ) -> impl Future<Output = RunOutcome> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ScrapeError>> + Send + 'static,
    {
        let call_site = CallSite::from(Location::caller());
        let sink = self.sink.clone();
        let slow_threshold = self.slow_threshold;

        async move {
            let started = Instant::now();
            let mut handle = tokio::spawn(async move { job().await });

            let outcome = match tokio::time::timeout(timeout, &mut handle).await {
                Err(_) => {
                    handle.abort();
                    let error = ScrapeError::Timeout { after: timeout };
                    warn!(label, %call_site, ?timeout, "Job abandoned at deadline");
                    sink.log_action_error(&format!("{label} {call_site} error: {error}"), notify)
                        .await;
                    RunOutcome::TimedOut { after: timeout }
                }
                Ok(Ok(Ok(()))) => RunOutcome::Completed {
                    elapsed: started.elapsed(),
                },
                Ok(Ok(Err(error))) => {
                    sink.log_action_error(&format!("{label} {call_site} error: {error}"), notify)
                        .await;
                    RunOutcome::Failed {
                        elapsed: started.elapsed(),
                        error,
                    }
                }
                Ok(Err(join_error)) => {
                    let message = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        "task cancelled".to_string()
                    };
                    let error = ScrapeError::Panicked { message };
                    sink.log_action_error(&format!("{label} {call_site} error: {error}"), notify)
                        .await;
                    RunOutcome::Failed {
                        elapsed: started.elapsed(),
                        error,
                    }
                }
            };

            let elapsed = match &outcome {
                RunOutcome::Completed { elapsed } | RunOutcome::Failed { elapsed, .. } => *elapsed,
                RunOutcome::TimedOut { after } => *after,
            };
            if elapsed > slow_threshold {
                info!(
                    label,
                    %call_site,
                    secs = elapsed.as_secs_f64(),
                    "Function executed slowly"
                );
            } else {
                debug!(label, %call_site, ?elapsed, "Function finished");
            }
            outcome
        }
    }
}

/// `file#line` of the code that asked for a bounded run.
#[derive(Debug, Clone, Copy)]
struct CallSite {
    file: &'static str,
    line: u32,
}

impl From<&'static Location<'static>> for CallSite {
    fn from(loc: &'static Location<'static>) -> Self {
        let file = Path::new(loc.file())
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(loc.file());
        Self {
            file,
            line: loc.line(),
        }
    }
}

impl std::fmt::Display for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.file, self.line)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
