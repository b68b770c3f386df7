//! Per-operation-name gate (spec §4.6, §9).
//!
//! Both controllers dispatch every side-effecting backend call through
//! [`Scheduler::run`]. `name` is a deterministic string built by the caller
//! (`"create-<key>[<uid>]"`, `"delete-<name>[<uid>]"`) so that two racing
//! reconciles of the same key collapse onto the same gate entry instead of
//! double-issuing a CSI RPC. A resubmission while the operation is already
//! running is rejected with `AlreadyRunning`; a resubmission shortly after a
//! terminal failure is rejected with `Backoff` until the exponential window
//! elapses. Both statuses are swallowed by the caller, not surfaced to the
//! user — they exist purely to prevent concurrent double-issue.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

struct OperationState {
    running: bool,
    last_failure: Option<Instant>,
    backoff: Duration,
}

impl Default for OperationState {
    fn default() -> Self {
        OperationState {
            running: false,
            last_failure: None,
            backoff: INITIAL_BACKOFF,
        }
    }
}

/// The at-most-one-concurrent-execution-per-name gate described in spec §9.
#[derive(Default)]
pub struct Scheduler {
    operations: Mutex<HashMap<String, OperationState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler::default()
    }

    /// Run `fut` under the gate for `name`. Returns `AlreadyRunning` or
    /// `Backoff` without calling `fut` at all when the gate refuses; on
    /// `fut` returning `Err`, the failure's backoff window widens
    /// (exponentially, capped) before the next attempt is allowed.
    pub async fn run<F, T>(&self, name: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        {
            let mut ops = self.operations.lock().unwrap();
            let state = ops.entry(name.to_string()).or_default();
            if state.running {
                return Err(Error::AlreadyRunning(name.to_string()));
            }
            if let Some(last_failure) = state.last_failure {
                if last_failure.elapsed() < state.backoff {
                    return Err(Error::Backoff(name.to_string()));
                }
            }
            state.running = true;
        }

        let result = fut.await;

        let mut ops = self.operations.lock().unwrap();
        if let Some(state) = ops.get_mut(name) {
            state.running = false;
            match &result {
                Ok(_) => {
                    state.last_failure = None;
                    state.backoff = INITIAL_BACKOFF;
                }
                Err(_) => {
                    state.last_failure = Some(Instant::now());
                    state.backoff = (state.backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
        result
    }
}

/// Deterministic gate name for a create operation (spec §4.6).
pub fn create_operation_name(key: &str, uid: &str) -> String {
    format!("create-{key}[{uid}]")
}

/// Deterministic gate name for a delete operation (spec §4.6).
pub fn delete_operation_name(name: &str, uid: &str) -> String {
    format!("delete-{name}[{uid}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// §8 round-trip property: two concurrent submissions invoke `fn`
    /// exactly once while the first is running.
    #[tokio::test]
    async fn concurrent_submission_runs_fn_once() {
        let scheduler = Arc::new(Scheduler::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let calls_a = calls.clone();
        let scheduler_a = scheduler.clone();
        let first = tokio::spawn(async move {
            scheduler_a
                .run("op-1", async {
                    calls_a.fetch_add(1, Ordering::SeqCst);
                    rx.await.ok();
                    Ok::<_, Error>(())
                })
                .await
        });

        tokio::task::yield_now().await;
        let second = scheduler.run("op-1", async { Ok::<_, Error>(()) }).await;
        assert!(matches!(second, Err(Error::AlreadyRunning(_))));

        tx.send(()).unwrap();
        first.await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_rejected_during_backoff_window() {
        let scheduler = Scheduler::new();
        let first = scheduler
            .run("op-2", async { Err::<(), _>(Error::Other("boom".into())) })
            .await;
        assert!(first.is_err());

        let second = scheduler.run("op-2", async { Ok::<_, Error>(()) }).await;
        assert!(matches!(second, Err(Error::Backoff(_))));
    }

    #[tokio::test]
    async fn success_clears_backoff() {
        let scheduler = Scheduler::new();
        scheduler.run("op-3", async { Ok::<_, Error>(()) }).await.unwrap();
        let second = scheduler.run("op-3", async { Ok::<_, Error>(()) }).await;
        assert!(second.is_ok());
    }
}
