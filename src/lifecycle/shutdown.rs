//! Stop signalling and bounded draining.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{Error, Result};

/// One-shot "stop requested" broadcast.
///
/// Firing is guarded by an atomic flag, so any number of `fire` calls from
/// any task are safe and only the first one has an effect. Waiters never
/// poll: they park on a watch channel whose value flips to `true` once.
#[derive(Debug)]
pub struct DoneSignal {
    fired: AtomicBool,
    tx: watch::Sender<bool>,
}

impl DoneSignal {
    /// Create an unfired signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            fired: AtomicBool::new(false),
            tx,
        }
    }

    /// Fire the signal. Returns `true` for the call that actually fired it.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.tx.send_replace(true);
        true
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolve once the signal has fired. Resolves immediately if it already has.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once fired.
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// An owned waiter that can be moved into a spawned task.
    pub fn waiter(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            // Sender dropped means the owning module is gone, treat as fired.
            let _ = rx.wait_for(|fired| *fired).await;
        }
    }
}

impl Default for DoneSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do with in-flight work when draining exceeds its deadline.
///
/// Either way `stop` reports [`Error::ShutdownTimeout`] and the module is
/// considered terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Release `run` right away and drop what can be dropped. Work still
    /// running in detached tasks is left to finish on its own.
    #[default]
    Abandon,
    /// Keep `run` blocked until in-flight work finishes by itself.
    Wait,
}

/// Await `drain` for at most `timeout`.
pub async fn drain_within<F>(timeout: Duration, drain: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::time::timeout(timeout, drain)
        .await
        .map_err(|_| Error::ShutdownTimeout(timeout))
}

/// Run a blocking shutdown step on the blocking pool, bounded by `timeout`.
///
/// A step that outlives the deadline keeps running on its blocking thread;
/// there is no forced interruption.
pub async fn blocking_within<F>(timeout: Duration, step: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(step);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(Error::Shutdown(Box::new(join))),
        Err(_) => Err(Error::ShutdownTimeout(timeout)),
    }
}

/// Two-step shutdown of a telemetry pipeline.
pub(crate) trait Flushable: Send + 'static {
    fn flush(&self) -> Result<()>;
    fn shutdown(&self) -> Result<()>;
}

/// Flush, then shut down, both always, within `timeout`.
pub(crate) async fn flush_and_shutdown<P: Flushable>(provider: P, timeout: Duration) -> Result<()> {
    blocking_within(timeout, move || {
        let flushed = provider.flush();
        let shut = provider.shutdown();
        Error::join([flushed, shut])
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn fire_is_one_shot() {
        let done = DoneSignal::new();
        assert!(!done.is_fired());
        assert!(done.fire());
        assert!(!done.fire());
        assert!(done.is_fired());
    }

    #[tokio::test]
    async fn wait_after_fire_returns_immediately() {
        let done = DoneSignal::new();
        done.fire();
        tokio::time::timeout(Duration::from_millis(100), done.wait())
            .await
            .expect("wait should resolve once fired");
    }

    #[tokio::test]
    async fn fire_wakes_waiters_on_other_tasks() {
        let done = Arc::new(DoneSignal::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let done = done.clone();
                tokio::spawn(async move { done.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        done.fire();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter released")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn drain_within_reports_deadline() {
        let err = drain_within(Duration::from_millis(20), std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ShutdownTimeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn blocking_within_passes_step_result() {
        blocking_within(Duration::from_secs(1), || Ok(())).await.unwrap();
        let err = blocking_within(Duration::from_secs(1), || Err(Error::MissingAction))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingAction));
    }

    #[tokio::test]
    async fn blocking_within_reports_deadline_without_waiting_for_step() {
        let started = std::time::Instant::now();
        let err = blocking_within(Duration::from_millis(50), || {
            std::thread::sleep(Duration::from_millis(400));
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::ShutdownTimeout(d) if d == Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[derive(Clone, Default)]
    struct Faulty {
        flush_fails: bool,
        shutdown_fails: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Flushable for Faulty {
        fn flush(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.flush_fails {
                return Err(Error::Flush("exporter unreachable".into()));
            }
            Ok(())
        }

        fn shutdown(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.shutdown_fails {
                return Err(Error::Shutdown("already shut down".into()));
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_runs_after_failed_flush() {
        let faulty = Faulty {
            flush_fails: true,
            shutdown_fails: true,
            ..Default::default()
        };
        let calls = faulty.calls.clone();

        let err = flush_and_shutdown(faulty, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(err, Error::Joined(ref v) if v.len() == 2));
        assert!(err.any(|e| matches!(e, Error::Flush(_))));
        assert!(err.any(|e| matches!(e, Error::Shutdown(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn single_failure_is_not_wrapped() {
        let faulty = Faulty {
            flush_fails: true,
            ..Default::default()
        };
        let err = flush_and_shutdown(faulty, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Flush(_)));
    }
}
