//! Per-module lifecycle state machine.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{Error, Result};
use crate::lifecycle::shutdown::DoneSignal;
use crate::observability::metrics;

/// Lifecycle state of a module instance.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Constructed = 0,
    Initialized = 1,
    Running = 2,
    Stopped = 3,
    /// `init` failed; the module is unusable but `stop` stays safe.
    Failed = 4,
}

impl From<u8> for LifecycleState {
    fn from(val: u8) -> Self {
        match val {
            1 => LifecycleState::Initialized,
            2 => LifecycleState::Running,
            3 => LifecycleState::Stopped,
            4 => LifecycleState::Failed,
            _ => LifecycleState::Constructed,
        }
    }
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Constructed => "constructed",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        }
    }
}

/// Outcome of [`Lifecycle::enter_run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEntry {
    /// The caller owns the run loop.
    Start,
    /// `stop` already happened; `run` must return `Ok(())` right away.
    AlreadyStopped,
}

/// State plus done signal, embedded by every module.
///
/// ```text
/// Constructed ──init ok──▶ Initialized ──run──▶ Running
///      │                        │                  │
///      └──init err──▶ Failed    └──────stop────────┴──▶ Stopped
/// ```
#[derive(Debug)]
pub struct Lifecycle {
    id: String,
    state: AtomicU8,
    done: DoneSignal,
}

impl Lifecycle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: AtomicU8::new(LifecycleState::Constructed as u8),
            done: DoneSignal::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::SeqCst))
    }

    /// The done signal of the current cycle.
    pub fn done(&self) -> &DoneSignal {
        &self.done
    }

    /// Start `init`, refusing a second cycle.
    ///
    /// The done signal is armed at construction and a module never gets a
    /// second cycle, so a signal is never reused. A `stop` that races ahead
    /// of `init` stays fired and the later `run` returns immediately.
    pub fn begin_init(&self) -> Result<()> {
        if self.state() != LifecycleState::Constructed {
            return Err(Error::AlreadyInitialized(self.id.clone()));
        }
        Ok(())
    }

    /// Record the outcome of `init`, passing the result through.
    pub fn finish_init(&self, result: Result<()>) -> Result<()> {
        match &result {
            Ok(()) => self.transition(LifecycleState::Constructed, LifecycleState::Initialized),
            Err(e) => {
                tracing::debug!(module = %self.id, error = %e, "Init failed");
                self.transition(LifecycleState::Constructed, LifecycleState::Failed)
            }
        };
        result
    }

    /// Claim the run loop.
    pub fn enter_run(&self) -> Result<RunEntry> {
        match self.state.compare_exchange(
            LifecycleState::Initialized as u8,
            LifecycleState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                self.record(LifecycleState::Running);
                Ok(RunEntry::Start)
            }
            Err(current) => match LifecycleState::from(current) {
                LifecycleState::Stopped => Ok(RunEntry::AlreadyStopped),
                LifecycleState::Running => Err(Error::AlreadyRunning(self.id.clone())),
                LifecycleState::Constructed | LifecycleState::Failed | LifecycleState::Initialized => {
                    Err(Error::NotInitialized(self.id.clone()))
                }
            },
        }
    }

    /// Fire the done signal and move to `Stopped`.
    ///
    /// Returns `true` only for the first call; later calls are no-ops.
    /// A failed or never-initialized module stays in its state but the
    /// signal is still fired.
    pub fn stop(&self) -> bool {
        let first = self.done.fire();
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            match LifecycleState::from(current) {
                LifecycleState::Initialized | LifecycleState::Running => {}
                _ => break,
            }
            match self.state.compare_exchange(
                current,
                LifecycleState::Stopped as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.record(LifecycleState::Stopped);
                    break;
                }
                Err(actual) => current = actual,
            }
        }
        first
    }

    /// Resolve once `stop` has been called.
    pub async fn stopped(&self) {
        self.done.wait().await
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) {
        if self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.record(to);
        }
    }

    fn record(&self, to: LifecycleState) {
        tracing::debug!(module = %self.id, state = to.as_str(), "Lifecycle transition");
        metrics::record_transition(&self.id, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized(id: &str) -> Lifecycle {
        let lc = Lifecycle::new(id);
        lc.begin_init().unwrap();
        lc.finish_init(Ok(())).unwrap();
        lc
    }

    #[test]
    fn init_happens_once() {
        let lc = initialized("m");
        assert_eq!(lc.state(), LifecycleState::Initialized);
        assert!(matches!(lc.begin_init(), Err(Error::AlreadyInitialized(_))));
    }

    #[test]
    fn failed_init_is_terminal() {
        let lc = Lifecycle::new("m");
        lc.begin_init().unwrap();
        assert!(lc.finish_init(Err(Error::MissingAction)).is_err());
        assert_eq!(lc.state(), LifecycleState::Failed);
        assert!(matches!(lc.enter_run(), Err(Error::NotInitialized(_))));
        assert!(lc.stop());
        assert_eq!(lc.state(), LifecycleState::Failed);
    }

    #[test]
    fn run_is_exclusive() {
        let lc = initialized("m");
        assert_eq!(lc.enter_run().unwrap(), RunEntry::Start);
        assert!(matches!(lc.enter_run(), Err(Error::AlreadyRunning(_))));
    }

    #[test]
    fn stop_before_run() {
        let lc = initialized("m");
        assert!(lc.stop());
        assert!(!lc.stop());
        assert_eq!(lc.state(), LifecycleState::Stopped);
        assert_eq!(lc.enter_run().unwrap(), RunEntry::AlreadyStopped);
    }

    #[test]
    fn run_without_init() {
        let lc = Lifecycle::new("m");
        assert!(matches!(lc.enter_run(), Err(Error::NotInitialized(_))));
    }

    #[test]
    fn state_roundtrips_through_u8() {
        for state in [
            LifecycleState::Constructed,
            LifecycleState::Initialized,
            LifecycleState::Running,
            LifecycleState::Stopped,
            LifecycleState::Failed,
        ] {
            assert_eq!(LifecycleState::from(state as u8), state);
        }
    }
}
