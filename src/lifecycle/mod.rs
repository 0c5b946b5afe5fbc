//! Lifecycle contract shared by every module.
//!
//! # Data Flow
//! ```text
//! Construction:
//!     Module::new(opts) → options captured, nothing applied
//!
//! init (once):
//!     begin_init → apply options in order → acquire resource → Initialized
//!
//! run (blocks, own task):
//!     select { done signal, resource events } → Ok(()) on stop
//!
//! stop (any task, repeatable):
//!     fire done signal → release / drain within timeout → Stopped
//! ```
//!
//! # Design Decisions
//! - `init` takes `&mut self`; `run` and `stop` take `&self` so a module is
//!   shared through `Arc` between the task running it and the one stopping it
//! - Resources live in short-held mutex slots: `run` takes them out, `stop`
//!   takes them when `run` never did
//! - Stop before run is legal: `run` then returns `Ok(())` immediately
//! - A panic while a slot is held never turns into a panic in `stop`: slot
//!   locks recover the data from a poisoned mutex

pub mod shutdown;
#[cfg(unix)]
pub mod signals;
pub mod state;

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::Result;

pub use shutdown::{DoneSignal, ShutdownPolicy};
pub use state::{Lifecycle, LifecycleState, RunEntry};

/// A long-lived component driven by an external orchestrator.
#[async_trait]
pub trait Module
where
    Self: Send + Sync + 'static,
{
    /// Stable identifier for diagnostics.
    fn id(&self) -> &str;

    /// Apply options and acquire resources. Callable once.
    async fn init(&mut self) -> Result<()>;

    /// Block until stopped or until the module's own terminal condition.
    async fn run(&self) -> Result<()>;

    /// Request termination and release resources. Repeat calls return `Ok(())`.
    async fn stop(&self) -> Result<()>;
}

/// Lock a resource slot. A poisoned lock still yields the slot.
pub(crate) fn lock_slot<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive access to a resource slot, poisoned or not.
pub(crate) fn slot_mut<T>(slot: &mut Mutex<T>) -> &mut T {
    slot.get_mut().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn poisoned_slot_still_yields_its_value() {
        let slot = Arc::new(Mutex::new(Some(7)));
        let holder = slot.clone();
        let crashed = std::thread::spawn(move || {
            let _guard = holder.lock().unwrap();
            panic!("holder crashed");
        })
        .join();
        assert!(crashed.is_err());
        assert!(slot.is_poisoned());

        assert_eq!(lock_slot(&slot).take(), Some(7));
        assert_eq!(*lock_slot(&slot), None);
    }
}
