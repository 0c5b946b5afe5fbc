//! OS signal listener module.
//!
//! # Responsibilities
//! - Register interest in a set of signals during `init`
//! - Return from `run` on the first delivered signal, or on `stop`
//! - Unregister on `stop`
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Registration happens in `init`, so a signal arriving before `run` is
//!   buffered by the stream and not lost
//! - Signalled and stopped are both normal termination; `run` returns
//!   `Ok(())` either way

use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::future::select_all;
use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::error::{Error, Result};
use crate::lifecycle::{lock_slot, slot_mut, Lifecycle, Module, RunEntry};

pub const ID: &str = "signal";

/// Signals listened to when none are supplied.
pub fn default_signals() -> Vec<SignalKind> {
    vec![SignalKind::interrupt(), SignalKind::terminate()]
}

/// Listens for OS signals.
pub struct SignalListener {
    lifecycle: Lifecycle,
    kinds: Vec<SignalKind>,
    streams: Mutex<Option<Vec<Signal>>>,
}

impl SignalListener {
    /// Listen for SIGINT and SIGTERM.
    pub fn new() -> Self {
        Self::with_signals(Vec::new())
    }

    /// Listen for the given signals. An empty set falls back to [`default_signals`].
    pub fn with_signals(kinds: impl IntoIterator<Item = SignalKind>) -> Self {
        let mut kinds: Vec<SignalKind> = kinds.into_iter().collect();
        if kinds.is_empty() {
            kinds = default_signals();
        }
        Self {
            lifecycle: Lifecycle::new(ID),
            kinds,
            streams: Mutex::new(None),
        }
    }

    pub fn signals(&self) -> &[SignalKind] {
        &self.kinds
    }

    fn take_streams(&self) -> Option<Vec<Signal>> {
        lock_slot(&self.streams).take()
    }
}

impl Default for SignalListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for SignalListener {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    async fn init(&mut self) -> Result<()> {
        self.lifecycle.begin_init()?;
        let registered = self
            .kinds
            .iter()
            .map(|kind| signal(*kind).map_err(Error::Signal))
            .collect::<Result<Vec<_>>>();

        let result = registered.map(|streams| {
            *slot_mut(&mut self.streams) = Some(streams);
            tracing::info!(module = ID, signals = ?self.kinds, "Signal listener registered");
        });
        self.lifecycle.finish_init(result)
    }

    async fn run(&self) -> Result<()> {
        if self.lifecycle.enter_run()? == RunEntry::AlreadyStopped {
            return Ok(());
        }
        let Some(mut streams) = self.take_streams() else {
            return Ok(());
        };

        let delivered = select_all(streams.iter_mut().map(|s| Box::pin(s.recv())));
        tokio::select! {
            biased;
            _ = self.lifecycle.stopped() => {}
            (_, index, _) = delivered => {
                tracing::info!(module = ID, signal = ?self.kinds[index], "Signal received");
            }
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.lifecycle.stop();
        // Dropping the streams unregisters interest.
        drop(self.take_streams());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::sync::Arc;
    use std::time::Duration;

    fn raise(sig: &str) {
        let status = Command::new("kill")
            .args([format!("-{sig}"), std::process::id().to_string()])
            .status()
            .expect("kill available");
        assert!(status.success());
    }

    #[test]
    fn empty_set_uses_defaults() {
        let l = SignalListener::with_signals([]);
        assert_eq!(l.signals(), default_signals().as_slice());
    }

    #[tokio::test]
    async fn returns_on_signal_delivered_before_run() {
        let mut l = SignalListener::with_signals([SignalKind::user_defined1()]);
        l.init().await.unwrap();
        raise("USR1");

        tokio::time::timeout(Duration::from_secs(5), l.run())
            .await
            .expect("run returns after signal")
            .unwrap();
        l.stop().await.unwrap();
    }

    #[tokio::test]
    async fn returns_on_stop() {
        let mut l = SignalListener::with_signals([SignalKind::user_defined2()]);
        l.init().await.unwrap();
        let l = Arc::new(l);

        let runner = tokio::spawn({
            let l = l.clone();
            async move { l.run().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        l.stop().await.unwrap();
        l.stop().await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("run released")
            .unwrap()
            .unwrap();
        assert_eq!(l.id(), "signal");
    }
}
