//! Periodic action module.
//!
//! # Responsibilities
//! - Invoke an action every interval until stopped
//! - Stop at the first failing action and return its error
//!
//! # Design Decisions
//! - Interval and action are mandatory; `init` names the missing one
//! - Actions never overlap: the loop awaits each invocation before the next
//!   tick is considered, and missed ticks are delayed rather than burst
//! - First invocation happens one interval after `run` starts

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::time::{self, MissedTickBehavior};

use crate::error::{BoxError, Error, Result};
use crate::lifecycle::{lock_slot, slot_mut, Lifecycle, Module, RunEntry};
use crate::observability::metrics;
use crate::option::{apply_options, Opt, Pending};

pub const ID: &str = "ticker";

/// Boxed periodic action.
pub type Action = Box<dyn FnMut() -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send>;

/// Settings filled in by ticker options.
#[derive(Default)]
pub struct TickerSettings {
    interval: Option<Duration>,
    action: Option<Action>,
}

/// Option type for [`Ticker`].
pub type TickerOpt = Opt<TickerSettings>;

/// Runs an action periodically.
pub struct Ticker {
    lifecycle: Lifecycle,
    opts: Pending<TickerSettings>,
    interval: Duration,
    action: Mutex<Option<Action>>,
}

impl Ticker {
    /// Create a ticker. [`with_interval`] and [`with_action`] are mandatory.
    pub fn new(opts: impl IntoIterator<Item = TickerOpt>) -> Self {
        Self::named(ID, opts)
    }

    /// Create a ticker reporting `name` as its id.
    pub fn named(name: impl Into<String>, opts: impl IntoIterator<Item = TickerOpt>) -> Self {
        Self {
            lifecycle: Lifecycle::new(name),
            opts: Pending::new(opts),
            interval: Duration::ZERO,
            action: Mutex::new(None),
        }
    }

    /// Interval resolved during `init`.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn take_action(&self) -> Option<Action> {
        lock_slot(&self.action).take()
    }

    fn configure(&mut self) -> Result<()> {
        let mut settings = TickerSettings::default();
        apply_options(&mut settings, self.opts.take())?;

        let interval = settings.interval.ok_or(Error::MissingInterval)?;
        let action = settings.action.ok_or(Error::MissingAction)?;

        self.interval = interval;
        *slot_mut(&mut self.action) = Some(action);
        Ok(())
    }
}

#[async_trait]
impl Module for Ticker {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    async fn init(&mut self) -> Result<()> {
        self.lifecycle.begin_init()?;
        let result = self.configure();
        self.lifecycle.finish_init(result)
    }

    async fn run(&self) -> Result<()> {
        if self.lifecycle.enter_run()? == RunEntry::AlreadyStopped {
            return Ok(());
        }
        let Some(mut action) = self.take_action() else {
            return Ok(());
        };

        tracing::info!(module = %self.id(), interval = ?self.interval, "Ticker starting");

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.lifecycle.stopped() => {
                    tracing::info!(module = %self.id(), "Ticker received stop signal, exiting loop");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let started = Instant::now();
                    let outcome = action().await;
                    metrics::record_action(self.id(), outcome.is_ok(), started.elapsed());
                    if let Err(e) = outcome {
                        return Err(Error::Run(e));
                    }
                }
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        self.lifecycle.stop();
        drop(self.take_action());
        Ok(())
    }
}

/// Set the tick interval. Must be non-zero.
pub fn with_interval(interval: Duration) -> TickerOpt {
    with_interval_fn(move || Ok::<_, BoxError>(interval))
}

/// Set the tick interval from a fallible factory.
pub fn with_interval_fn<F, E>(factory: F) -> TickerOpt
where
    F: FnOnce() -> std::result::Result<Duration, E> + Send + 'static,
    E: Into<BoxError>,
{
    Opt::new(move |settings: &mut TickerSettings| {
        let interval = factory().map_err(Into::<BoxError>::into)?;
        if interval.is_zero() {
            return Err("ticker interval must be non-zero".into());
        }
        settings.interval = Some(interval);
        Ok(())
    })
}

/// Set the action invoked on every tick. A failing action ends `run`.
pub fn with_action<F, Fut, E>(mut action: F) -> TickerOpt
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    let boxed: Action = Box::new(move || -> BoxFuture<'static, std::result::Result<(), BoxError>> {
        let fut = action();
        Box::pin(async move { fut.await.map_err(Into::<BoxError>::into) })
    });
    Opt::value(boxed, |settings: &mut TickerSettings, action| {
        settings.action = Some(action)
    })
}
