//! Structured logging.
//!
//! # Responsibilities
//! - Install the process-wide `tracing` subscriber
//! - Honor `RUST_LOG`, falling back to [`DEFAULT_FILTER`]
//! - Forward events to the global OpenTelemetry logger once a
//!   [`super::LogProvider`] has installed one

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Error, Result};
use crate::observability::bridge::LogBridge;

pub const DEFAULT_FILTER: &str = "service_mods=info,tower_http=info";

/// Install the subscriber. `filter` overrides [`DEFAULT_FILTER`] when
/// `RUST_LOG` is unset.
pub fn init_logging(filter: Option<&str>) -> Result<()> {
    let fallback = filter.unwrap_or(DEFAULT_FILTER).to_string();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(fmt::layer())
        .with(LogBridge::global())
        .try_init()
        .map_err(|e| Error::Registry {
            what: "log subscriber",
            reason: e.to_string(),
        })
}
