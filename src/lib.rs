//! Lifecycle-managed service modules.
//!
//! Each module wraps one long-lived resource (HTTP listener, OS signals,
//! periodic action, SQLite connection, tracer and logger providers,
//! Prometheus endpoint)
//! behind the same [`Module`] contract: `init` once, `run` until stopped,
//! `stop` from anywhere, as often as you like.

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod option;
pub mod stopper;
pub mod ticker;

pub use db::Database;
pub use error::{BoxError, Error, Result};
pub use http::HttpServer;
#[cfg(unix)]
pub use lifecycle::signals::SignalListener;
pub use lifecycle::{Lifecycle, LifecycleState, Module, ShutdownPolicy};
pub use observability::{LogProvider, MetricsExporter, TraceProvider};
pub use option::Opt;
pub use stopper::Stopper;
pub use ticker::Ticker;
