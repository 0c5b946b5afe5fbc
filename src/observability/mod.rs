//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every module produces:
//!     → logging.rs (structured log events)
//!     → metrics.rs (lifecycle counters, ticker histograms)
//!
//! Telemetry modules export:
//!     → trace.rs (OpenTelemetry tracer provider: OTLP/HTTP or log)
//!     → logs.rs (OpenTelemetry logger provider, fed by bridge.rs)
//!     → prometheus.rs (scrape endpoint for the metrics facade)
//!
//! All of them install through registry.rs (process globals or a local registry)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments) and no-ops until a recorder exists
//! - Registration target is injected, never hard-wired

pub mod bridge;
pub mod logging;
pub mod logs;
pub mod metrics;
pub mod prometheus;
pub mod registry;
pub mod trace;

pub use bridge::LogBridge;
pub use logging::init_logging;
pub use logs::{LogProvider, StdoutLogExporter};
pub use prometheus::MetricsExporter;
pub use registry::{global_logger, GlobalRegistry, LocalRegistry, Propagator, TelemetryRegistry};
pub use trace::{ExporterKind, LogSpanExporter, TraceProvider};
