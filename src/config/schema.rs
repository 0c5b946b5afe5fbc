//! Configuration schema definitions.
//!
//! One section per module. Every section converts into that module's options,
//! so values from a file are just another option source next to code.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::{self, DbOpt};
use crate::http::{self, HttpOpt};
use crate::lifecycle::ShutdownPolicy;
use crate::observability::logs::{self, LogOpt};
use crate::observability::prometheus::{self, MetricsOpt};
use crate::observability::trace::{self, TraceOpt};
use crate::ticker::{self, TickerOpt};

/// Root configuration for the demonstration binary.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ModulesConfig {
    pub http: HttpConfig,
    pub ticker: TickerConfig,
    pub database: DatabaseConfig,
    pub telemetry: TelemetryConfig,
    pub logs: LogsConfig,
    pub metrics: MetricsConfig,
    pub signals: SignalsConfig,
}

/// HTTP server section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    pub shutdown_timeout_secs: u64,

    pub shutdown_policy: ShutdownPolicy,

    /// Per-request timeout; unset disables it.
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: http::server::DEFAULT_ADDR.to_string(),
            shutdown_timeout_secs: http::server::DEFAULT_SHUTDOWN_TIMEOUT.as_secs(),
            shutdown_policy: ShutdownPolicy::default(),
            request_timeout_secs: None,
        }
    }
}

impl HttpConfig {
    /// Server options for this section. The router is supplied by the caller.
    pub fn options(&self) -> Vec<HttpOpt> {
        let mut opts = vec![
            http::with_addr(self.bind_address.clone()),
            http::with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs)),
            http::with_shutdown_policy(self.shutdown_policy),
        ];
        if let Some(secs) = self.request_timeout_secs {
            opts.push(http::with_request_timeout(Duration::from_secs(secs)));
        }
        opts
    }
}

/// Periodic action section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TickerConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 1_000,
        }
    }
}

impl TickerConfig {
    /// Ticker options for this section. The action is supplied by the caller.
    pub fn options(&self) -> Vec<TickerOpt> {
        vec![ticker::with_interval(Duration::from_millis(self.interval_ms))]
    }
}

/// Database section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,

    /// File path, or ":memory:" for a private in-memory database.
    pub path: String,

    pub trace_statements: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: ":memory:".to_string(),
            trace_statements: false,
        }
    }
}

impl DatabaseConfig {
    pub fn options(&self) -> Vec<DbOpt> {
        let mut opts = vec![if self.path == ":memory:" {
            db::with_in_memory()
        } else {
            db::with_path(self.path.clone())
        }];
        if self.trace_statements {
            opts.push(db::with_statement_tracing());
        }
        opts
    }
}

/// Span exporter selection for the telemetry section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceExporter {
    /// Decide from the `OTEL_EXPORTER_OTLP_*PROTOCOL` variables.
    #[default]
    Env,
    Http,
    Log,
}

/// Trace provider section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub exporter: TraceExporter,

    /// OTLP traces URL; only used with the `http` exporter.
    pub endpoint: Option<String>,

    pub shutdown_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            exporter: TraceExporter::default(),
            endpoint: None,
            shutdown_timeout_secs: trace::DEFAULT_SHUTDOWN_TIMEOUT.as_secs(),
        }
    }
}

impl TelemetryConfig {
    pub fn options(&self) -> Vec<TraceOpt> {
        let exporter = match (self.exporter, &self.endpoint) {
            (TraceExporter::Env, _) => trace::with_env(),
            (TraceExporter::Http, Some(endpoint)) => trace::with_http_endpoint(endpoint.clone()),
            (TraceExporter::Http, None) => trace::with_http(),
            (TraceExporter::Log, _) => trace::with_log_exporter(),
        };
        vec![
            exporter,
            trace::with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs)),
        ]
    }
}

/// Log record exporter selection for the logs section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogExporter {
    /// Decide from the `OTEL_EXPORTER_OTLP_*PROTOCOL` variables.
    #[default]
    Env,
    Http,
    Stdout,
}

/// Log provider section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogsConfig {
    pub enabled: bool,
    pub exporter: LogExporter,

    /// OTLP logs URL; only used with the `http` exporter.
    pub endpoint: Option<String>,

    /// Instrumentation scope; unset uses `OTEL_SERVICE_NAME` or the crate name.
    pub scope: Option<String>,

    pub shutdown_timeout_secs: u64,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            exporter: LogExporter::default(),
            endpoint: None,
            scope: None,
            shutdown_timeout_secs: logs::DEFAULT_SHUTDOWN_TIMEOUT.as_secs(),
        }
    }
}

impl LogsConfig {
    pub fn options(&self) -> Vec<LogOpt> {
        let exporter = match (self.exporter, &self.endpoint) {
            (LogExporter::Env, _) => logs::with_env(),
            (LogExporter::Http, Some(endpoint)) => logs::with_http_endpoint(endpoint.clone()),
            (LogExporter::Http, None) => logs::with_http(),
            (LogExporter::Stdout, _) => logs::with_stdout_exporter(),
        };
        let mut opts = vec![
            exporter,
            logs::with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs)),
        ];
        if let Some(scope) = &self.scope {
            opts.push(logs::with_scope(scope.clone()));
        }
        opts
    }
}

/// Prometheus exporter section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub bind_address: String,

    /// Histogram bucket bounds; unset renders summaries.
    pub buckets: Option<Vec<f64>>,

    pub shutdown_timeout_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: prometheus::DEFAULT_ADDR.to_string(),
            buckets: None,
            shutdown_timeout_secs: prometheus::DEFAULT_SHUTDOWN_TIMEOUT.as_secs(),
        }
    }
}

impl MetricsConfig {
    pub fn options(&self) -> Vec<MetricsOpt> {
        let mut opts = vec![
            prometheus::with_addr(self.bind_address.clone()),
            prometheus::with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs)),
        ];
        if let Some(buckets) = &self.buckets {
            opts.push(prometheus::with_buckets(buckets.clone()));
        }
        opts
    }
}

/// Signal listener section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalsConfig {
    pub enabled: bool,

    /// Signal names: interrupt, terminate, hangup, quit, user1, user2.
    /// Empty means interrupt and terminate.
    pub signals: Vec<String>,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signals: Vec::new(),
        }
    }
}

pub const SIGNAL_NAMES: &[&str] = &["interrupt", "terminate", "hangup", "quit", "user1", "user2"];

#[cfg(unix)]
impl SignalsConfig {
    /// Resolve the configured names. Unknown names are skipped; validation
    /// reports them before this is reached.
    pub fn kinds(&self) -> Vec<tokio::signal::unix::SignalKind> {
        use tokio::signal::unix::SignalKind;

        self.signals
            .iter()
            .filter_map(|name| match name.as_str() {
                "interrupt" => Some(SignalKind::interrupt()),
                "terminate" => Some(SignalKind::terminate()),
                "hangup" => Some(SignalKind::hangup()),
                "quit" => Some(SignalKind::quit()),
                "user1" => Some(SignalKind::user_defined1()),
                "user2" => Some(SignalKind::user_defined2()),
                _ => None,
            })
            .collect()
    }
}
