//! OpenTelemetry logger provider as a module.
//!
//! # Data Flow
//! ```text
//! init:  options (default: with_env) → provider → logger(scope) → registry
//! run:   wait for stop
//! stop:  force_flush → shutdown (both always, bounded, errors joined)
//! ```
//!
//! Records reach the logger through [`super::LogBridge`], which turns
//! `tracing` events into log records.
//!
//! # Design Decisions
//! - Exporter selection mirrors the trace provider, reading
//!   `OTEL_EXPORTER_OTLP_LOGS_PROTOCOL` first; anything but `http` writes
//!   records to stdout

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::logs::{AnyValue, LoggerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::export::logs::{LogBatch, LogExporter};
use opentelemetry_sdk::logs::{LogError, LogResult, LoggerProvider};
use opentelemetry_sdk::runtime;

use crate::error::{BoxError, Error, Result};
use crate::lifecycle::shutdown::{flush_and_shutdown, Flushable};
use crate::lifecycle::{lock_slot, slot_mut, Lifecycle, Module, RunEntry};
use crate::observability::registry::{GlobalRegistry, TelemetryRegistry};
use crate::observability::trace::{ExporterKind, GRPC_UNSUPPORTED};
use crate::option::{apply_options, Opt, Pending};

pub const ID: &str = "logs";

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub const LOGS_PROTOCOL_ENV: &str = "OTEL_EXPORTER_OTLP_LOGS_PROTOCOL";

/// Instrumentation scope used when neither [`with_scope`] nor
/// `OTEL_SERVICE_NAME` names one.
pub const DEFAULT_SCOPE: &str = "service-mods";

/// Settings filled in by log provider options.
pub struct LogSettings {
    provider: Option<LoggerProvider>,
    scope: String,
    registry: Arc<dyn TelemetryRegistry>,
    shutdown_timeout: Duration,
}

impl Default for LogSettings {
    fn default() -> Self {
        let scope = std::env::var("OTEL_SERVICE_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SCOPE.to_string());
        Self {
            provider: None,
            scope,
            registry: Arc::new(GlobalRegistry),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Option type for [`LogProvider`].
pub type LogOpt = Opt<LogSettings>;

/// Logger provider wrapped as a module.
pub struct LogProvider {
    lifecycle: Lifecycle,
    opts: Pending<LogSettings>,
    shutdown_timeout: Duration,
    provider: Mutex<Option<LoggerProvider>>,
}

impl LogProvider {
    /// Create the module. Without options it behaves as `new([with_env()])`.
    pub fn new(opts: impl IntoIterator<Item = LogOpt>) -> Self {
        Self {
            lifecycle: Lifecycle::new(ID),
            opts: Pending::or_defaults(opts, || vec![with_env()]),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            provider: Mutex::new(None),
        }
    }

    /// The installed provider, until `stop`.
    pub fn provider(&self) -> Option<LoggerProvider> {
        lock_slot(&self.provider).clone()
    }

    fn configure(&mut self) -> Result<()> {
        let mut settings = LogSettings::default();
        apply_options(&mut settings, self.opts.take())?;

        let provider = settings.provider.ok_or(Error::MissingProvider("log"))?;
        settings
            .registry
            .install_logger(provider.logger(settings.scope.clone()))?;
        tracing::info!(module = %self.lifecycle.id(), scope = %settings.scope, "Logger provider installed");

        self.shutdown_timeout = settings.shutdown_timeout;
        *slot_mut(&mut self.provider) = Some(provider);
        Ok(())
    }
}

#[async_trait]
impl Module for LogProvider {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    async fn init(&mut self) -> Result<()> {
        self.lifecycle.begin_init()?;
        let result = self.configure();
        self.lifecycle.finish_init(result)
    }

    async fn run(&self) -> Result<()> {
        if self.lifecycle.enter_run()? == RunEntry::Start {
            self.lifecycle.stopped().await;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.lifecycle.stop();
        let provider = lock_slot(&self.provider).take();
        match provider {
            None => Ok(()),
            Some(provider) => {
                let result = flush_and_shutdown(provider, self.shutdown_timeout).await;
                if let Err(e) = &result {
                    tracing::warn!(module = %self.id(), error = %e, "Logger provider shutdown failed");
                }
                result
            }
        }
    }
}

impl Flushable for LoggerProvider {
    fn flush(&self) -> Result<()> {
        Error::join(
            self.force_flush()
                .into_iter()
                .map(|r| r.map_err(|e| Error::Flush(Box::new(e)))),
        )
    }

    fn shutdown(&self) -> Result<()> {
        LoggerProvider::shutdown(self).map_err(|e| Error::Shutdown(Box::new(e)))
    }
}

/// Log exporter writing one line per record to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutLogExporter;

pub(crate) fn body_text(body: Option<&AnyValue>) -> String {
    match body {
        None => String::new(),
        Some(AnyValue::String(s)) => s.as_str().to_string(),
        Some(AnyValue::Int(v)) => v.to_string(),
        Some(AnyValue::Double(v)) => v.to_string(),
        Some(AnyValue::Boolean(v)) => v.to_string(),
        Some(other) => format!("{other:?}"),
    }
}

#[async_trait]
impl LogExporter for StdoutLogExporter {
    async fn export(&mut self, batch: LogBatch<'_>) -> LogResult<()> {
        let mut out = String::new();
        for (record, scope) in batch.iter() {
            out.push_str(&format!(
                "{} {} [{}] {}",
                record.severity_text.unwrap_or("-"),
                record.target.as_deref().unwrap_or_default(),
                scope.name(),
                body_text(record.body.as_ref()),
            ));
            for (key, value) in record.attributes_iter() {
                out.push_str(&format!(" {key}={}", body_text(Some(value))));
            }
            out.push('\n');
        }
        std::io::stdout()
            .lock()
            .write_all(out.as_bytes())
            .map_err(|e| LogError::Other(Box::new(e)))
    }
}

fn http_provider(endpoint: Option<String>) -> Result<LoggerProvider> {
    let mut builder = opentelemetry_otlp::LogExporter::builder().with_http();
    if let Some(endpoint) = endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    let exporter = builder.build().map_err(|e| Error::Exporter {
        kind: "http",
        source: Box::new(e),
    })?;
    Ok(LoggerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .build())
}

fn stdout_provider() -> LoggerProvider {
    LoggerProvider::builder()
        .with_simple_exporter(StdoutLogExporter)
        .build()
}

fn env_provider(kind: ExporterKind) -> Result<LoggerProvider> {
    match kind {
        ExporterKind::Http => http_provider(None),
        ExporterKind::Log => Ok(stdout_provider()),
        ExporterKind::Grpc => Err(Error::Exporter {
            kind: "grpc",
            source: GRPC_UNSUPPORTED.into(),
        }),
    }
}

/// Use `provider` as is.
pub fn with_provider(provider: LoggerProvider) -> LogOpt {
    with_provider_fn(move || Ok::<_, BoxError>(provider))
}

/// Use the provider returned by `factory`.
pub fn with_provider_fn<F, E>(factory: F) -> LogOpt
where
    F: FnOnce() -> std::result::Result<LoggerProvider, E> + Send + 'static,
    E: Into<BoxError>,
{
    Opt::deferred(factory, |s: &mut LogSettings, p| s.provider = Some(p))
}

/// Build a provider exporting every record to `exporter` as it is emitted.
pub fn with_exporter<X>(exporter: X) -> LogOpt
where
    X: LogExporter + 'static,
{
    with_provider_fn(move || {
        Ok::<_, BoxError>(LoggerProvider::builder().with_simple_exporter(exporter).build())
    })
}

/// Build a batching provider exporting OTLP over HTTP, configured from the
/// standard `OTEL_EXPORTER_OTLP_*` variables.
pub fn with_http() -> LogOpt {
    with_provider_fn(|| http_provider(None))
}

/// Like [`with_http`], but export to `endpoint` (full logs URL).
pub fn with_http_endpoint(endpoint: impl Into<String>) -> LogOpt {
    let endpoint = endpoint.into();
    with_provider_fn(move || http_provider(Some(endpoint)))
}

/// Build a provider writing records to stdout.
pub fn with_stdout_exporter() -> LogOpt {
    with_provider_fn(|| Ok::<_, BoxError>(stdout_provider()))
}

/// Pick the exporter from the protocol environment variables.
pub fn with_env() -> LogOpt {
    with_provider_fn(|| env_provider(ExporterKind::from_env(LOGS_PROTOCOL_ENV)))
}

/// Name the instrumentation scope of the installed logger.
pub fn with_scope(scope: impl Into<String>) -> LogOpt {
    Opt::value(scope.into(), |s: &mut LogSettings, v| s.scope = v)
}

/// Install into `registry` instead of the process-wide logger slot.
pub fn with_registry(registry: Arc<dyn TelemetryRegistry>) -> LogOpt {
    Opt::value(registry, |s: &mut LogSettings, r| s.registry = r)
}

/// Bound flush plus shutdown in `stop`.
pub fn with_shutdown_timeout(timeout: Duration) -> LogOpt {
    Opt::value(timeout, |s: &mut LogSettings, t| s.shutdown_timeout = t)
}
