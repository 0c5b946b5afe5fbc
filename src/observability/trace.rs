//! OpenTelemetry tracer provider as a module.
//!
//! # Responsibilities
//! - Build (or adopt) an SDK tracer provider during `init`
//! - Install it, together with a text map propagator, into a registry
//! - Flush and shut the provider down on `stop`
//!
//! # Data Flow
//! ```text
//! init:  options (default: with_env) → provider + propagator → registry
//! run:   wait for stop
//! stop:  force_flush → shutdown (both always, bounded, errors joined)
//! ```
//!
//! # Design Decisions
//! - Exporter selection from `OTEL_EXPORTER_OTLP_TRACES_PROTOCOL`, then
//!   `OTEL_EXPORTER_OTLP_PROTOCOL`: `http` selects OTLP over HTTP, anything
//!   else logs spans through `tracing`; gRPC transport is not built in
//! - Flush and shutdown block, so they run on the blocking pool

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::TracerProvider;

use crate::error::{BoxError, Error, Result};
use crate::lifecycle::shutdown::{flush_and_shutdown, Flushable};
use crate::lifecycle::{lock_slot, slot_mut, Lifecycle, Module, RunEntry};
use crate::observability::registry::{GlobalRegistry, Propagator, TelemetryRegistry};
use crate::option::{apply_options, Opt, Pending};

pub const ID: &str = "trace";

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub const TRACES_PROTOCOL_ENV: &str = "OTEL_EXPORTER_OTLP_TRACES_PROTOCOL";
pub const PROTOCOL_ENV: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";

pub(crate) const GRPC_UNSUPPORTED: &str =
    "OTLP over gRPC is not built in; use with_http() or set the protocol to http/protobuf";

/// Settings filled in by trace provider options.
pub struct TraceSettings {
    provider: Option<TracerProvider>,
    propagator: Option<Propagator>,
    registry: Arc<dyn TelemetryRegistry>,
    shutdown_timeout: Duration,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            provider: None,
            propagator: None,
            registry: Arc::new(GlobalRegistry),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Option type for [`TraceProvider`].
pub type TraceOpt = Opt<TraceSettings>;

/// Tracer provider wrapped as a module.
pub struct TraceProvider {
    lifecycle: Lifecycle,
    opts: Pending<TraceSettings>,
    shutdown_timeout: Duration,
    provider: Mutex<Option<TracerProvider>>,
}

impl TraceProvider {
    /// Create the module. Without options it behaves as `new([with_env()])`.
    pub fn new(opts: impl IntoIterator<Item = TraceOpt>) -> Self {
        Self {
            lifecycle: Lifecycle::new(ID),
            opts: Pending::or_defaults(opts, || vec![with_env()]),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            provider: Mutex::new(None),
        }
    }

    /// The installed provider, until `stop`.
    pub fn provider(&self) -> Option<TracerProvider> {
        lock_slot(&self.provider).clone()
    }

    fn configure(&mut self) -> Result<()> {
        let mut settings = TraceSettings::default();
        apply_options(&mut settings, self.opts.take())?;

        let provider = settings.provider.ok_or(Error::MissingProvider("trace"))?;
        let propagator = settings.propagator.unwrap_or_else(default_propagator);

        settings.registry.install_tracer_provider(provider.clone())?;
        settings.registry.install_propagator(propagator)?;
        tracing::info!(module = %self.lifecycle.id(), "Tracer provider installed");

        self.shutdown_timeout = settings.shutdown_timeout;
        *slot_mut(&mut self.provider) = Some(provider);
        Ok(())
    }
}

fn default_propagator() -> Propagator {
    Box::new(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]))
}

#[async_trait]
impl Module for TraceProvider {
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
                    tracing::warn!(module = %self.id(), error = %e, "Tracer provider shutdown failed");
                }
                result
            }
        }
    }
}

impl Flushable for TracerProvider {
    fn flush(&self) -> Result<()> {
        Error::join(
            self.force_flush()
                .into_iter()
                .map(|r| r.map_err(|e| Error::Flush(Box::new(e)))),
        )
    }

    fn shutdown(&self) -> Result<()> {
        TracerProvider::shutdown(self).map_err(|e| Error::Shutdown(Box::new(e)))
    }
}

/// Span exporter that writes finished spans as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSpanExporter;

impl SpanExporter for LogSpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        for span in &batch {
            let duration = span
                .end_time
                .duration_since(span.start_time)
                .unwrap_or_default();
            tracing::info!(
                target: "service_mods::spans",
                trace_id = %span.span_context.trace_id(),
                span_id = %span.span_context.span_id(),
                name = %span.name,
                duration = ?duration,
                attributes = span.attributes.len(),
                "Span finished"
            );
        }
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Exporter chosen from the protocol environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterKind {
    Http,
    Grpc,
    Log,
}

impl ExporterKind {
    /// Pick an exporter from the signal-specific value, falling back to the
    /// general one. Empty values count as unset.
    pub fn select(signal: Option<&str>, general: Option<&str>) -> Self {
        let value = [signal, general]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|v| !v.is_empty())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match value.as_str() {
            "http" | "http/protobuf" => ExporterKind::Http,
            "grpc" => ExporterKind::Grpc,
            _ => ExporterKind::Log,
        }
    }

    /// Read `signal_var` (e.g. [`TRACES_PROTOCOL_ENV`]), then [`PROTOCOL_ENV`].
    pub(crate) fn from_env(signal_var: &str) -> Self {
        let signal = std::env::var(signal_var).ok();
        let general = std::env::var(PROTOCOL_ENV).ok();
        Self::select(signal.as_deref(), general.as_deref())
    }
}

fn http_provider(endpoint: Option<String>) -> Result<TracerProvider> {
    let mut builder = opentelemetry_otlp::SpanExporter::builder().with_http();
    if let Some(endpoint) = endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    let exporter = builder.build().map_err(|e| Error::Exporter {
        kind: "http",
        source: Box::new(e),
    })?;
    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .build())
}

fn log_provider() -> TracerProvider {
    TracerProvider::builder()
        .with_simple_exporter(LogSpanExporter)
        .build()
}

/// Use `provider` as is.
pub fn with_provider(provider: TracerProvider) -> TraceOpt {
    with_provider_fn(move || Ok::<_, BoxError>(provider))
}

/// Use the provider returned by `factory`.
pub fn with_provider_fn<F, E>(factory: F) -> TraceOpt
where
    F: FnOnce() -> std::result::Result<TracerProvider, E> + Send + 'static,
    E: Into<BoxError>,
{
    Opt::deferred(factory, |s: &mut TraceSettings, p| s.provider = Some(p))
}

/// Build a provider exporting every finished span to `exporter` right away.
pub fn with_exporter<X>(exporter: X) -> TraceOpt
where
    X: SpanExporter + 'static,
{
    with_provider_fn(move || {
        Ok::<_, BoxError>(TracerProvider::builder().with_simple_exporter(exporter).build())
    })
}

/// Build a batching provider exporting OTLP over HTTP, configured from the
/// standard `OTEL_EXPORTER_OTLP_*` variables.
pub fn with_http() -> TraceOpt {
    with_provider_fn(|| http_provider(None))
}

/// Like [`with_http`], but export to `endpoint` (full traces URL).
pub fn with_http_endpoint(endpoint: impl Into<String>) -> TraceOpt {
    let endpoint = endpoint.into();
    with_provider_fn(move || http_provider(Some(endpoint)))
}

/// Build a provider logging finished spans through `tracing`.
pub fn with_log_exporter() -> TraceOpt {
    with_provider_fn(|| Ok::<_, BoxError>(log_provider()))
}

fn env_provider(kind: ExporterKind) -> Result<TracerProvider> {
    match kind {
        ExporterKind::Http => http_provider(None),
        ExporterKind::Log => Ok(log_provider()),
        ExporterKind::Grpc => Err(Error::Exporter {
            kind: "grpc",
            source: GRPC_UNSUPPORTED.into(),
        }),
    }
}

/// Pick the exporter from the protocol environment variables.
pub fn with_env() -> TraceOpt {
    with_provider_fn(|| env_provider(ExporterKind::from_env(TRACES_PROTOCOL_ENV)))
}

/// Replace the default trace-context + baggage propagator.
pub fn with_propagator<P>(propagator: P) -> TraceOpt
where
    P: TextMapPropagator + Send + Sync + 'static,
{
    Opt::value(Box::new(propagator) as Propagator, |s: &mut TraceSettings, p| {
        s.propagator = Some(p)
    })
}

/// Install into `registry` instead of the process globals.
pub fn with_registry(registry: Arc<dyn TelemetryRegistry>) -> TraceOpt {
    Opt::value(registry, |s: &mut TraceSettings, r| s.registry = r)
}

/// Bound flush plus shutdown in `stop`.
pub fn with_shutdown_timeout(timeout: Duration) -> TraceOpt {
    Opt::value(timeout, |s: &mut TraceSettings, t| s.shutdown_timeout = t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::registry::LocalRegistry;
    use std::time::Instant;

    #[test]
    fn exporter_selection_prefers_traces_variable() {
        assert_eq!(ExporterKind::select(Some("http"), Some("grpc")), ExporterKind::Http);
        assert_eq!(ExporterKind::select(Some(""), Some("GRPC")), ExporterKind::Grpc);
        assert_eq!(ExporterKind::select(None, Some("http/protobuf")), ExporterKind::Http);
        assert_eq!(ExporterKind::select(None, None), ExporterKind::Log);
        assert_eq!(ExporterKind::select(Some("stdout"), None), ExporterKind::Log);
    }

    #[tokio::test]
    async fn missing_provider_is_named() {
        let registry = LocalRegistry::new();
        let mut p = TraceProvider::new([with_registry(registry.clone())]);
        let err = p.init().await.unwrap_err();
        assert!(matches!(err, Error::MissingProvider("trace")));
        assert_eq!(err.to_string(), "trace provider not set");
        assert!(registry.tracer_provider().is_none());
        p.stop().await.unwrap();
    }

    #[test]
    fn grpc_selection_points_to_http() {
        let err = env_provider(ExporterKind::Grpc).unwrap_err();
        assert!(matches!(err, Error::Exporter { kind: "grpc", .. }));
        assert!(err.to_string().contains("with_http()"), "{err}");
    }

    /// Exporter whose shutdown hangs on to the calling thread.
    #[derive(Debug)]
    struct Stalling(Duration);

    impl SpanExporter for Stalling {
        fn export(&mut self, _batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
            Box::pin(std::future::ready(Ok(())))
        }

        fn shutdown(&mut self) {
            std::thread::sleep(self.0);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_is_bounded_by_shutdown_timeout() {
        let mut p = TraceProvider::new([
            with_exporter(Stalling(Duration::from_millis(500))),
            with_registry(LocalRegistry::new()),
            with_shutdown_timeout(Duration::from_millis(50)),
        ]);
        p.init().await.unwrap();

        let started = Instant::now();
        let err = p.stop().await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_timeout(), "{err}");
        assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
        p.stop().await.unwrap();
    }
}
