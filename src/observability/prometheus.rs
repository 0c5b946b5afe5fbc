//! Prometheus scrape endpoint as a module.
//!
//! # Data Flow
//! ```text
//! init:  options → recorder + handle → bind scrape server → install recorder
//! run:   serve GET /metrics (handle.render())
//! stop:  drain scrape server → final upkeep
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{BoxError, Error, Result};
use crate::http::{self, HttpServer};
use crate::lifecycle::{Lifecycle, Module, RunEntry};
use crate::observability::registry::{GlobalRegistry, TelemetryRegistry};
use crate::option::{apply_options, Opt, Pending};

pub const ID: &str = "metrics";

pub const DEFAULT_ADDR: &str = "0.0.0.0:9090";
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings filled in by exporter options.
pub struct MetricsSettings {
    addr: String,
    buckets: Option<Vec<f64>>,
    registry: Arc<dyn TelemetryRegistry>,
    shutdown_timeout: Duration,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            buckets: None,
            registry: Arc::new(GlobalRegistry),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Option type for [`MetricsExporter`].
pub type MetricsOpt = Opt<MetricsSettings>;

/// Exposes recorded metrics in the Prometheus text format.
pub struct MetricsExporter {
    lifecycle: Lifecycle,
    opts: Pending<MetricsSettings>,
    handle: Option<PrometheusHandle>,
    server: Option<HttpServer>,
}

impl MetricsExporter {
    pub fn new(opts: impl IntoIterator<Item = MetricsOpt>) -> Self {
        Self {
            lifecycle: Lifecycle::new(ID),
            opts: Pending::new(opts),
            handle: None,
            server: None,
        }
    }

    /// Scrape server URL, available after `init`.
    pub fn url(&self) -> Option<&str> {
        self.server.as_ref().map(HttpServer::url)
    }

    /// Current exposition, available after `init`.
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }

    async fn configure(&mut self) -> Result<()> {
        let mut settings = MetricsSettings::default();
        apply_options(&mut settings, self.opts.take())?;

        let mut builder = PrometheusBuilder::new();
        if let Some(buckets) = &settings.buckets {
            builder = builder.set_buckets(buckets).map_err(|e| Error::Exporter {
                kind: "prometheus",
                source: Box::new(e),
            })?;
        }
        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        let scrape = handle.clone();
        let router = Router::new().route(
            "/metrics",
            get(move || {
                let scrape = scrape.clone();
                async move { scrape.render() }
            }),
        );

        let mut server = HttpServer::named(
            format!("{}-http", self.lifecycle.id()),
            [
                http::with_addr(settings.addr),
                http::with_router(router),
                http::with_shutdown_timeout(settings.shutdown_timeout),
            ],
        );
        server.init().await?;

        settings.registry.install_recorder(recorder)?;
        tracing::info!(module = %self.lifecycle.id(), url = %server.url(), "Metrics exporter ready");

        self.handle = Some(handle);
        self.server = Some(server);
        Ok(())
    }
}

#[async_trait]
impl Module for MetricsExporter {
    fn id(&self) -> &str {
        self.lifecycle.id()
    }

    async fn init(&mut self) -> Result<()> {
        self.lifecycle.begin_init()?;
        let result = self.configure().await;
        self.lifecycle.finish_init(result)
    }

    async fn run(&self) -> Result<()> {
        if self.lifecycle.enter_run()? == RunEntry::AlreadyStopped {
            return Ok(());
        }
        match &self.server {
            Some(server) => server.run().await,
            None => Ok(()),
        }
    }

    async fn stop(&self) -> Result<()> {
        self.lifecycle.stop();
        let drained = match &self.server {
            Some(server) => server.stop().await,
            None => Ok(()),
        };
        if let Some(handle) = &self.handle {
            handle.run_upkeep();
        }
        drained
    }
}

/// Bind the scrape server to `addr`.
pub fn with_addr(addr: impl Into<String>) -> MetricsOpt {
    let addr = addr.into();
    with_addr_fn(move || Ok::<_, BoxError>(addr))
}

/// Bind the scrape server to the address returned by `factory`.
pub fn with_addr_fn<F, E>(factory: F) -> MetricsOpt
where
    F: FnOnce() -> std::result::Result<String, E> + Send + 'static,
    E: Into<BoxError>,
{
    Opt::deferred(factory, |s: &mut MetricsSettings, addr| s.addr = addr)
}

/// Render histograms with these bucket bounds instead of summaries.
pub fn with_buckets(buckets: impl Into<Vec<f64>>) -> MetricsOpt {
    Opt::value(buckets.into(), |s: &mut MetricsSettings, b| s.buckets = Some(b))
}

/// Install the recorder into `registry` instead of the global slot.
pub fn with_registry(registry: Arc<dyn TelemetryRegistry>) -> MetricsOpt {
    Opt::value(registry, |s: &mut MetricsSettings, r| s.registry = r)
}

/// Bound scrape server draining in `stop`.
pub fn with_shutdown_timeout(timeout: Duration) -> MetricsOpt {
    Opt::value(timeout, |s: &mut MetricsSettings, t| s.shutdown_timeout = t)
}
