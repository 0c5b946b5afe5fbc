//! Where telemetry modules install their process-wide components.
//!
//! # Design Decisions
//! - [`GlobalRegistry`] writes to `opentelemetry::global` and the `metrics`
//!   global recorder; it is the default for every telemetry module
//! - OpenTelemetry has no global logger, so the global registry keeps one in
//!   a process-wide slot read by [`crate::observability::LogBridge::global`]
//! - [`LocalRegistry`] keeps the components in swappable slots so several
//!   instances (and tests) do not fight over process globals

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use metrics_exporter_prometheus::PrometheusRecorder;
use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry_sdk::logs::Logger;
use opentelemetry_sdk::trace::TracerProvider;

use crate::error::{Error, Result};

static GLOBAL_LOGGER: ArcSwapOption<Logger> = ArcSwapOption::const_empty();

/// Logger installed through [`GlobalRegistry`], if any.
pub fn global_logger() -> Option<Arc<Logger>> {
    GLOBAL_LOGGER.load_full()
}

/// Boxed text map propagator.
pub type Propagator = Box<dyn TextMapPropagator + Send + Sync>;

/// Destination for tracer providers, propagators, loggers and metric recorders.
pub trait TelemetryRegistry: Send + Sync {
    fn install_tracer_provider(&self, provider: TracerProvider) -> Result<()>;

    fn install_logger(&self, logger: Logger) -> Result<()>;

    fn install_propagator(&self, propagator: Propagator) -> Result<()>;

    fn install_recorder(&self, recorder: PrometheusRecorder) -> Result<()>;
}

/// Process-wide registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalRegistry;

impl TelemetryRegistry for GlobalRegistry {
    fn install_tracer_provider(&self, provider: TracerProvider) -> Result<()> {
        // The previous global provider is handed back; dropping it is fine.
        let _previous = opentelemetry::global::set_tracer_provider(provider);
        Ok(())
    }

    fn install_logger(&self, logger: Logger) -> Result<()> {
        GLOBAL_LOGGER.store(Some(Arc::new(logger)));
        Ok(())
    }

    fn install_propagator(&self, propagator: Propagator) -> Result<()> {
        opentelemetry::global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
            propagator,
        ]));
        Ok(())
    }

    fn install_recorder(&self, recorder: PrometheusRecorder) -> Result<()> {
        metrics::set_global_recorder(recorder).map_err(|e| Error::Registry {
            what: "metrics recorder",
            reason: e.to_string(),
        })
    }
}

/// Registration scoped to one owner.
#[derive(Default)]
pub struct LocalRegistry {
    provider: ArcSwapOption<TracerProvider>,
    logger: ArcSwapOption<Logger>,
    propagator: ArcSwapOption<Propagator>,
    recorder: ArcSwapOption<PrometheusRecorder>,
}

impl LocalRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn tracer_provider(&self) -> Option<Arc<TracerProvider>> {
        self.provider.load_full()
    }

    pub fn logger(&self) -> Option<Arc<Logger>> {
        self.logger.load_full()
    }

    pub fn propagator(&self) -> Option<Arc<Propagator>> {
        self.propagator.load_full()
    }

    /// Installed recorder. Use it with `metrics::with_local_recorder`.
    pub fn recorder(&self) -> Option<Arc<PrometheusRecorder>> {
        self.recorder.load_full()
    }
}

impl fmt::Debug for LocalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRegistry")
            .field("provider", &self.provider.load().is_some())
            .field("logger", &self.logger.load().is_some())
            .field("propagator", &self.propagator.load().is_some())
            .field("recorder", &self.recorder.load().is_some())
            .finish()
    }
}

impl TelemetryRegistry for LocalRegistry {
    fn install_tracer_provider(&self, provider: TracerProvider) -> Result<()> {
        self.provider.store(Some(Arc::new(provider)));
        Ok(())
    }

    fn install_logger(&self, logger: Logger) -> Result<()> {
        self.logger.store(Some(Arc::new(logger)));
        Ok(())
    }

    fn install_propagator(&self, propagator: Propagator) -> Result<()> {
        self.propagator.store(Some(Arc::new(propagator)));
        Ok(())
    }

    fn install_recorder(&self, recorder: PrometheusRecorder) -> Result<()> {
        self.recorder.store(Some(Arc::new(recorder)));
        Ok(())
    }
}
