//! Forwards `tracing` events to an OpenTelemetry logger.
//!
//! # Data Flow
//! ```text
//! tracing::info!(..) → LogBridge::on_event → LogRecord → Logger::emit → processors
//! ```
//!
//! # Design Decisions
//! - The bridge looks up its logger on every event, so it can be part of the
//!   subscriber before any log provider is initialized and does nothing until then
//! - Events from the OpenTelemetry crates themselves are skipped, so an
//!   exporter reporting on its own work cannot feed back into itself

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, Severity};
use opentelemetry_sdk::logs::Logger;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::observability::registry::{global_logger, LocalRegistry};

#[derive(Clone)]
enum Source {
    Global,
    Local(Arc<LocalRegistry>),
}

/// `tracing` layer emitting every event as an OpenTelemetry log record.
#[derive(Clone)]
pub struct LogBridge {
    source: Source,
}

impl LogBridge {
    /// Emit through the logger installed by [`super::GlobalRegistry`].
    pub fn global() -> Self {
        Self {
            source: Source::Global,
        }
    }

    /// Emit through the logger installed in `registry`.
    pub fn local(registry: Arc<LocalRegistry>) -> Self {
        Self {
            source: Source::Local(registry),
        }
    }

    fn logger(&self) -> Option<Arc<Logger>> {
        match &self.source {
            Source::Global => global_logger(),
            Source::Local(registry) => registry.logger(),
        }
    }
}

impl fmt::Debug for LogBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            Source::Global => "global",
            Source::Local(_) => "local",
        };
        f.debug_struct("LogBridge").field("source", &source).finish()
    }
}

fn severity(level: &Level) -> Severity {
    match *level {
        Level::TRACE => Severity::Trace,
        Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warn,
        Level::ERROR => Severity::Error,
    }
}

impl<S: Subscriber> Layer<S> for LogBridge {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with("opentelemetry") {
            return;
        }
        let Some(logger) = self.logger() else {
            return;
        };

        let mut record = logger.create_log_record();
        record.set_target(meta.target().to_string());
        record.set_timestamp(SystemTime::now());
        record.set_severity_number(severity(meta.level()));
        record.set_severity_text(meta.level().as_str());
        event.record(&mut Fields(&mut record));
        logger.emit(record);
    }
}

/// Copies event fields onto a record; `message` becomes the body.
struct Fields<'a, R>(&'a mut R);

impl<R: opentelemetry::logs::LogRecord> Fields<'_, R> {
    fn put(&mut self, field: &Field, value: AnyValue) {
        if field.name() == "message" {
            self.0.set_body(value);
        } else {
            self.0.add_attribute(field.name(), value);
        }
    }
}

impl<R: opentelemetry::logs::LogRecord> Visit for Fields<'_, R> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, AnyValue::from(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, AnyValue::from(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, AnyValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match i64::try_from(value) {
            Ok(v) => self.put(field, AnyValue::from(v)),
            Err(_) => self.put(field, AnyValue::from(value.to_string())),
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, AnyValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, AnyValue::from(value));
    }
}
