//! Trace provider, log provider and Prometheus exporter, installed into
//! local registries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{TraceContextExt, Tracer, TracerProvider as _};
use opentelemetry::Context;
use opentelemetry::logs::AnyValue;
use opentelemetry_sdk::export::logs::{LogBatch, LogExporter};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::logs::LogResult;
use service_mods::observability::logs::{self, LogProvider};
use service_mods::observability::prometheus::{self, MetricsExporter};
use service_mods::observability::trace::{self, TraceProvider};
use service_mods::observability::{LocalRegistry, LogBridge};
use service_mods::{Error, Lifecycle, Module};

mod common;
use common::{client, init_shared, join_run, spawn_run};

#[derive(Debug, Clone, Default)]
struct Recording {
    names: Arc<Mutex<Vec<String>>>,
}

impl SpanExporter for Recording {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let mut names = self.names.lock().unwrap();
        names.extend(batch.into_iter().map(|span| span.name.into_owned()));
        Box::pin(std::future::ready(Ok(())))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn spans_reach_the_configured_exporter() {
    let registry = LocalRegistry::new();
    let recording = Recording::default();
    let module = init_shared(TraceProvider::new([
        trace::with_exporter(recording.clone()),
        trace::with_registry(registry.clone()),
    ]))
    .await;
    let runner = spawn_run(&module);

    let provider = registry.tracer_provider().expect("provider installed");
    provider.tracer("tests").in_span("reconcile", |_| {});

    module.stop().await.unwrap();
    join_run(runner).await.unwrap();

    assert_eq!(*recording.names.lock().unwrap(), vec!["reconcile".to_string()]);
    assert!(module.provider().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn default_propagator_writes_traceparent() {
    let registry = LocalRegistry::new();
    let mut module = TraceProvider::new([
        trace::with_log_exporter(),
        trace::with_registry(registry.clone()),
    ]);
    module.init().await.unwrap();

    let provider = registry.tracer_provider().unwrap();
    let span = provider.tracer("tests").start("outbound");
    let cx = Context::current_with_span(span);

    let mut carrier: HashMap<String, String> = HashMap::new();
    registry
        .propagator()
        .expect("propagator installed")
        .inject_context(&cx, &mut carrier);
    assert!(carrier.contains_key("traceparent"), "{carrier:?}");

    module.stop().await.unwrap();
}

#[tokio::test]
async fn provider_is_required() {
    let registry = LocalRegistry::new();
    let mut module = TraceProvider::new([trace::with_registry(registry.clone())]);
    assert!(matches!(module.init().await, Err(Error::MissingProvider(_))));
    assert!(registry.propagator().is_none());
}

#[derive(Debug, Clone, Default)]
struct RecordingLogs {
    bodies: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl LogExporter for RecordingLogs {
    async fn export(&mut self, batch: LogBatch<'_>) -> LogResult<()> {
        let mut bodies = self.bodies.lock().unwrap();
        for (record, _) in batch.iter() {
            if let Some(AnyValue::String(body)) = &record.body {
                bodies.push(body.as_str().to_string());
            }
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn tracing_events_reach_the_log_exporter() {
    use tracing_subscriber::layer::SubscriberExt;

    let registry = LocalRegistry::new();
    let recording = RecordingLogs::default();
    let module = init_shared(LogProvider::new([
        logs::with_exporter(recording.clone()),
        logs::with_registry(registry.clone()),
    ]))
    .await;
    let runner = spawn_run(&module);

    let subscriber = tracing_subscriber::registry().with(LogBridge::local(registry.clone()));
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!(job = "compact", "job finished");
    });

    module.stop().await.unwrap();
    join_run(runner).await.unwrap();

    assert_eq!(*recording.bodies.lock().unwrap(), vec!["job finished".to_string()]);
    assert!(module.provider().is_none());
}

#[tokio::test]
async fn log_provider_is_required() {
    let registry = LocalRegistry::new();
    let mut module = LogProvider::new([logs::with_registry(registry.clone())]);
    assert!(matches!(module.init().await, Err(Error::MissingProvider("log"))));
    assert!(registry.logger().is_none());
}

#[tokio::test]
async fn scrape_endpoint_serves_recorded_metrics() {
    let registry = LocalRegistry::new();
    let exporter = init_shared(MetricsExporter::new([
        prometheus::with_addr("127.0.0.1:0"),
        prometheus::with_registry(registry.clone()),
    ]))
    .await;
    let runner = spawn_run(&exporter);

    let recorder = registry.recorder().expect("recorder installed");
    metrics::with_local_recorder(&*recorder, || {
        metrics::counter!("jobs_total").increment(5);
        let lifecycle = Lifecycle::new("heartbeat");
        lifecycle.begin_init().unwrap();
        lifecycle.finish_init(Ok(())).unwrap();
        lifecycle.stop();
    });

    let body = client()
        .get(format!("{}/metrics", exporter.url().unwrap()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("jobs_total 5"), "{body}");
    assert!(
        body.contains(r#"module_state_transitions_total{module="heartbeat",state="initialized"} 1"#),
        "{body}"
    );
    assert!(
        body.contains(r#"module_state_transitions_total{module="heartbeat",state="stopped"} 1"#),
        "{body}"
    );

    exporter.stop().await.unwrap();
    join_run(runner).await.unwrap();
}
