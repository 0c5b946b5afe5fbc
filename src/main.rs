//! service-mods demonstration binary.
//!
//! # Architecture Overview
//!
//! ```text
//!   --config modules.toml
//!          │
//!          ▼
//!   ┌──────────────┐   options()   ┌───────────────────────────────────────┐
//!   │ ModulesConfig│──────────────▶│ http · ticker · db · trace · metrics  │
//!   └──────────────┘               │ logs · signal                         │
//!                                  └───────────────┬───────────────────────┘
//!                                                  │ init (sequential)
//!                                                  ▼
//!                                  run (one task each) ── first exit ──▶ stop all
//! ```
//!
//! Exits non-zero when any module fails to init, run or stop.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::task::JoinSet;

use service_mods::config::{load_config, ModulesConfig};
use service_mods::error::BoxError;
use service_mods::observability::init_logging;
use service_mods::{
    http, ticker, Database, HttpServer, LogProvider, MetricsExporter, Module, Ticker,
    TraceProvider,
};

#[derive(Parser)]
#[command(name = "service-mods")]
#[command(about = "Run lifecycle-managed service modules from a config file", long_about = None)]
struct Cli {
    /// TOML configuration; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_filter.as_deref()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    tracing::info!("service-mods v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to load configuration");
                return ExitCode::FAILURE;
            }
        },
        None => ModulesConfig::default(),
    };

    let mut modules = build_modules(&config);
    tracing::info!(count = modules.len(), "Modules configured");

    let mut ready: Vec<Arc<dyn Module>> = Vec::with_capacity(modules.len());
    for mut module in modules.drain(..) {
        if let Err(e) = module.init().await {
            tracing::error!(module = %module.id(), error = %e, "Init failed");
            stop_all(&ready).await;
            return ExitCode::FAILURE;
        }
        ready.push(Arc::from(module));
    }

    if supervise(ready).await {
        tracing::info!("Shutdown complete");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn build_modules(config: &ModulesConfig) -> Vec<Box<dyn Module>> {
    let mut modules: Vec<Box<dyn Module>> = Vec::new();

    if config.telemetry.enabled {
        modules.push(Box::new(TraceProvider::new(config.telemetry.options())));
    }
    if config.logs.enabled {
        modules.push(Box::new(LogProvider::new(config.logs.options())));
    }
    if config.metrics.enabled {
        modules.push(Box::new(MetricsExporter::new(config.metrics.options())));
    }

    let database = config
        .database
        .enabled
        .then(|| Database::new(config.database.options()));
    let db_handle = database.as_ref().map(Database::handle);
    if let Some(database) = database {
        modules.push(Box::new(database));
    }

    if config.ticker.enabled {
        let mut opts = config.ticker.options();
        opts.push(ticker::with_action(move || {
            let db = db_handle.clone();
            async move {
                metrics::counter!("heartbeats_total").increment(1);
                if let Some(db) = db {
                    db.with(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))?;
                }
                tracing::debug!("Heartbeat");
                Ok::<_, BoxError>(())
            }
        }));
        modules.push(Box::new(Ticker::new(opts)));
    }

    if config.http.enabled {
        let mut opts = config.http.options();
        opts.push(http::with_router(
            Router::new().route("/healthz", get(|| async { "ok" })),
        ));
        modules.push(Box::new(HttpServer::new(opts)));
    }

    #[cfg(unix)]
    if config.signals.enabled {
        modules.push(Box::new(service_mods::SignalListener::with_signals(
            config.signals.kinds(),
        )));
    }

    modules
}

/// Run every module; the first one to return stops the rest.
/// Returns `true` when nothing failed.
async fn supervise(modules: Vec<Arc<dyn Module>>) -> bool {
    let mut tasks = JoinSet::new();
    for module in &modules {
        let module = module.clone();
        tasks.spawn(async move {
            let result = module.run().await;
            (module.id().to_string(), result)
        });
    }

    let mut ok = true;
    if let Some(joined) = tasks.join_next().await {
        ok &= report(joined);
    }
    ok &= stop_all(&modules).await;
    while let Some(joined) = tasks.join_next().await {
        ok &= report(joined);
    }
    ok
}

fn report(
    joined: Result<(String, service_mods::Result<()>), tokio::task::JoinError>,
) -> bool {
    match joined {
        Ok((id, Ok(()))) => {
            tracing::info!(module = %id, "Module finished");
            true
        }
        Ok((id, Err(e))) => {
            tracing::error!(module = %id, error = %e, "Module failed");
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "Module task panicked");
            false
        }
    }
}

async fn stop_all(modules: &[Arc<dyn Module>]) -> bool {
    let mut ok = true;
    for module in modules.iter().rev() {
        if let Err(e) = module.stop().await {
            tracing::error!(module = %module.id(), error = %e, "Stop failed");
            ok = false;
        }
    }
    ok
}
