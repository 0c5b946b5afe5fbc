//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, intervals > 0, addresses parse)
//! - Check enabled sections are usable together
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: ModulesConfig → Result<(), Vec<ValidationError>>
//! - Only enabled sections are checked

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{LogExporter, ModulesConfig, TraceExporter, SIGNAL_NAMES};

/// A single semantic problem, located by its config key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check every enabled section, collecting all problems.
pub fn validate_config(config: &ModulesConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.http.enabled {
        check_addr(&mut errors, "http.bind_address", &config.http.bind_address);
        if config.http.shutdown_timeout_secs == 0 {
            errors.push(ValidationError::new("http.shutdown_timeout_secs", "must be > 0"));
        }
        if config.http.request_timeout_secs == Some(0) {
            errors.push(ValidationError::new("http.request_timeout_secs", "must be > 0"));
        }
    }

    if config.ticker.enabled && config.ticker.interval_ms == 0 {
        errors.push(ValidationError::new("ticker.interval_ms", "must be > 0"));
    }

    if config.database.enabled && config.database.path.trim().is_empty() {
        errors.push(ValidationError::new("database.path", "must not be empty"));
    }

    if config.telemetry.enabled {
        if config.telemetry.shutdown_timeout_secs == 0 {
            errors.push(ValidationError::new("telemetry.shutdown_timeout_secs", "must be > 0"));
        }
        if let Some(endpoint) = &config.telemetry.endpoint {
            let http = config.telemetry.exporter == TraceExporter::Http;
            check_endpoint(&mut errors, "telemetry.endpoint", endpoint, http);
        }
    }

    if config.logs.enabled {
        if config.logs.shutdown_timeout_secs == 0 {
            errors.push(ValidationError::new("logs.shutdown_timeout_secs", "must be > 0"));
        }
        if let Some(endpoint) = &config.logs.endpoint {
            let http = config.logs.exporter == LogExporter::Http;
            check_endpoint(&mut errors, "logs.endpoint", endpoint, http);
        }
        if config.logs.scope.as_deref().is_some_and(|s| s.trim().is_empty()) {
            errors.push(ValidationError::new("logs.scope", "must not be empty"));
        }
    }

    if config.metrics.enabled {
        check_addr(&mut errors, "metrics.bind_address", &config.metrics.bind_address);
        if config.metrics.shutdown_timeout_secs == 0 {
            errors.push(ValidationError::new("metrics.shutdown_timeout_secs", "must be > 0"));
        }
        if let Some(buckets) = &config.metrics.buckets {
            if buckets.is_empty() {
                errors.push(ValidationError::new("metrics.buckets", "must not be empty"));
            }
        }
        if config.http.enabled && config.http.bind_address == config.metrics.bind_address {
            errors.push(ValidationError::new(
                "metrics.bind_address",
                "conflicts with http.bind_address",
            ));
        }
    }

    if config.signals.enabled {
        for name in &config.signals.signals {
            if !SIGNAL_NAMES.contains(&name.as_str()) {
                errors.push(ValidationError::new(
                    "signals.signals",
                    format!("unknown signal '{}'", name),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, addr: &str) {
    if let Err(e) = addr.parse::<SocketAddr>() {
        errors.push(ValidationError::new(field, format!("invalid address '{}': {}", addr, e)));
    }
}

fn check_endpoint(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    endpoint: &str,
    http_exporter: bool,
) {
    if !http_exporter {
        errors.push(ValidationError::new(field, "only used with exporter = \"http\""));
    }
    match url::Url::parse(endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, e.to_string())),
    }
}
