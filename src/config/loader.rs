//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ModulesConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ModulesConfig, ConfigError> {
    let config: ModulesConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ModulesConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ShutdownPolicy;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.http.enabled);
        assert_eq!(config.http.bind_address, "0.0.0.0:8080");
        assert!(!config.ticker.enabled);
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config(
            r#"
            [http]
            bind_address = "127.0.0.1:3000"
            shutdown_policy = "wait"

            [ticker]
            enabled = true
            interval_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.http.bind_address, "127.0.0.1:3000");
        assert_eq!(config.http.shutdown_policy, ShutdownPolicy::Wait);
        assert_eq!(config.http.shutdown_timeout_secs, 60);
        assert_eq!(config.ticker.interval_ms, 250);
    }

    #[test]
    fn invalid_values_are_reported_together() {
        let err = parse_config(
            r#"
            [http]
            shutdown_timeout_secs = 0

            [ticker]
            enabled = true
            interval_ms = 0
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
