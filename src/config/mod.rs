//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ModulesConfig (validated, immutable)
//!     → per-section options() → module constructors
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Sections produce options rather than modules, so code can add more

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    DatabaseConfig, HttpConfig, LogExporter, LogsConfig, MetricsConfig, ModulesConfig,
    SignalsConfig, TelemetryConfig, TickerConfig, TraceExporter,
};
pub use validation::{validate_config, ValidationError};
