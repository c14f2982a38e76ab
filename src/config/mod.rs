//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML), or Config::default()
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → global::init / global::build
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - An absent `level` defers to the `CTXLOG_LEVEL` environment variable
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{Config, DiodeConfig, FieldNames, LoggerConfig, TimestampFormat};
pub use validation::{validate_config, ValidationError};
