//! Configuration subsystem.
//!
//! Routes, backend address and document root are loaded once at startup,
//! validated, and treated as immutable for the life of the process.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BackendConfig, GatewayConfig, ListenerConfig, ObservabilityConfig, StaticFilesConfig,
};
