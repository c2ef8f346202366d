//! Configuration, provider factory and bootstrap shared by scribe front ends.

pub mod bootstrap;
pub mod config;
pub mod logging;

pub use bootstrap::{Scribe, build_provider, resolve_config_path};
pub use config::{Config, ConfigError};
