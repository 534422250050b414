//! Parsing and validation of `ripple.toml` project configuration files.
//!
//! The configuration controls whether incremental compilation is enabled,
//! the round cap, batch parallelism, the cache directory, and the compiler
//! settings whose hash guards the validity of the build history.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
