//! Configuration for pocketcall: dialect choice, stream classifier tag set,
//! driver limits and harness options.
//!
//! Loaded from `pocketcall.toml` with environment overrides; every section
//! falls back to defaults so an empty file is a valid config.

pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{CONFIG_FILE_NAME, load_config, parse_config},
    schema::{ClassifierConfig, DialectConfig, DriverConfig, HarnessConfig, PocketcallConfig, TagPair},
};
