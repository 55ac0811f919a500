//! Configuration module
//!
//! File- and environment-based configuration for the Business Central client

pub mod config;

pub use config::{Config, ConfigError, Credentials, EndpointKind, RuntimeConfig};
