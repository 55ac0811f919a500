//! Configuration loading
//!
//! Settings come from an optional TOML file; credentials come from the
//! environment only and are never written to disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default token-service host of the reference deployment.
pub const DEFAULT_TOKEN_HOST: &str = "192.168.70.231:4413";

/// Config file read when `BC_CLIENT_CONFIG` is not set.
const DEFAULT_CONFIG_FILE: &str = "bc-client.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid endpoint type: {0} (expected \"ODataV4\" or \"v2\")")]
    InvalidEndpointType(String),

    #[error("username not found, set the BC_USERNAME or USER environment variable")]
    MissingUsername,

    #[error("password not found, set the BC_PASSWORD or PASSWORD environment variable")]
    MissingPassword,
}

/// Which flavour of the Business Central API endpoints to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointKind {
    /// Classic OData V4 web-service endpoints.
    ODataV4,
    /// The standard `api/v2.0` REST endpoints.
    ApiV2,
}

impl EndpointKind {
    /// Parse the selector as accepted in configuration: `"ODataV4"` or `"v2"`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ODataV4" => Some(EndpointKind::ODataV4),
            "v2" => Some(EndpointKind::ApiV2),
            _ => None,
        }
    }

    /// Path segment appended to `{base}/{tenant}/{environment}/`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            EndpointKind::ODataV4 => "ODataV4/",
            EndpointKind::ApiV2 => "api/v2.0/",
        }
    }

    /// Path segment of the company-list endpoint. The two API flavours
    /// expose it under different names.
    pub fn companies_segment(&self) -> &'static str {
        match self {
            EndpointKind::ODataV4 => "Company",
            EndpointKind::ApiV2 => "companies",
        }
    }
}

/// Raw configuration as read from the TOML file. Every field is optional;
/// missing values fall back to defaults during [`Config::to_runtime`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Host (and optional port) of the token service.
    pub token_host: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Azure tenant id of the Business Central instance.
    pub tenant_id: Option<String>,
    /// Environment name, e.g. "Production" or "Sandbox".
    pub environment: Option<String>,
    /// Endpoint selector: "ODataV4" or "v2".
    pub endpoint_type: Option<String>,
    /// Skip TLS certificate verification. Off unless explicitly enabled.
    pub insecure_ssl: Option<bool>,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Reads the file named by `BC_CLIENT_CONFIG`, falling back to
    /// `bc-client.toml` in the working directory. A missing file is not an
    /// error; it yields an all-default configuration.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = std::env::var("BC_CLIENT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        Self::load(&path)
    }

    /// Load configuration from a specific file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Resolve the raw configuration into runtime settings.
    pub fn to_runtime(&self) -> Result<RuntimeConfig, ConfigError> {
        let endpoint_kind = match &self.endpoint_type {
            Some(value) => Some(
                EndpointKind::parse(value)
                    .ok_or_else(|| ConfigError::InvalidEndpointType(value.clone()))?,
            ),
            None => None,
        };

        Ok(RuntimeConfig {
            token_host: self
                .token_host
                .clone()
                .unwrap_or_else(|| DEFAULT_TOKEN_HOST.to_string()),
            timeout_secs: self.timeout_secs.unwrap_or(crate::auth::DEFAULT_TIMEOUT_SECS),
            tenant_id: self.tenant_id.clone(),
            environment: self.environment.clone(),
            endpoint_kind,
            insecure_ssl: self.insecure_ssl.unwrap_or(false),
        })
    }
}

/// Fully-resolved runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub token_host: String,
    pub timeout_secs: u64,
    /// Only needed for OData/REST calls, not for token retrieval.
    pub tenant_id: Option<String>,
    pub environment: Option<String>,
    pub endpoint_kind: Option<EndpointKind>,
    pub insecure_ssl: bool,
}

/// Credentials for the token endpoint, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Read credentials from `BC_USERNAME`/`BC_PASSWORD`, falling back to
    /// `USER`/`PASSWORD`. Empty variables count as unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = env_non_empty("BC_USERNAME")
            .or_else(|| env_non_empty("USER"))
            .ok_or(ConfigError::MissingUsername)?;

        let password = env_non_empty("BC_PASSWORD")
            .or_else(|| env_non_empty("PASSWORD"))
            .ok_or(ConfigError::MissingPassword)?;

        Ok(Self { username, password })
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
