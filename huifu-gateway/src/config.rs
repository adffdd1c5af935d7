//! Gateway configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration that serves on `0.0.0.0:8080` and targets the public
//! provider API.
//!
//! # Examples
//!
//! ```toml
//! [server]
//! port = 9000
//!
//! [http]
//! timeout_secs = 30
//!
//! [provider]
//! enabled = true
//! probe_on_connect = true
//! credential_staging_dir = "/run/huifu-gateway"
//! verify_responses = false
//! ```

use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use url::Url;

use crate::{
    error::{GatewayError, Result},
    model::Environment,
};

/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "PORT";

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "HUIFU_GATEWAY_CONFIG";

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener settings.
    pub server: ServerConfig,
    /// Outbound HTTP settings for provider calls.
    pub http: HttpConfig,
    /// Provider backend settings.
    pub provider: ProviderConfig,
}

impl GatewayConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the document is not valid TOML or fails
    /// validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| GatewayError::Config(format!("invalid TOML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the file cannot be read or is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Applies the `PORT` override from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if `PORT` is set but is not a port number.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var(PORT_ENV) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| {
                    GatewayError::Config(format!("{PORT_ENV} is not a valid port: {port}"))
                })?;
        }
        Ok(())
    }

    /// Validates all sections.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.http.validate()?;
        self.provider.validate()
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_owned(), port: 8080 }
    }
}

impl ServerConfig {
    /// Returns `host:port`.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Outbound HTTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Maximum idle connections per host.
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: default_pool_max_idle(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl HttpConfig {
    /// Validates configuration values are within acceptable bounds.
    ///
    /// # Errors
    ///
    /// Returns error if timeout values are outside valid ranges:
    /// - `timeout_secs`: must be 1-300 seconds
    /// - `connect_timeout_secs`: must be 1-60 seconds
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(GatewayError::Config("timeout_secs must be between 1 and 300".to_owned()));
        }
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > 60 {
            return Err(GatewayError::Config(
                "connect_timeout_secs must be between 1 and 60".to_owned(),
            ));
        }
        Ok(())
    }

    /// Returns timeout as Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns connect timeout as Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Provider backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// When false, every tenant is served by the simulated backend.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API root for [`Environment::Test`].
    #[serde(default = "default_base_url")]
    pub test_base_url: String,

    /// API root for [`Environment::Production`].
    #[serde(default = "default_base_url")]
    pub production_base_url: String,

    /// Probe the API root once while building a provider client.
    #[serde(default = "default_true")]
    pub probe_on_connect: bool,

    /// Timeout for the reachability probe in seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Directory for staged credential documents. Credentials stay in memory when unset.
    #[serde(default)]
    pub credential_staging_dir: Option<PathBuf>,

    /// Provider public key (PEM or bare base64) used to verify response signatures.
    #[serde(default)]
    pub huifu_public_key: Option<String>,

    /// Verify the `sign` field of provider responses.
    #[serde(default)]
    pub verify_responses: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            test_base_url: default_base_url(),
            production_base_url: default_base_url(),
            probe_on_connect: true,
            probe_timeout_secs: default_probe_timeout_secs(),
            credential_staging_dir: None,
            huifu_public_key: None,
            verify_responses: false,
        }
    }
}

impl ProviderConfig {
    /// Validates base URLs, probe timeout and verification settings.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if a base URL is not `https` (or `http` to a
    /// loopback host), if the probe timeout is outside 1-60 seconds, or if response
    /// verification is enabled without a provider public key.
    pub fn validate(&self) -> Result<()> {
        parse_base_url("test_base_url", &self.test_base_url)?;
        parse_base_url("production_base_url", &self.production_base_url)?;

        if self.probe_timeout_secs == 0 || self.probe_timeout_secs > 60 {
            return Err(GatewayError::Config(
                "probe_timeout_secs must be between 1 and 60".to_owned(),
            ));
        }
        if self.verify_responses && self.huifu_public_key.is_none() {
            return Err(GatewayError::Config(
                "verify_responses requires huifu_public_key".to_owned(),
            ));
        }
        Ok(())
    }

    /// Returns the parsed API root for `environment`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the configured URL is invalid.
    pub fn base_url(&self, environment: Environment) -> Result<Url> {
        match environment {
            Environment::Test => parse_base_url("test_base_url", &self.test_base_url),
            Environment::Production => {
                parse_base_url("production_base_url", &self.production_base_url)
            }
        }
    }

    /// Returns probe timeout as Duration.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn parse_base_url(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| GatewayError::Config(format!("{field} is not a valid URL: {e}")))?;

    match url.scheme() {
        "https" => {}
        "http" if is_loopback(&url) => {}
        scheme => {
            return Err(GatewayError::Config(format!(
                "{field} must use https (http is allowed for loopback only), got {scheme}"
            )));
        }
    }
    if url.host_str().is_none() {
        return Err(GatewayError::Config(format!("{field} has no host")));
    }
    Ok(url)
}

fn is_loopback(url: &Url) -> bool {
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

fn default_pool_max_idle() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_base_url() -> String {
    "https://api.huifu.com".to_owned()
}

const fn default_true() -> bool {
    true
}
