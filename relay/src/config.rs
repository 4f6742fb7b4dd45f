use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("API key #{0} is empty")]
    EmptyApiKey(usize),

    #[error("Upstream timeout cannot be 0")]
    ZeroTimeout,

    #[error("Upstream base URL cannot be used as a base: {0}")]
    InvalidBaseUrl(Url),
}

/// Credential for the upstream routing API.
///
/// The value never shows up in `Debug` output so configs and calls can be
/// logged freely.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// Relay configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for relayed client requests
    pub listener: Listener,
    /// Optional listener for `/health` and `/ready`
    #[serde(default)]
    pub admin_listener: Option<Listener>,
    /// Keys tried in order for every request; the first one is preferred
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Include the raw fault message as `debug_message` in 500 responses
    /// caused by internal faults.
    #[serde(default = "default_expose_debug_message")]
    pub expose_debug_message: bool,
}

fn default_expose_debug_message() -> bool {
    true
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.listener.validate()?;
        if let Some(admin_listener) = &self.admin_listener {
            admin_listener.validate()?;
        }

        if let Some(index) = self.api_keys.iter().position(|key| key.expose().is_empty()) {
            return Err(ConfigValidationError::EmptyApiKey(index));
        }

        self.upstream.validate()
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Where and how the upstream routing API is called
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: Url,
    /// Applies to the whole call, from connect to the last body byte
    pub timeout_secs: u64,
    /// Routing profile used for the directions endpoint
    pub directions_profile: String,
    pub geocode: GeocodeConfig,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.timeout_secs == 0 {
            return Err(ConfigValidationError::ZeroTimeout);
        }
        if self.base_url.cannot_be_a_base() {
            return Err(ConfigValidationError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://api.openrouteservice.org")
                .expect("default base URL is valid"),
            timeout_secs: 30,
            directions_profile: "driving-car".into(),
            geocode: GeocodeConfig::default(),
        }
    }
}

/// Fixed filters sent with every geocode lookup
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeocodeConfig {
    /// ISO 3166-1 alpha-3 country the results are restricted to
    pub country: String,
    pub size: u32,
    pub lang: String,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            country: "ESP".into(),
            size: 5,
            lang: "es".into(),
        }
    }
}
