//! Client configuration.
//!
//! [`ClientConfig`] can be built in code or deserialized from YAML:
//!
//! ```
//! use std::time::Duration;
//! use purchases::ClientConfig;
//!
//! let yaml = r#"
//! api_key: appl_abc
//! observer_mode: true
//! platform:
//!   flavor: native
//!   client_version: "4.2"
//! freshness:
//!   foreground: 5m
//!   background: 25h
//! background_jitter: 2s
//! "#;
//! let config = ClientConfig::from_yaml(yaml).unwrap();
//! assert_eq!(config.background_jitter, Duration::from_secs(2));
//!
//! let built = ClientConfig::builder("appl_abc").observer_mode(true).build();
//! assert!(built.observer_mode);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default API origin.
pub const DEFAULT_BASE_URL: &str = "https://api.revenuecat.com";

/// Version of this client reported in `X-Version`.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors produced while loading or applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The YAML document could not be deserialized.
    #[error(transparent)]
    Yaml(#[from] serde_saphyr::Error),

    /// `base_url` is not an absolute URL.
    #[error("invalid base url {url:?}: {reason}")]
    InvalidBaseUrl {
        /// The rejected value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A value cannot be sent as an HTTP header.
    #[error("invalid value for header {name}: {value:?}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// The rejected value.
        value: String,
    },

    /// The HTTP client could not be created.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// How long a cached customer info snapshot stays fresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Freshness window while the app is in the foreground (e.g. "5m").
    #[serde(default = "default_foreground", with = "humantime_serde")]
    pub foreground: Duration,
    /// Freshness window while the app is in the background (e.g. "25h").
    #[serde(default = "default_background", with = "humantime_serde")]
    pub background: Duration,
}

impl FreshnessPolicy {
    /// The window that applies to the given app state.
    pub fn window(&self, is_app_backgrounded: bool) -> Duration {
        if is_app_backgrounded {
            self.background
        } else {
            self.foreground
        }
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            foreground: default_foreground(),
            background: default_background(),
        }
    }
}

/// Values identifying the running app and platform, sent as request headers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlatformInfo {
    /// `X-Platform`.
    pub platform: String,
    /// `X-Platform-Version`.
    pub platform_version: String,
    /// `X-Platform-Flavor`, e.g. "native" or the name of a cross-platform wrapper.
    pub flavor: String,
    /// `X-Platform-Flavor-Version`, only sent when set.
    pub flavor_version: Option<String>,
    /// `X-Client-Version`.
    pub client_version: String,
    /// `X-Client-Build-Version`.
    pub client_build_version: String,
    /// `X-Apple-Device-Identifier`, only sent when set.
    pub device_identifier: Option<String>,
}

impl Default for PlatformInfo {
    fn default() -> Self {
        Self {
            platform: std::env::consts::OS.to_owned(),
            platform_version: String::new(),
            flavor: "native".to_owned(),
            flavor_version: None,
            client_version: String::new(),
            client_build_version: String::new(),
            device_identifier: None,
        }
    }
}

/// Configuration shared by the transport, the backend façade and the
/// customer info cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Public API key, sent as a bearer token.
    pub api_key: String,
    /// API origin; every path is prefixed with `/v1`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Purchases are completed by the app rather than by this client.
    #[serde(default)]
    pub observer_mode: bool,
    /// Whether StoreKit 2 is used when available.
    #[serde(default)]
    pub storekit2_enabled: bool,
    /// Platform identification headers.
    #[serde(default)]
    pub platform: PlatformInfo,
    /// Customer info freshness windows.
    #[serde(default)]
    pub freshness: FreshnessPolicy,
    /// Upper bound of the random delay applied to fetches started in the background.
    #[serde(default = "default_background_jitter", with = "humantime_serde")]
    pub background_jitter: Duration,
    /// Timeout of a single HTTP request.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Starts building a configuration for `api_key`.
    pub fn builder(api_key: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self {
                api_key: api_key.into(),
                base_url: default_base_url(),
                observer_mode: false,
                storekit2_enabled: false,
                platform: PlatformInfo::default(),
                freshness: FreshnessPolicy::default(),
                background_jitter: default_background_jitter(),
                request_timeout: default_request_timeout(),
            },
        }
    }

    /// Deserializes a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_saphyr::from_str(yaml)?)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Overrides the API origin.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Sets observer mode.
    pub fn observer_mode(mut self, enabled: bool) -> Self {
        self.config.observer_mode = enabled;
        self
    }

    /// Sets the StoreKit 2 flag.
    pub fn storekit2_enabled(mut self, enabled: bool) -> Self {
        self.config.storekit2_enabled = enabled;
        self
    }

    /// Sets platform identification.
    pub fn platform(mut self, platform: PlatformInfo) -> Self {
        self.config.platform = platform;
        self
    }

    /// Sets the freshness windows.
    pub fn freshness(mut self, freshness: FreshnessPolicy) -> Self {
        self.config.freshness = freshness;
        self
    }

    /// Sets the maximum random delay for background fetches.
    pub fn background_jitter(mut self, jitter: Duration) -> Self {
        self.config.background_jitter = jitter;
        self
    }

    /// Sets the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Finishes the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_foreground() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_background() -> Duration {
    Duration::from_secs(25 * 60 * 60)
}

fn default_background_jitter() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}
