//! Configuration module for edgefetch.

use crate::error::{FetchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// RPC path the locator serves JSON-RPC on.
pub const LOCATOR_RPC_PATH: &str = "/rpc/v0";

/// Route of a local IPFS daemon's block API.
pub const LOCAL_GATEWAY_ROUTE: &str = "/api/v0/block/get?arg=";

/// Main client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Locator configuration.
    #[serde(default)]
    pub locator: LocatorConfig,
    /// Gateway fallback configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Edge selection configuration.
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Outcome reporting configuration.
    #[serde(default)]
    pub reporting: ReportingConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl ClientConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FetchError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            FetchError::Config(format!("Failed to parse config: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `EDGEFETCH_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(locator) = std::env::var("EDGEFETCH_LOCATOR") {
            config.locator.address = locator;
        }
        if let Ok(gateway) = std::env::var("EDGEFETCH_GATEWAY") {
            config.gateway.address = gateway;
        }
        if let Ok(level) = std::env::var("EDGEFETCH_LOG_LEVEL") {
            config.observability.log_level = level;
        }
        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.locator.address.trim().is_empty() {
            return Err(FetchError::InvalidConfig {
                field: "locator.address".to_string(),
                reason: "Locator address must not be empty".to_string(),
            });
        }

        if self.gateway.enabled && self.gateway.address.trim().is_empty() {
            return Err(FetchError::InvalidConfig {
                field: "gateway.address".to_string(),
                reason: "An enabled gateway requires an address".to_string(),
            });
        }

        if self.network.request_timeout.is_zero() {
            return Err(FetchError::InvalidConfig {
                field: "network.request_timeout".to_string(),
                reason: "Request timeout must be non-zero".to_string(),
            });
        }

        if self.reporting.enabled {
            if self.reporting.workers == 0 {
                return Err(FetchError::InvalidConfig {
                    field: "reporting.workers".to_string(),
                    reason: "At least one report worker is required".to_string(),
                });
            }
            if self.reporting.queue_capacity == 0 {
                return Err(FetchError::InvalidConfig {
                    field: "reporting.queue_capacity".to_string(),
                    reason: "Report queue capacity must be non-zero".to_string(),
                });
            }
            if self.reporting.timeout.is_zero() {
                return Err(FetchError::InvalidConfig {
                    field: "reporting.timeout".to_string(),
                    reason: "Report timeout must be non-zero".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Locator (scheduler) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Base address of the locator.
    pub address: String,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:5000".to_string(),
        }
    }
}

impl LocatorConfig {
    /// The JSON-RPC endpoint, with the RPC path appended exactly once.
    pub fn rpc_endpoint(&self) -> String {
        let address = self.address.trim().trim_end_matches('/');
        if address.ends_with(LOCATOR_RPC_PATH) {
            address.to_string()
        } else {
            format!("{}{}", address, LOCATOR_RPC_PATH)
        }
    }
}

/// Gateway fallback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Enable gateway fallback.
    pub enabled: bool,
    /// Gateway address, e.g. `https://ipfs.io/ipfs/` or `http://127.0.0.1:5001`.
    pub address: String,
    /// Fall back on any edge failure instead of only on not-found.
    #[serde(default)]
    pub fallback_on_any_error: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "https://ipfs.io/ipfs/".to_string(),
            fallback_on_any_error: false,
        }
    }
}

impl GatewayConfig {
    /// Base URL the content id is appended to.
    ///
    /// A bare `host:port` address names a local daemon and is routed to its
    /// block API; any address with a path is used as a prefix.
    pub fn base_url(&self) -> String {
        let address = self.address.trim();
        let local_daemon = reqwest::Url::parse(address)
            .map(|url| url.port().is_some() && url.path() == "/")
            .unwrap_or(false);

        if local_daemon {
            format!("{}{}", address.trim_end_matches('/'), LOCAL_GATEWAY_ROUTE)
        } else {
            address.to_string()
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Connection timeout.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Value of the `App-Name` header sent to edges.
    pub app_name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            app_name: "edgefetch".to_string(),
        }
    }
}

/// Edge selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStrategy {
    /// Weighted by descriptor weight; uniform when every weight is zero.
    #[default]
    Weighted,
    /// Always uniform.
    Uniform,
}

/// Edge selection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Selection policy.
    #[serde(default)]
    pub strategy: SelectionStrategy,
    /// Fixed seed for reproducible selection.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Outcome reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Send outcome reports to the locator.
    pub enabled: bool,
    /// Reports queued beyond this are dropped.
    pub queue_capacity: usize,
    /// Concurrent report senders.
    pub workers: usize,
    /// Per-report deadline.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
            workers: 4,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            let minutes = m.parse::<u64>().map_err(|e| e.to_string())?;
            minutes
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration out of range: {}", s))
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }
}
