//! Agent configuration
//!
//! Static, supplied at process start: device index and namespace, optional
//! static address profile, broker coordinates, telemetry tuning. Loaded from
//! a TOML file (`PULSENODE_AGENT_CONFIG` env var, falling back to the OS
//! config dir), with built-in defaults when no file exists.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::rate::DEFAULT_RATE_MS;

pub const CONFIG_ENV: &str = "PULSENODE_AGENT_CONFIG";

/// Highest device index; the static-address scheme reserves one host octet
/// slot per device starting at offset 19.
pub const MAX_DEVICE_INDEX: u8 = 254;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Per-device index (0-254); drives the static IP slot and the
    /// fallback client id.
    pub index: u8,
    /// Topic namespace shared by the whole fleet.
    pub namespace: String,
    /// Explicit MQTT client id; derived from the index when absent.
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkConfig {
    /// Static address profile; when absent the host network configuration
    /// is used as-is.
    pub static_profile: Option<StaticIpProfile>,
}

/// The fleet addressing scheme: host octet = 19 + device index under a
/// common prefix (e.g. "10.10.1.").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticIpProfile {
    pub prefix: String,
    pub subnet: String,
    pub gateway: String,
    pub dns: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub keep_alive_secs: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Initial publish interval; remotely adjustable afterwards.
    pub default_rate_ms: u32,
    /// Track peer nodes announcing themselves under the namespace.
    pub peer_tracking: bool,
    /// Evict peers unseen for this long. None preserves the historical
    /// grow-until-restart behavior.
    pub peer_ttl_secs: Option<u64>,
    /// Name under /sys/class/leds used as the visual indicator.
    pub led: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            index: 0,
            namespace: "pulsenode".to_string(),
            client_id: None,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1883,
            keep_alive_secs: 60,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_rate_ms: DEFAULT_RATE_MS,
            peer_tracking: true,
            peer_ttl_secs: None,
            led: None,
        }
    }
}

impl AgentConfig {
    /// Load config from the env-var path or the OS-specific location.
    /// A missing file is first-time setup and yields the defaults.
    pub async fn load() -> Result<Self> {
        let path = Self::config_file_path()?;

        if path.exists() {
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("invalid config at {}", path.display()))
        } else {
            tracing::info!("no config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.device.index > MAX_DEVICE_INDEX {
            anyhow::bail!(
                "device index {} exceeds maximum {}",
                self.device.index,
                MAX_DEVICE_INDEX
            );
        }
        if self.telemetry.default_rate_ms == 0 {
            anyhow::bail!("default_rate_ms must be non-zero");
        }
        Ok(())
    }

    pub fn config_file_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }

        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not find config directory"))?;
        path.push("pulsenode-agent");
        path.push("config.toml");
        Ok(path)
    }
}
