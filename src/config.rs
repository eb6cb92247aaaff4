//! Configuration for the pulse oximeter agent.

use crate::sensor::reader::SensorSource;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Duration of a measurement window
    #[serde(with = "duration_serde")]
    pub window_duration: Duration,

    /// Address the relay listens on, and consumers connect to
    pub relay_addr: String,

    /// Port for the record store service
    pub store_port: u16,

    /// Where the sensor's line stream comes from
    pub sensor: SensorConfig,

    /// Path for storing health records and state
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulseox-agent");

        Self {
            window_duration: Duration::from_secs(30),
            relay_addr: "127.0.0.1:8081".to_string(),
            store_port: 8080,
            sensor: SensorConfig::default(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulseox-agent")
            .join("config.json")
    }

    /// Base URL of the record store service.
    pub fn store_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.store_port)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Configuration for the sensor channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Character device exposing the sensor's line stream
    pub device: Option<PathBuf>,
    /// TCP endpoint of a networked sensor bridge
    pub tcp: Option<String>,
}

impl SensorConfig {
    /// Resolve the configured source; with nothing configured, simulate.
    pub fn source(&self) -> SensorSource {
        if let Some(ref device) = self.device {
            SensorSource::Device(device.clone())
        } else if let Some(ref addr) = self.tcp {
            SensorSource::Tcp(addr.clone())
        } else {
            SensorSource::Simulated
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window_duration, Duration::from_secs(30));
        assert_eq!(config.relay_addr, "127.0.0.1:8081");
        assert_eq!(config.store_port, 8080);
        assert_eq!(config.store_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_sensor_source_resolution() {
        let mut sensor = SensorConfig::default();
        assert!(matches!(sensor.source(), SensorSource::Simulated));

        sensor.tcp = Some("192.168.1.20:5000".to_string());
        assert!(matches!(sensor.source(), SensorSource::Tcp(_)));

        // A configured device wins over TCP.
        sensor.device = Some(PathBuf::from("/dev/ttyUSB0"));
        assert!(matches!(sensor.source(), SensorSource::Device(_)));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.window_duration, config.window_duration);
        assert_eq!(back.relay_addr, config.relay_addr);
    }
}
