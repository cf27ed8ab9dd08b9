//! Configuration types for the honeypot

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Main honeypot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HoneypotConfig {
    /// HTTP listener configuration
    pub server: ServerConfig,
    /// Mock data directory configuration
    pub mock: MockConfig,
    /// Audit log configuration
    pub audit: AuditConfig,
    /// Simulated download configuration
    pub pull: PullConfig,
    /// Fabricated text streaming configuration
    pub stream: StreamConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl HoneypotConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::HoneypotError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::HoneypotError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::HoneypotError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Apply the download curve overrides from the process environment
    pub fn apply_env(&mut self) {
        self.pull
            .apply_overrides(|key| std::env::var(key).ok());
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub address: String,
    /// Port to bind
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 11434,
        }
    }
}

/// Mock data directory holding `tags.json`, `response.json` and `version.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    pub path: PathBuf,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./mock"),
        }
    }
}

impl MockConfig {
    /// Registry snapshot file
    pub fn tags_file(&self) -> PathBuf {
        self.path.join("tags.json")
    }

    /// Canned response corpus file
    pub fn responses_file(&self) -> PathBuf {
        self.path.join("response.json")
    }

    /// Version document file
    pub fn version_file(&self) -> PathBuf {
        self.path.join("version.json")
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Directory receiving `audit.log` (console only when unset)
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    pub fn log_file(&self) -> Option<PathBuf> {
        self.path.as_ref().map(|dir| dir.join("audit.log"))
    }
}

/// Simulated download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    /// Base download speed in bytes per second
    pub speed: u64,
    /// Fraction of the base speed used as uniform noise
    pub variance: f64,
    /// Period of the bandwidth wave in seconds
    pub wave_period: f64,
    /// Fraction of the base speed used as wave amplitude
    pub wave_amplitude: f64,
    /// Interval between progress frames in milliseconds
    pub tick_interval_ms: u64,
    /// Pause after the manifest frame in milliseconds
    pub manifest_delay_ms: u64,
    /// Spacing between layer frames when the model is already installed
    pub cached_layer_delay_ms: u64,
    /// Base URL of the upstream model registry
    pub registry_url: String,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            speed: 1_048_576,
            variance: 0.2,
            wave_period: 5.0,
            wave_amplitude: 0.5,
            tick_interval_ms: 100,
            manifest_delay_ms: 200,
            cached_layer_delay_ms: 100,
            registry_url: "https://registry.ollama.ai".to_string(),
        }
    }
}

impl PullConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn manifest_delay(&self) -> Duration {
        Duration::from_millis(self.manifest_delay_ms)
    }

    pub fn cached_layer_delay(&self) -> Duration {
        Duration::from_millis(self.cached_layer_delay_ms)
    }

    /// Apply overrides looked up by environment variable name.
    ///
    /// Values that fail to parse are ignored and the current value is kept.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DOWNLOAD_SPEED") {
            match raw.trim().parse::<u64>() {
                Ok(speed) => self.speed = speed,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring DOWNLOAD_SPEED"),
            }
        }
        override_f64(&lookup, "DOWNLOAD_SPEED_VARIANCE", &mut self.variance);
        override_f64(&lookup, "DOWNLOAD_SPEED_WAVE_PERIOD", &mut self.wave_period);
        override_f64(&lookup, "DOWNLOAD_SPEED_WAVE_AMPLITUDE", &mut self.wave_amplitude);
    }
}

fn override_f64<F>(lookup: &F, key: &str, target: &mut f64)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => *target = value,
            Ok(_) => warn!(key = key, value = %raw, "Ignoring non-finite override"),
            Err(e) => warn!(key = key, value = %raw, error = %e, "Ignoring override"),
        }
    }
}

/// Fabricated text streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Width of each content chunk, in characters
    pub chunk_size: usize,
    /// Pause after each content chunk in milliseconds
    pub chunk_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            chunk_delay_ms: 50,
        }
    }
}

impl StreamConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
