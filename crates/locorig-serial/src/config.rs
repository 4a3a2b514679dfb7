//! Serial bridge configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default baud rate of the rig firmware
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Highest pin number carried by the one-byte state encoding
pub const MAX_PIN: u8 = 126;

/// Number of pin channels tracked by the bridge
pub const PIN_COUNT: usize = 128;

/// Port that is always present and never the rig
pub const DEFAULT_EXCLUDED_PORT: &str = "COM1";

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Baud rate used to open every candidate port
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// A candidate that sends nothing for this long after opening is closed
    #[serde(with = "humantime_serde", default = "default_handshake_timeout")]
    pub handshake_timeout: Duration,

    /// Period between port enumerations
    #[serde(with = "humantime_serde", default = "default_scan_interval")]
    pub scan_interval: Duration,

    /// Port names never opened
    #[serde(default = "default_excluded_ports")]
    pub excluded_ports: Vec<String>,

    /// Size of a single read from the port
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Greeting bytes buffered per candidate before it is rejected
    #[serde(default = "default_max_greeting_len")]
    pub max_greeting_len: usize,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_scan_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_excluded_ports() -> Vec<String> {
    vec![DEFAULT_EXCLUDED_PORT.to_string()]
}

fn default_read_buffer_size() -> usize {
    32
}

fn default_max_greeting_len() -> usize {
    4096
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            handshake_timeout: default_handshake_timeout(),
            scan_interval: default_scan_interval(),
            excluded_ports: default_excluded_ports(),
            read_buffer_size: default_read_buffer_size(),
            max_greeting_len: default_max_greeting_len(),
        }
    }
}

impl SerialConfig {
    /// Whether `port` may be opened as a candidate
    pub fn is_excluded(&self, port: &str) -> bool {
        self.excluded_ports.iter().any(|p| p == port)
    }
}

/// Builder for SerialConfig
#[derive(Debug, Default)]
pub struct SerialConfigBuilder {
    config: SerialConfig,
}

impl SerialConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the baud rate
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.baud_rate = baud_rate;
        self
    }

    /// Set the silent-port watchdog
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the enumeration period
    pub fn scan_interval(mut self, interval: Duration) -> Self {
        self.config.scan_interval = interval;
        self
    }

    /// Add a port name that is never opened
    pub fn exclude_port(mut self, port: impl Into<String>) -> Self {
        self.config.excluded_ports.push(port.into());
        self
    }

    /// Set the read chunk size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size.max(1);
        self
    }

    /// Set the greeting buffer bound
    pub fn max_greeting_len(mut self, len: usize) -> Self {
        self.config.max_greeting_len = len;
        self
    }

    /// Build the configuration
    pub fn build(self) -> SerialConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
