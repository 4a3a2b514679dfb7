//! Network configuration types

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default shared secret expected at the start of every frame
pub const DEFAULT_HANDSHAKE: &str = "#SW5#";

/// Default port for receiving frames and reaching remote peers
pub const DEFAULT_PORT: u16 = 25000;

/// Default port the loopback copy of each broadcast is sent to
pub const DEFAULT_LOCAL_PORT: u16 = 24000;

/// Maximum number of relay messages waiting to be polled
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// Network hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Shared secret; frames carrying another token are dropped
    #[serde(default = "default_handshake")]
    pub handshake: String,

    /// Port the hub listens on and sends remote frames to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Port the loopback copy of each outgoing frame is sent to
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Period of the heartbeat/expiry loop
    #[serde(with = "humantime_serde", default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,

    /// Discovered players without a heartbeat for this long are dropped
    #[serde(with = "humantime_serde", default = "default_player_ttl")]
    pub player_ttl: Duration,

    /// Upper bound for a single datagram send
    #[serde(with = "humantime_serde", default = "default_send_timeout")]
    pub send_timeout: Duration,

    /// Inbound relay queue bound; oldest entries are dropped first
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Local addresses to use instead of auto-detection
    #[serde(default)]
    pub static_addresses: Vec<Ipv4Addr>,
}

fn default_handshake() -> String {
    DEFAULT_HANDSHAKE.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_local_port() -> u16 {
    DEFAULT_LOCAL_PORT
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_player_ttl() -> Duration {
    Duration::from_secs(1)
}

fn default_send_timeout() -> Duration {
    Duration::from_millis(500)
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            handshake: default_handshake(),
            port: DEFAULT_PORT,
            local_port: DEFAULT_LOCAL_PORT,
            heartbeat_interval: default_heartbeat_interval(),
            player_ttl: default_player_ttl(),
            send_timeout: default_send_timeout(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            static_addresses: Vec::new(),
        }
    }
}

impl NetworkConfig {
    /// Configuration for tests on the loopback interface.
    ///
    /// Loopback copies go to the hub's own port so a single hub observes
    /// its own broadcasts.
    pub fn local_test(port: u16) -> Self {
        Self {
            port,
            local_port: port,
            static_addresses: vec![Ipv4Addr::new(10, 254, 0, 1)],
            ..Self::default()
        }
    }
}

/// Builder for NetworkConfig
#[derive(Debug, Default)]
pub struct NetworkConfigBuilder {
    config: NetworkConfig,
}

impl NetworkConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shared handshake token
    pub fn handshake(mut self, handshake: impl Into<String>) -> Self {
        self.config.handshake = handshake.into();
        self
    }

    /// Set the receive/remote port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the loopback destination port
    pub fn local_port(mut self, port: u16) -> Self {
        self.config.local_port = port;
        self
    }

    /// Set the heartbeat period
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set how long a discovered player stays listed without a heartbeat
    pub fn player_ttl(mut self, ttl: Duration) -> Self {
        self.config.player_ttl = ttl;
        self
    }

    /// Set the inbound queue bound
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity.max(1);
        self
    }

    /// Pin the local addresses instead of detecting them
    pub fn static_addresses(mut self, addresses: Vec<Ipv4Addr>) -> Self {
        self.config.static_addresses = addresses;
        self
    }

    /// Build the configuration
    pub fn build(self) -> NetworkConfig {
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
