//! Node configuration file
//!
//! A JSON document with optional `network`, `serial`, `role`, `monitors` and
//! `player` sections. Anything missing takes its default, and command-line
//! flags override what the file says.

use anyhow::Context;
use locorig_core::Role;
use locorig_network::NetworkConfig;
use locorig_serial::SerialConfig;
use serde::Deserialize;
use std::path::Path;

use crate::Args;

/// Everything the node needs to start
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Hub settings
    pub network: NetworkConfig,
    /// Device bridge settings
    pub serial: SerialConfig,
    /// Role to start in
    pub role: Role,
    /// Monitor ids a player sends to
    pub monitors: Vec<String>,
    /// Player id a monitor follows
    pub player: Option<String>,
}

impl NodeConfig {
    /// Read a JSON configuration file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, args: &Args) {
        if let Some(role) = args.role {
            self.role = role;
        }
        if let Some(monitors) = &args.monitors {
            self.monitors = locorig_network::split_id_list(monitors)
                .into_iter()
                .map(str::to_string)
                .collect();
        }
        if let Some(player) = &args.player {
            self.player = Some(player.clone());
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(port) = args.local_port {
            self.network.local_port = port;
        }
        if let Some(handshake) = &args.handshake {
            self.network.handshake = handshake.clone();
        }
        if let Some(baud) = args.baud {
            self.serial.baud_rate = baud;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_partial_file() {
        let config = NodeConfig::parse(
            r#"{
                "role": "monitor",
                "player": "3232235786",
                "network": { "port": 26000, "heartbeat_interval": "2s" },
                "serial": { "handshake_timeout": "5s" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.role, Role::Monitor);
        assert_eq!(config.player.as_deref(), Some("3232235786"));
        assert_eq!(config.network.port, 26000);
        assert_eq!(config.network.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(config.network.local_port, locorig_network::DEFAULT_LOCAL_PORT);
        assert_eq!(config.serial.handshake_timeout, Duration::from_secs(5));
        assert!(config.monitors.is_empty());
    }

    #[test]
    fn test_flags_override_file() {
        let mut config = NodeConfig::parse(r#"{ "network": { "port": 26000 } }"#).unwrap();
        let args = Args::parse_from([
            "locorig-node",
            "--role",
            "player",
            "--monitors",
            "3232235786, 3232235787",
            "--port",
            "27000",
            "--baud",
            "57600",
        ]);
        config.apply(&args);

        assert_eq!(config.role, Role::Client);
        assert_eq!(config.monitors, vec!["3232235786", "3232235787"]);
        assert_eq!(config.network.port, 27000);
        assert_eq!(config.serial.baud_rate, 57600);
    }

    #[test]
    fn test_bad_file() {
        assert!(NodeConfig::parse("{ \"role\": \"spectator\" }").is_err());
    }
}
