//! Locorig Node - rig controller process
//!
//! This binary runs one device of a locomotion rig setup:
//! - UDP hub relaying state between the player and its monitors
//! - Serial bridge to the rig's microcontroller (feature `serial`)
//! - Pin changes forwarded to monitors while acting as the player

mod settings;

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use locorig_core::{PeerId, Recipients, Role};
use locorig_network::NetworkHub;
use locorig_serial::{BridgeEvent, DeviceBridge, SerialConfig};
use settings::NodeConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(name = "locorig-node")]
#[command(about = "Locomotion rig controller node")]
pub struct Args {
    /// Role of this device: client (player) or monitor
    #[arg(long)]
    role: Option<Role>,

    /// Monitor ids to broadcast to, separated by commas or spaces
    #[arg(long)]
    monitors: Option<String>,

    /// Player id to follow when running as a monitor
    #[arg(long)]
    player: Option<String>,

    /// UDP port to listen on and send to
    #[arg(long)]
    port: Option<u16>,

    /// UDP port for the loopback copy of each frame
    #[arg(long)]
    local_port: Option<u16>,

    /// Shared frame handshake
    #[arg(long)]
    handshake: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// JSON configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Run without looking for the rig device
    #[arg(long)]
    no_serial: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    config.apply(&args);

    info!("Starting Locorig Node as {}", config.role);

    let hub = NetworkHub::start(config.network.clone()).await?;
    hub.set_role(config.role);
    if !config.monitors.is_empty() {
        hub.set_monitors(config.monitors.as_slice())?;
    }
    if let Some(player) = &config.player {
        hub.set_player(player)?;
    }

    info!("Listening on {}", hub.local_addr());
    info!("Local ids: {}", join_ids(&hub.local_ids()));
    if config.role.is_player() {
        info!("Monitors: {}", join_ids(&hub.monitors()));
    }

    let bridge = if args.no_serial {
        info!("Serial disabled");
        None
    } else {
        start_bridge(config.serial.clone())
    };

    if let Some(bridge) = &bridge {
        tokio::spawn(relay_pins(hub.clone(), bridge.clone()));
    }
    tokio::spawn(log_relayed(hub.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Some(bridge) = bridge {
        bridge.dispose();
    }
    hub.shutdown();
    Ok(())
}

#[cfg(feature = "serial")]
fn start_bridge(config: SerialConfig) -> Option<DeviceBridge> {
    use std::sync::Arc;

    let provider = Arc::new(locorig_serial::SystemPorts::new());
    Some(DeviceBridge::start(config, provider))
}

#[cfg(not(feature = "serial"))]
fn start_bridge(_config: SerialConfig) -> Option<DeviceBridge> {
    warn!("Built without the `serial` feature; running without a device");
    None
}

/// Forward counted pin transitions to the monitors while acting as player
async fn relay_pins(hub: NetworkHub, bridge: DeviceBridge) {
    let mut events = bridge.subscribe();
    loop {
        match events.recv().await {
            Ok(BridgeEvent::ConnectionChanged(connected)) => {
                info!(
                    connected,
                    port = ?bridge.port_name(),
                    "Device connection changed"
                );
            }
            Ok(BridgeEvent::PinChanged { pin, level }) => {
                if !hub.role().is_player() {
                    continue;
                }
                let body = pin_instruction(pin, level.as_u8(), bridge.value(pin));
                if let Err(e) = hub.send_default(Recipients::Monitors, &body) {
                    debug!(error = %e, "Pin relay failed");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Pin relay fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Log every instruction received from peers
async fn log_relayed(hub: NetworkHub) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    while !hub.is_shut_down() {
        ticker.tick().await;
        while let Some(message) = hub.poll_message() {
            for instruction in message.instructions() {
                info!(
                    source = %message.source,
                    key = %instruction.key,
                    values = ?instruction.values,
                    "Relayed instruction"
                );
            }
        }
    }
}

fn pin_instruction(pin: u8, level: u8, value: i64) -> String {
    format!("pin,{pin},{level},{value};")
}

fn join_ids(ids: &[PeerId]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_instruction() {
        assert_eq!(pin_instruction(13, 1, -4), "pin,13,1,-4;");
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["locorig-node", "--no-serial"]);
        assert!(args.no_serial);
        assert!(args.role.is_none());
        assert!(args.config.is_none());
    }

    #[test]
    fn test_join_ids() {
        assert_eq!(join_ids(&[]), "none");
    }
}
