//! Serial device discovery and pin protocol for the locorig rig controller
//!
//! The rig's microcontroller hangs off some serial port the host does not
//! know in advance. This crate opens every port it finds, keeps the first
//! one that completes the firmware greeting and then talks a compact binary
//! protocol with it: one byte per pin transition inbound, bit-packed
//! commands outbound.
//!
//! # Architecture
//!
//! 1. **Ports** - [`PortProvider`] lists and opens ports (`SystemPorts` with
//!    the `serial` feature, [`test_utils::MockPorts`] in tests)
//! 2. **Links** - one [`SerialLinkWorker`] per candidate port with a silence
//!    watchdog
//! 3. **Scanner** - [`SerialPortScanner`] spawns links for new port names
//! 4. **Bridge** - [`DeviceBridge`] runs the greeting, keeps the winner and
//!    counts pin edges
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // Cargo.toml: locorig-serial = { version = "0.1", features = ["serial"] }
//! use locorig_serial::{BridgeEvent, DeviceBridge, SerialConfigBuilder, SystemPorts};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SerialConfigBuilder::new().baud_rate(115_200).build();
//!     let bridge = DeviceBridge::start(config, Arc::new(SystemPorts::new()));
//!     let mut events = bridge.subscribe();
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             BridgeEvent::ConnectionChanged(true) => {
//!                 bridge.get_rotation(2, 3, 1)?;
//!             }
//!             BridgeEvent::PinChanged { pin, .. } => {
//!                 println!("pin {pin} now at {}", bridge.value(pin));
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `serial` - system serial ports via `tokio-serial` (requires `libudev-dev`
//!   on Linux)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
pub mod handshake;
pub mod link;
pub mod packing;
pub mod pins;
pub mod ports;
pub mod scanner;
pub mod test_utils;

pub use bridge::{BridgeEvent, DeviceBridge};
pub use command::{decode_state, encode_state, Command, Level, StopMode};
pub use config::{SerialConfig, SerialConfigBuilder, DEFAULT_BAUD_RATE, MAX_PIN, PIN_COUNT};
pub use error::{Result, SerialError};
pub use handshake::{GreetingMatcher, GreetingStep, GREETING_END, GREETING_MARKER, ROLE_REPLY};
pub use link::{LinkEvent, LinkHandle, LinkId, LinkState, SerialLinkWorker};
pub use packing::{pack, BitWriter};
pub use pins::{PinBank, PinState};
pub use ports::{PortProvider, SerialIo};
pub use scanner::SerialPortScanner;
pub use test_utils::{MockDevice, MockPorts};

#[cfg(feature = "serial")]
pub use ports::SystemPorts;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_constants() {
        assert_eq!(DEFAULT_BAUD_RATE, 115_200);
        assert_eq!(MAX_PIN, 126);
        assert_eq!(GREETING_END, 0xFF);
        assert_eq!(ROLE_REPLY, b'r');
        assert!(GREETING_MARKER.ends_with(b"\n"));
    }
}
