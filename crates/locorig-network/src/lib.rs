//! UDP discovery and relay for the locorig rig controller
//!
//! One device acts as the player and broadcasts authoritative state to any
//! number of monitors; monitors follow a chosen player and may send input
//! back. Devices address each other by ten-digit ids derived from their
//! IPv4 addresses (see [`locorig_core::PeerId`]).
//!
//! # Architecture
//!
//! 1. **Frame codec** - text frames `handshake,sender,recipient,source;body;`
//! 2. **Senders** - one queue-backed UDP sender per destination
//! 3. **Roster** - configured targets plus players found through heartbeats
//! 4. **Hub** - receive loop, heartbeat loop and the public relay API
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use locorig_network::{NetworkConfigBuilder, NetworkHub};
//! use locorig_core::Recipients;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = NetworkHub::start(NetworkConfigBuilder::new().build()).await?;
//!     hub.set_monitors(&["3232235786"])?;
//!     hub.send_default(Recipients::Monitors, "position,1.0,2.0,3.0;")?;
//!
//!     while let Some(message) = hub.poll_message() {
//!         println!("{} sent {}", message.source, message.body);
//!     }
//!     hub.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Delivery
//!
//! UDP gives no delivery guarantee and none is added here. Within one
//! destination, datagrams leave in the order they were sent. Inbound
//! messages are polled in arrival order from a bounded queue that drops
//! its oldest entry when full.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod frame;
pub mod hub;
pub mod resolver;
pub mod roster;
pub mod sender;

pub use config::{
    NetworkConfig, NetworkConfigBuilder, DEFAULT_HANDSHAKE, DEFAULT_LOCAL_PORT, DEFAULT_PORT,
    DEFAULT_QUEUE_CAPACITY,
};
pub use error::{NetworkError, Result};
pub use frame::{encode_frame, Frame, HEARTBEAT_BODY, HEARTBEAT_INSTRUCTION};
pub use hub::{DropReason, Inbound, NetworkHub, SendPlan};
pub use resolver::{AddressResolver, StaticResolver, SystemResolver};
pub use roster::{split_id_list, validate_targets, PlayerDirectory};
pub use sender::UnicastSender;
