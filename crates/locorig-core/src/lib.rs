//! Core types for the locorig rig controller
//!
//! This crate holds the pieces shared by the network and serial layers:
//!
//! - [`PeerId`] and [`DeviceIdCodec`]: ten-digit device ids derived from
//!   IPv4 addresses
//! - [`Role`], [`WireRole`] and [`Recipients`]: who a device is and who a
//!   message is for
//! - [`RelayMessage`] and [`Instruction`]: the `key,values;` text carried
//!   between player and monitors
//!
//! # Example
//!
//! ```rust
//! use locorig_core::{encode_id, decode_id};
//!
//! let id = encode_id("192.168.1.10").unwrap();
//! assert_eq!(id.as_str(), "3232235786");
//! assert_eq!(decode_id("3232235786").unwrap().to_string(), "192.168.1.10");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod instruction;
pub mod peer;
pub mod role;

pub use error::{CoreError, Result};
pub use instruction::{find_separator, split_instructions, Instruction, RelayMessage, DEFAULT_SOURCE};
pub use peer::{decode_id, encode_id, parse_ipv4, DeviceIdCodec, PeerId, PEER_ID_LEN};
pub use role::{Recipients, Role, WireRole};
