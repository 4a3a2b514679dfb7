//! Device identifiers derived from IPv4 addresses
//!
//! Every device on the rig network is addressed by a [`PeerId`]: the
//! 32-bit value of its IPv4 address written as exactly ten decimal digits.
//! Ids are short enough to type on a touch screen and map back to an
//! address without any lookup service.
//!
//! ```text
//! 192.168.1.10  <->  3232235786
//! ```
//!
//! [`DeviceIdCodec`] memoizes conversions in both directions, including
//! failed ones, so repeated validation of configured target lists stays
//! cheap.

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;
use std::str::FromStr;
use tracing::trace;

use crate::error::{CoreError, Result};

/// Number of decimal digits in a peer id
pub const PEER_ID_LEN: usize = 10;

/// Default number of memoized conversions per direction
pub const DEFAULT_CODEC_CAPACITY: usize = 1024;

/// Ten-digit decimal encoding of an IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerId(String);

impl PeerId {
    /// Build the id for an address
    pub fn from_ipv4(ip: Ipv4Addr) -> Self {
        Self(format!("{:010}", u32::from(ip)))
    }

    /// Parse and validate a ten-digit id
    pub fn parse(id: &str) -> Result<Self> {
        decode_id(id)
            .map(Self::from_ipv4)
            .ok_or_else(|| CoreError::InvalidPeerId(id.to_string()))
    }

    /// Address this id stands for
    pub fn to_ipv4(&self) -> Ipv4Addr {
        // Constructors only admit ids that decode.
        decode_id(&self.0).unwrap_or(Ipv4Addr::UNSPECIFIED)
    }

    /// Get the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<Ipv4Addr> for PeerId {
    fn from(ip: Ipv4Addr) -> Self {
        Self::from_ipv4(ip)
    }
}

impl TryFrom<String> for PeerId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PeerId> for String {
    fn from(id: PeerId) -> Self {
        id.0
    }
}

/// Parse a dotted-quad address.
///
/// Accepts exactly four dot-separated groups of one to three ASCII digits,
/// each at most 255. Surrounding whitespace is ignored.
pub fn parse_ipv4(text: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = text.trim().split('.');
    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse::<u16>().ok().and_then(|v| u8::try_from(v).ok())?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

/// Convert a dotted-quad address to its peer id
pub fn encode_id(ip: &str) -> Option<PeerId> {
    parse_ipv4(ip).map(PeerId::from_ipv4)
}

/// Convert a peer id back to its address.
///
/// The id must be exactly ten ASCII digits (surrounding whitespace is
/// ignored) and its value must fit in 32 bits.
pub fn decode_id(id: &str) -> Option<Ipv4Addr> {
    let id = id.trim();
    if id.len() != PEER_ID_LEN || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number: u64 = id.parse().ok()?;
    u32::try_from(number).ok().map(Ipv4Addr::from)
}

/// Memoizing codec between addresses and peer ids
#[derive(Debug)]
pub struct DeviceIdCodec {
    ip_to_id: Mutex<LruCache<String, Option<PeerId>>>,
    id_to_ip: Mutex<LruCache<String, Option<Ipv4Addr>>>,
}

impl DeviceIdCodec {
    /// Create a codec with the default cache size
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CODEC_CAPACITY)
    }

    /// Create a codec remembering up to `capacity` conversions per direction
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            ip_to_id: Mutex::new(LruCache::new(cap)),
            id_to_ip: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Encode a dotted-quad address; `None` when malformed
    pub fn encode(&self, ip: &str) -> Option<PeerId> {
        if let Some(hit) = self.ip_to_id.lock().get(ip) {
            return hit.clone();
        }
        let id = encode_id(ip);
        trace!(ip, id = ?id, "Encoded address");
        self.ip_to_id.lock().put(ip.to_string(), id.clone());
        id
    }

    /// Decode a ten-digit id; `None` when malformed or out of range
    pub fn decode(&self, id: &str) -> Option<Ipv4Addr> {
        if let Some(hit) = self.id_to_ip.lock().get(id) {
            return *hit;
        }
        let ip = decode_id(id);
        trace!(id, ip = ?ip, "Decoded peer id");
        self.id_to_ip.lock().put(id.to_string(), ip);
        ip
    }

    /// Encode a list of addresses, skipping malformed entries
    pub fn encode_all<'a>(&self, ips: impl IntoIterator<Item = &'a str>) -> Vec<PeerId> {
        ips.into_iter().filter_map(|ip| self.encode(ip)).collect()
    }

    /// Number of memoized entries in each direction
    pub fn cached(&self) -> (usize, usize) {
        (self.ip_to_id.lock().len(), self.id_to_ip.lock().len())
    }
}

impl Default for DeviceIdCodec {
    fn default() -> Self {
        Self::new()
    }
}
