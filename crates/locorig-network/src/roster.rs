//! Peer roster bookkeeping
//!
//! Configured target lists (`clients`, `monitors`) are validated as a whole
//! before they replace the previous list. Discovered players are tracked
//! with the time they were last heard from and expire after a quiet period.
//! None of this touches the network; callers pass in the clock.

use locorig_core::{CoreError, DeviceIdCodec, PeerId};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Validate a list of peer ids as remote targets.
///
/// Every id must decode, appear once, and not name one of `local`
/// addresses. An empty list is valid.
pub fn validate_targets<S: AsRef<str>>(
    codec: &DeviceIdCodec,
    ids: &[S],
    local: &[Ipv4Addr],
) -> Result<Vec<Ipv4Addr>, CoreError> {
    let mut seen = HashSet::with_capacity(ids.len());
    let mut addresses = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.as_ref();
        let ip = codec
            .decode(id)
            .ok_or_else(|| CoreError::InvalidPeerId(id.to_string()))?;
        // Compare decoded addresses so spelling variants of one id collide.
        if !seen.insert(ip) {
            return Err(CoreError::DuplicatePeer(id.trim().to_string()));
        }
        if local.contains(&ip) {
            return Err(CoreError::SelfAddress(id.to_string()));
        }
        addresses.push(ip);
    }
    Ok(addresses)
}

/// Split free text into ids on whitespace, `,` and `;`
pub fn split_id_list(text: &str) -> Vec<&str> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Players discovered through heartbeats
#[derive(Debug, Default)]
pub struct PlayerDirectory {
    /// Players in discovery order
    players: Vec<Ipv4Addr>,
    /// Last accepted frame per sender
    last_seen: HashMap<Ipv4Addr, Instant>,
}

impl PlayerDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `ip` sent an accepted frame at `now`
    pub fn touch(&mut self, ip: Ipv4Addr, now: Instant) {
        self.last_seen.insert(ip, now);
    }

    /// Record a heartbeat: refreshes `ip` and lists it as a player
    pub fn record_heartbeat(&mut self, ip: Ipv4Addr, now: Instant) {
        self.touch(ip, now);
        if !self.players.contains(&ip) {
            debug!(player = %PeerId::from_ipv4(ip), "Discovered player");
            self.players.push(ip);
        }
    }

    /// Drop players not heard from for longer than `ttl`.
    ///
    /// Senders that were only touched are forgotten on the same schedule.
    pub fn expire(&mut self, now: Instant, ttl: Duration) -> Vec<Ipv4Addr> {
        let mut expired = Vec::new();
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) <= ttl);
        let last_seen = &self.last_seen;
        self.players.retain(|ip| {
            let alive = last_seen
                .get(ip)
                .is_some_and(|seen| now.saturating_duration_since(*seen) <= ttl);
            if !alive {
                expired.push(*ip);
            }
            alive
        });
        for ip in &expired {
            debug!(player = %PeerId::from_ipv4(*ip), "Player expired");
        }
        expired
    }

    /// Whether `ip` is a live player
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.players.contains(&ip)
    }

    /// Live players in discovery order
    pub fn list(&self) -> Vec<Ipv4Addr> {
        self.players.clone()
    }

    /// Number of live players
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether no player is listed
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Number of senders with a recorded last-seen time
    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }
}
