//! Per-pin edge counters
//!
//! The first state byte seen for a pin after it was configured only records
//! the starting level. Every later byte for that pin adds the pin's weight
//! to the counter of the reported level: `High` samples count as rising
//! edges and `Low` samples as falling edges.

use crate::command::{decode_state, Level};
use crate::config::PIN_COUNT;

/// Counter state of one pin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinState {
    /// Baseline sample consumed
    pub armed: bool,
    /// Last reported level
    pub level: Option<Level>,
    /// Weighted count of `High` samples
    pub rising: u64,
    /// Weighted count of `Low` samples
    pub falling: u64,
    /// Count added per sample
    pub weight: i32,
}

impl PinState {
    fn reset(&mut self) {
        self.armed = false;
        self.level = None;
        self.rising = 0;
        self.falling = 0;
    }

    fn add(&mut self, level: Level) {
        // Negative weights wrap the unsigned counters, which the signed
        // difference in `value` undoes.
        let step = self.weight as i64 as u64;
        match level {
            Level::High => self.rising = self.rising.wrapping_add(step),
            Level::Low => self.falling = self.falling.wrapping_add(step),
        }
    }
}

/// Counters for every pin channel
#[derive(Debug, Clone)]
pub struct PinBank {
    pins: Vec<PinState>,
}

impl Default for PinBank {
    fn default() -> Self {
        Self::new()
    }
}

impl PinBank {
    /// All pins reset with weight 0
    pub fn new() -> Self {
        Self {
            pins: vec![PinState::default(); PIN_COUNT],
        }
    }

    /// Clear the counters of `pin` and wait for a new baseline
    pub fn reset(&mut self, pin: u8) {
        if let Some(state) = self.pins.get_mut(pin as usize) {
            state.reset();
        }
    }

    /// Reset `pin` and set its weight
    pub fn configure(&mut self, pin: u8, weight: i32) {
        if let Some(state) = self.pins.get_mut(pin as usize) {
            state.reset();
            state.weight = weight;
        }
    }

    /// Apply one state byte. Returns the pin and level when the byte
    /// counted as a transition.
    pub fn apply(&mut self, code: u8) -> Option<(u8, Level)> {
        let (pin, level) = decode_state(code)?;
        let state = self.pins.get_mut(pin as usize)?;
        state.level = Some(level);
        if state.armed {
            state.add(level);
            Some((pin, level))
        } else {
            state.armed = true;
            None
        }
    }

    /// Weighted count of samples at `level`
    pub fn count(&self, pin: u8, level: Level) -> u64 {
        self.pins.get(pin as usize).map_or(0, |s| match level {
            Level::High => s.rising,
            Level::Low => s.falling,
        })
    }

    /// Signed net count: rising minus falling
    pub fn value(&self, pin: u8) -> i64 {
        let Some(state) = self.pins.get(pin as usize) else {
            return 0;
        };
        state.rising.wrapping_sub(state.falling) as i64
    }

    /// Last reported level of `pin`
    pub fn level(&self, pin: u8) -> Option<Level> {
        self.pins.get(pin as usize).and_then(|s| s.level)
    }

    /// Snapshot of one pin
    pub fn state(&self, pin: u8) -> Option<PinState> {
        self.pins.get(pin as usize).copied()
    }
}
