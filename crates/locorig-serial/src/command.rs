//! Outbound commands and the one-byte pin state code
//!
//! Pin states travel as a single byte: codes `0..=126` mean the pin of the
//! same number is low, codes `127..=253` mean pin `code - 127` is high.
//! Every other command is a bit-packed frame led by a 12-bit opcode.
//!
//! | Command | Field widths |
//! |---|---|
//! | SetBinary | 8 |
//! | SetAddress | 8, 8, 8 |
//! | Stop | 12, 1, 7 |
//! | SetPulse | 12, 7, 1, 24, 24, 24 |
//! | SetChirp | 12, 7, 24, 24, 24, 24, 24 |
//! | GetBinary | 12, 7, 24, 24, 8 |
//! | GetLevel | 12, 7, 24, 24 |
//! | GetRotation | 12, 7, 7, 8 |

use serde::{Deserialize, Serialize};

use crate::config::MAX_PIN;
use crate::error::{Result, SerialError};
use crate::packing::pack;

/// Opcode of both stop commands
pub const OP_STOP: u64 = 4095;
/// Opcode of `SetPulse`
pub const OP_SET_PULSE: u64 = 4080;
/// Opcode of `SetChirp`
pub const OP_SET_CHIRP: u64 = 4081;
/// Opcode of `GetBinary`
pub const OP_GET_BINARY: u64 = 4088;
/// Opcode of `GetLevel`
pub const OP_GET_LEVEL: u64 = 4089;
/// Opcode of `GetRotation`
pub const OP_GET_ROTATION: u64 = 4090;
/// First byte of a `SetAddress` frame
pub const SET_ADDRESS_PREFIX: u8 = 254;

const OPCODE_BITS: u8 = 12;
const PIN_BITS: u8 = 7;
const DURATION_BITS: u8 = 24;

/// Logic level of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Level 0
    Low,
    /// Level 1
    High,
}

impl Level {
    /// Numeric level, 0 or 1
    pub fn as_u8(&self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    /// `High` for any non-zero value
    pub fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Level::Low
        } else {
            Level::High
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Which acquisition a stop command ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Stop driving the pin
    Set,
    /// Stop reporting the pin
    Get,
}

/// A command understood by the rig firmware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Drive a pin to a level
    SetBinary {
        /// Target pin
        pin: u8,
        /// Level to drive
        level: Level,
    },
    /// Write a raw value to a device address
    SetAddress {
        /// Device address
        address: u8,
        /// Value to store
        value: u8,
    },
    /// End an output or an acquisition on a pin
    Stop {
        /// Target pin
        pin: u8,
        /// Output or acquisition
        mode: StopMode,
    },
    /// Emit a square wave
    SetPulse {
        /// Target pin
        pin: u8,
        /// First level of each period
        start: Level,
        /// Low phase duration
        low: u32,
        /// High phase duration
        high: u32,
        /// Number of periods
        repetitions: u32,
    },
    /// Emit a wave whose phase durations ramp linearly
    SetChirp {
        /// Target pin
        pin: u8,
        /// Low phase at the start
        low_start: u32,
        /// Low phase at the end
        low_end: u32,
        /// High phase at the start
        high_start: u32,
        /// High phase at the end
        high_end: u32,
        /// Total duration
        duration: u32,
    },
    /// Report debounced edges of a pin, counting each with `weight`
    GetBinary {
        /// Source pin
        pin: u8,
        /// Debounce on rising edges
        debounce_rising: u32,
        /// Debounce on falling edges
        debounce_falling: u32,
        /// Signed count per edge
        weight: i8,
    },
    /// Report debounced level changes of a pin
    GetLevel {
        /// Source pin
        pin: u8,
        /// Debounce on rising edges
        debounce_rising: u32,
        /// Debounce on falling edges
        debounce_falling: u32,
    },
    /// Report a quadrature encoder on two pins
    GetRotation {
        /// Channel A, which carries the count
        pin_a: u8,
        /// Channel B
        pin_b: u8,
        /// Signed count per step
        weight: i8,
    },
}

impl Command {
    /// Encode to wire bytes, validating pins and field widths
    pub fn encode(&self) -> Result<Vec<u8>> {
        match *self {
            Command::SetBinary { pin, level } => Ok(vec![encode_state(pin, level)?]),
            Command::SetAddress { address, value } => {
                Ok(vec![SET_ADDRESS_PREFIX, address, value])
            }
            Command::Stop { pin, mode } => {
                let mode = match mode {
                    StopMode::Set => 0,
                    StopMode::Get => 1,
                };
                pack(&[(OP_STOP, OPCODE_BITS), (mode, 1), (check_pin(pin)?, PIN_BITS)])
            }
            Command::SetPulse {
                pin,
                start,
                low,
                high,
                repetitions,
            } => pack(&[
                (OP_SET_PULSE, OPCODE_BITS),
                (check_pin(pin)?, PIN_BITS),
                (start.as_u8() as u64, 1),
                (low as u64, DURATION_BITS),
                (high as u64, DURATION_BITS),
                (repetitions as u64, DURATION_BITS),
            ]),
            Command::SetChirp {
                pin,
                low_start,
                low_end,
                high_start,
                high_end,
                duration,
            } => pack(&[
                (OP_SET_CHIRP, OPCODE_BITS),
                (check_pin(pin)?, PIN_BITS),
                (low_start as u64, DURATION_BITS),
                (low_end as u64, DURATION_BITS),
                (high_start as u64, DURATION_BITS),
                (high_end as u64, DURATION_BITS),
                (duration as u64, DURATION_BITS),
            ]),
            Command::GetBinary {
                pin,
                debounce_rising,
                debounce_falling,
                weight,
            } => pack(&[
                (OP_GET_BINARY, OPCODE_BITS),
                (check_pin(pin)?, PIN_BITS),
                (debounce_rising as u64, DURATION_BITS),
                (debounce_falling as u64, DURATION_BITS),
                (weight as u8 as u64, 8),
            ]),
            Command::GetLevel {
                pin,
                debounce_rising,
                debounce_falling,
            } => pack(&[
                (OP_GET_LEVEL, OPCODE_BITS),
                (check_pin(pin)?, PIN_BITS),
                (debounce_rising as u64, DURATION_BITS),
                (debounce_falling as u64, DURATION_BITS),
            ]),
            Command::GetRotation {
                pin_a,
                pin_b,
                weight,
            } => pack(&[
                (OP_GET_ROTATION, OPCODE_BITS),
                (check_pin(pin_a)?, PIN_BITS),
                (check_pin(pin_b)?, PIN_BITS),
                (weight as u8 as u64, 8),
            ]),
        }
    }

    /// Pins whose counters restart and the weight each gets, applied
    /// locally when the command is issued
    pub fn acquisition(&self) -> Vec<(u8, i32)> {
        match *self {
            Command::GetBinary { pin, weight, .. } => vec![(pin, weight as i32)],
            Command::GetLevel { pin, .. } => vec![(pin, 1)],
            Command::GetRotation {
                pin_a,
                pin_b,
                weight,
            } => vec![(pin_a, weight as i32), (pin_b, 0)],
            _ => Vec::new(),
        }
    }
}

fn check_pin(pin: u8) -> Result<u64> {
    if pin > MAX_PIN {
        return Err(SerialError::InvalidPin {
            pin: pin as u32,
            max: MAX_PIN,
        });
    }
    Ok(pin as u64)
}

/// One-byte code for `pin` at `level`
pub fn encode_state(pin: u8, level: Level) -> Result<u8> {
    check_pin(pin)?;
    Ok(match level {
        Level::Low => pin,
        Level::High => pin + MAX_PIN + 1,
    })
}

/// Pin and level carried by a state byte; `None` for 254 and 255
pub fn decode_state(code: u8) -> Option<(u8, Level)> {
    if code <= MAX_PIN {
        Some((code, Level::Low))
    } else if code - (MAX_PIN + 1) <= MAX_PIN {
        Some((code - (MAX_PIN + 1), Level::High))
    } else {
        None
    }
}
