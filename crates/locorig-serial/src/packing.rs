//! MSB-first bit packing for outbound commands
//!
//! Fields are written most significant bit first, back to back, with no
//! padding between them. The output is `ceil(total_bits / 8)` bytes and the
//! unused low bits of the last byte are zero.

use crate::error::{Result, SerialError};

/// Accumulates fixed-width fields into a byte buffer
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` as a `width`-bit field
    pub fn push(&mut self, value: u64, width: u8) -> Result<&mut Self> {
        if width == 0 || width > 64 {
            return Err(SerialError::InvalidWidth(width));
        }
        if width < 64 && value >> width != 0 {
            return Err(SerialError::FieldOverflow { value, width });
        }
        for i in (0..width).rev() {
            let offset = self.bits % 8;
            if offset == 0 {
                self.bytes.push(0);
            }
            if (value >> i) & 1 == 1 {
                if let Some(last) = self.bytes.last_mut() {
                    *last |= 0x80 >> offset;
                }
            }
            self.bits += 1;
        }
        Ok(self)
    }

    /// Number of bits written so far
    pub fn bit_len(&self) -> usize {
        self.bits
    }

    /// Finish and return the packed bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Pack `(value, width)` fields in order
pub fn pack(fields: &[(u64, u8)]) -> Result<Vec<u8>> {
    let mut writer = BitWriter::new();
    for &(value, width) in fields {
        writer.push(value, width)?;
    }
    Ok(writer.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_set_layout() {
        let bytes = pack(&[(4095, 12), (0, 1), (13, 7)]).unwrap();
        assert_eq!(bytes, vec![0xFF, 0xF0, 0xD0]);
    }

    #[test]
    fn test_byte_aligned_fields() {
        assert_eq!(pack(&[(254, 8), (3, 8), (200, 8)]).unwrap(), vec![254, 3, 200]);
        assert_eq!(pack(&[(0xABCDEF, 24)]).unwrap(), vec![0xAB, 0xCD, 0xEF]);
    }

    #[test]
    fn test_output_length() {
        let mut writer = BitWriter::new();
        writer.push(1, 1).unwrap().push(0, 7).unwrap().push(1, 1).unwrap();
        assert_eq!(writer.bit_len(), 9);
        assert_eq!(writer.into_bytes(), vec![0x80, 0x80]);
        assert!(pack(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_overflow_rejected() {
        let err = pack(&[(128, 7)]).unwrap_err();
        assert!(matches!(err, SerialError::FieldOverflow { value: 128, width: 7 }));
        assert!(pack(&[(1 << 24, 24)]).is_err());
        assert!(pack(&[(1, 0)]).is_err());
    }

    #[test]
    fn test_full_width_field() {
        let bytes = pack(&[(u64::MAX, 64)]).unwrap();
        assert_eq!(bytes, vec![0xFF; 8]);
    }
}
