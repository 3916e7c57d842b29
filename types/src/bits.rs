//! Bit position math.
//!
//! Bit `i` of a value lives in byte `i / 8`, most significant bit first, so
//! bit 0 is `0x80` of byte 0 and bit 9 is `0x40` of byte 1.

/// Largest addressable bit offset.
pub const MAX_BIT_INDEX: u64 = (1 << 32) - 1;

pub fn byte_index(bit: u64) -> usize {
    (bit / 8) as usize
}

pub fn bit_mask(bit: u64) -> u8 {
    0x80 >> (bit % 8)
}

/// Number of bytes needed to hold `bits` bits.
pub fn byte_len(bits: u64) -> usize {
    bits.div_ceil(8) as usize
}

/// Index of the highest set bit plus one, or 0 when no bit is set.
pub fn logical_len(bytes: &[u8]) -> u64 {
    match bytes.iter().rposition(|b| *b != 0) {
        Some(pos) => {
            let byte = bytes[pos];
            pos as u64 * 8 + (8 - byte.trailing_zeros() as u64)
        }
        None => 0,
    }
}

pub fn count_ones(bytes: &[u8]) -> u64 {
    bytes.iter().map(|b| b.count_ones() as u64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions() {
        assert_eq!(byte_index(0), 0);
        assert_eq!(bit_mask(0), 0x80);
        assert_eq!(byte_index(9), 1);
        assert_eq!(bit_mask(9), 0x40);
        assert_eq!(bit_mask(15), 0x01);
    }

    #[test]
    fn test_byte_len() {
        assert_eq!(byte_len(0), 0);
        assert_eq!(byte_len(1), 1);
        assert_eq!(byte_len(8), 1);
        assert_eq!(byte_len(9), 2);
    }

    #[test]
    fn test_logical_len() {
        assert_eq!(logical_len(&[]), 0);
        assert_eq!(logical_len(&[0, 0]), 0);
        // bit 5 -> 0b0000_0100
        assert_eq!(logical_len(&[0x04]), 6);
        assert_eq!(logical_len(&[0x80, 0x01, 0x00]), 16);
    }

    #[test]
    fn test_count_ones() {
        assert_eq!(count_ones(&[0xff, 0x01]), 9);
        assert_eq!(count_ones(&[]), 0);
    }
}
