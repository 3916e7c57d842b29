//! Byte-level bit manipulation behind the bit commands.

use keyspace_types::bits::{bit_mask, byte_index, byte_len};
use keyspace_types::BitOp;

pub fn get_bit(value: &[u8], offset: u64) -> bool {
    value
        .get(byte_index(offset))
        .is_some_and(|byte| byte & bit_mask(offset) != 0)
}

/// Writes one bit, growing `value` with zero bytes as needed, and returns the
/// bit's previous state.
pub fn set_bit(value: &mut Vec<u8>, offset: u64, bit: bool) -> bool {
    let index = byte_index(offset);
    if index >= value.len() {
        value.resize(index + 1, 0);
    }
    let mask = bit_mask(offset);
    let previous = value[index] & mask != 0;
    if bit {
        value[index] |= mask;
    } else {
        value[index] &= !mask;
    }
    previous
}

/// Writes `bit` to every offset in `[from, to)`.
pub fn fill(value: &mut Vec<u8>, from: u64, to: u64, bit: bool) {
    if from >= to {
        return;
    }
    let needed = byte_len(to);
    if needed > value.len() {
        value.resize(needed, 0);
    }

    let mut offset = from;
    while offset < to && offset % 8 != 0 {
        set_bit(value, offset, bit);
        offset += 1;
    }
    let whole = if bit { 0xff } else { 0x00 };
    while offset + 8 <= to {
        value[byte_index(offset)] = whole;
        offset += 8;
    }
    while offset < to {
        set_bit(value, offset, bit);
        offset += 1;
    }
}

pub fn invert(value: &mut [u8]) {
    for byte in value.iter_mut() {
        *byte = !*byte;
    }
}

/// Folds `op` over all operands. The result is as long as the longest
/// operand; shorter ones are padded with zero bytes.
pub fn combine(op: BitOp, operands: &[Vec<u8>]) -> Vec<u8> {
    let len = operands.iter().map(Vec::len).max().unwrap_or(0);
    let mut iter = operands.iter();
    let mut result = match iter.next() {
        Some(first) => first.clone(),
        None => return Vec::new(),
    };
    result.resize(len, 0);

    for operand in iter {
        for (i, byte) in result.iter_mut().enumerate() {
            *byte = op.apply(*byte, operand.get(i).copied().unwrap_or(0));
        }
    }
    result
}
