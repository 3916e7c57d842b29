//! Bit addressing: validation of indices and ranges, translation into
//! primitive commands, and the [`BitSnapshot`] value type.

use keyspace_types::bits::{self, MAX_BIT_INDEX};
use keyspace_types::{BitOp, Command};

use crate::error::Error;

/// A validated bit offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BitIndex(u64);

impl BitIndex {
    pub(crate) fn new(index: u64) -> Result<Self, Error> {
        if index > MAX_BIT_INDEX {
            return Err(Error::InvalidArgument(format!(
                "bit index {index} exceeds maximum {MAX_BIT_INDEX}"
            )));
        }
        Ok(Self(index))
    }

    pub(crate) fn get(self, key: String) -> Command {
        Command::GetBit {
            key,
            offset: self.0,
        }
    }

    pub(crate) fn set(self, key: String, value: bool) -> Command {
        Command::SetBit {
            key,
            offset: self.0,
            value,
        }
    }
}

/// A validated half-open range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BitRange {
    from: u64,
    to: u64,
}

impl BitRange {
    pub(crate) fn new(from: u64, to: u64) -> Result<Self, Error> {
        if from > to {
            return Err(Error::InvalidArgument(format!(
                "range start {from} is greater than end {to}"
            )));
        }
        if to > MAX_BIT_INDEX + 1 {
            return Err(Error::InvalidArgument(format!(
                "range end {to} exceeds maximum {}",
                MAX_BIT_INDEX + 1
            )));
        }
        Ok(Self { from, to })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.from == self.to
    }

    pub(crate) fn fill(self, key: String, value: bool) -> Command {
        Command::BitFill {
            key,
            from: self.from,
            to: self.to,
            value,
        }
    }
}

/// `dest = dest <op> names...`, evaluated by the store in one step.
pub(crate) fn combine<I, S>(op: BitOp, dest: String, names: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sources = vec![dest.clone()];
    sources.extend(names.into_iter().map(|name| name.as_ref().to_string()));
    Command::BitOp { op, dest, sources }
}

/// A fixed-size vector of bits, laid out exactly like a remote bitset's
/// byte value (bit 0 is the most significant bit of byte 0).
///
/// Used to overwrite a remote bitset wholesale with
/// [`RemoteBitSet::set_snapshot`](crate::RemoteBitSet::set_snapshot) and
/// returned by [`RemoteBitSet::as_snapshot`](crate::RemoteBitSet::as_snapshot).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSnapshot {
    bytes: Vec<u8>,
    len: u64,
}

impl BitSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every bit of `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64 * 8;
        Self { bytes, len }
    }

    /// Takes the first `len` bits of `bytes`.
    ///
    /// `bytes` must be exactly as long as `len` bits need; bits of the last
    /// byte beyond `len` are cleared.
    pub fn with_len(mut bytes: Vec<u8>, len: u64) -> Result<Self, Error> {
        if len > MAX_BIT_INDEX + 1 || bits::byte_len(len) != bytes.len() {
            return Err(Error::InvalidArgument(format!(
                "malformed snapshot: {} bytes cannot hold exactly {} bits",
                bytes.len(),
                len
            )));
        }
        let tail = len % 8;
        if tail != 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= 0xffu8 << (8 - tail);
            }
        }
        Ok(Self { bytes, len })
    }

    /// Builds a snapshot with the given bits set, sized to the highest one.
    pub fn from_indices<I>(indices: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut snapshot = Self::new();
        for index in indices {
            snapshot.set(index, true)?;
        }
        Ok(snapshot)
    }

    pub fn get(&self, index: u64) -> bool {
        if index >= self.len {
            return false;
        }
        self.bytes[bits::byte_index(index)] & bits::bit_mask(index) != 0
    }

    /// Sets one bit, growing the snapshot when `index` is past its end.
    pub fn set(&mut self, index: u64, value: bool) -> Result<(), Error> {
        let index = BitIndex::new(index)?.0;
        if index >= self.len {
            if !value {
                return Ok(());
            }
            self.len = index + 1;
            self.bytes.resize(bits::byte_len(self.len), 0);
        }
        let byte = &mut self.bytes[bits::byte_index(index)];
        if value {
            *byte |= bits::bit_mask(index);
        } else {
            *byte &= !bits::bit_mask(index);
        }
        Ok(())
    }

    /// Number of bits the snapshot holds.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the highest set bit plus one.
    pub fn length(&self) -> u64 {
        bits::logical_len(&self.bytes)
    }

    pub fn cardinality(&self) -> u64 {
        bits::count_ones(&self.bytes)
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).filter(|i| self.get(*i))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub(crate) fn overwrite(&self, key: String) -> Command {
        Command::Set {
            key,
            value: self.bytes.clone(),
        }
    }
}
