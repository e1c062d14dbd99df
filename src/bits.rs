// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use smallvec::SmallVec;

use crate::frame::Coil;

/// Packed bits as transmitted for coils and discrete inputs.
///
/// 8 bits are packed into a byte, the first bit into the least significant
/// position. The trailing partial byte is padded with zeros.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitVector {
    bytes: SmallVec<[u8; 32]>,
    size: usize,
}

impl BitVector {
    /// Creates a vector of `size` bits that are all cleared.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let mut bytes = SmallVec::new();
        bytes.resize(packed_size(size), 0);
        Self { bytes, size }
    }

    /// Wraps packed bytes as received from the wire.
    ///
    /// The logical size is `8 * bytes.len()` until it is trimmed.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: SmallVec::from_slice(bytes),
            size: bytes.len() * 8,
        }
    }

    /// Number of logical bits.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of bytes needed to transmit all bits.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        packed_size(self.size)
    }

    /// The packed representation, without any bytes beyond [`Self::byte_size()`].
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.byte_size()]
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Coil> {
        (index < self.size).then(|| (self.bytes[index / 8] >> (index % 8)) & 0b1 > 0)
    }

    /// Sets the bit at `index`, returning `false` if it is out of range.
    pub fn set(&mut self, index: usize, value: Coil) -> bool {
        if index >= self.size {
            return false;
        }
        let mask = 1 << (index % 8);
        if value {
            self.bytes[index / 8] |= mask;
        } else {
            self.bytes[index / 8] &= !mask;
        }
        true
    }

    /// Shrinks the logical size to `size` bits.
    ///
    /// The vector never grows. Padding bits of the last byte are cleared.
    pub fn trim(&mut self, size: usize) {
        if size >= self.size {
            return;
        }
        self.size = size;
        self.bytes.truncate(packed_size(size));
        if size % 8 != 0 {
            if let Some(last) = self.bytes.last_mut() {
                *last &= (1 << (size % 8)) - 1;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Coil> + '_ {
        (0..self.size).map(|index| (self.bytes[index / 8] >> (index % 8)) & 0b1 > 0)
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Coil> {
        self.iter().collect()
    }
}

/// Number of bytes needed to pack `bit_count` bits.
#[must_use]
pub const fn packed_size(bit_count: usize) -> usize {
    (bit_count + 7) / 8
}

impl From<&[Coil]> for BitVector {
    fn from(from: &[Coil]) -> Self {
        let mut bits = Self::new(from.len());
        for (i, b) in from.iter().enumerate() {
            let v = u8::from(*b); // 0 or 1
            bits.bytes[i / 8] |= v << (i % 8);
        }
        bits
    }
}

impl From<Vec<Coil>> for BitVector {
    fn from(from: Vec<Coil>) -> Self {
        Self::from(from.as_slice())
    }
}

impl FromIterator<Coil> for BitVector {
    fn from_iter<I: IntoIterator<Item = Coil>>(iter: I) -> Self {
        let coils: Vec<_> = iter.into_iter().collect();
        Self::from(coils)
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitVector(")?;
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        write!(f, ")")
    }
}
