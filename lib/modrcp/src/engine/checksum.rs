// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Internet checksum arithmetic.
//!
//! Recipes never recompute a checksum from scratch: the modifier only
//! sees the handful of fields a recipe touches, so every checksum is
//! maintained incrementally (RFC 1624). This module holds the host
//! side of that arithmetic. [`csum16_add`] and [`csum16_sub`] are
//! exactly what the modifier's `CsumAdd`/`CsumSub` ALU operations
//! compute, and are used to predict recipe results in tests and to
//! pre-fold per-flow constants into the sideband. [`Checksum`] is a
//! rolling sum over byte ranges, used to derive those constants from
//! real header bytes.
//!
//! # Header checksums vs sums
//!
//! A header stores the one's complement of the one's complement sum
//! of its 16-bit words. When a field changes from `m` to `m'`, the
//! stored checksum `HC` becomes (RFC 1624, eqn. 3):
//!
//! ```text
//! HC' = ~(~HC + ~m + m') = HC + m - m'
//! ```
//!
//! where `+` and `-` are one's complement operations. In other words
//! the *stored* checksum moves opposite to the sum: adding to a field
//! is a [`csum16_sub`] on the checksum, removing from a field is a
//! [`csum16_add`]. A TTL decremented by `d` therefore corrects the
//! IPv4 header checksum with `csum16_add(hc, d << 8)`, as the TTL is
//! the high byte of its 16-bit word.
//!
//! # Endianness
//!
//! The one's complement sum is independent of byte order as long as
//! every word is read the same way. Register values in the modifier
//! are big-endian, so the `u16` values here are the logical
//! (network order) field values. The byte based [`Checksum`] sums
//! native-endian words instead, which produces the same bytes once
//! stored back in network order (RFC 1071 1.B).

/// One's complement addition of two 16-bit values.
///
/// The end-around carry means the result is `0x0000` only when both
/// inputs are zero; any other sum congruent to zero is `0xFFFF`.
pub const fn csum16_add(a: u16, b: u16) -> u16 {
    let sum = a as u32 + b as u32;
    ((sum & 0xFFFF) + (sum >> 16)) as u16
}

/// One's complement subtraction: `a + ~b`.
pub const fn csum16_sub(a: u16, b: u16) -> u16 {
    csum16_add(a, !b)
}

/// Update a stored header checksum for a field changing from `old`
/// to `new`.
pub const fn csum16_replace(hc: u16, old: u16, new: u16) -> u16 {
    csum16_sub(csum16_add(hc, old), new)
}

/// The checksum value as it is stored in a header.
///
/// This holds the header bytes, with one's complement already
/// applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderChecksum {
    inner: [u8; 2],
}

impl HeaderChecksum {
    pub fn bytes(&self) -> [u8; 2] {
        self.inner
    }

    /// Wrap the checksum bytes found in a header.
    pub fn wrap(hc: [u8; 2]) -> Self {
        Self { inner: hc }
    }

    /// The stored checksum as a logical 16-bit value, as a recipe
    /// register would hold it.
    pub fn value(&self) -> u16 {
        u16::from_be_bytes(self.inner)
    }
}

impl From<Checksum> for HeaderChecksum {
    /// Finalize the rolling checksum and put it into header form by
    /// performing one's complement.
    fn from(mut csum: Checksum) -> HeaderChecksum {
        Self { inner: (!csum.finalize()).to_ne_bytes() }
    }
}

/// A rolling one's complement checksum calculation.
///
/// Carries are accumulated in the upper half and only folded when the
/// sum is finalized.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Checksum {
    inner: u32,
}

impl Checksum {
    pub fn new() -> Self {
        Self::from(0)
    }

    /// Add the contents of `bytes` to the sum.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.inner = csum_add(self.inner, bytes);
    }

    /// Create a new rolling checksum, starting with `bytes`.
    pub fn compute(bytes: &[u8]) -> Self {
        Self { inner: csum_add(0, bytes) }
    }

    /// Remove the contents of `bytes` from the sum.
    pub fn sub_bytes(&mut self, bytes: &[u8]) {
        self.inner = csum_sub(self.inner, bytes);
    }

    /// Fold all accumulated carries and return the sum.
    pub fn finalize(&mut self) -> u16 {
        while (self.inner >> 16) != 0 {
            self.inner = (self.inner >> 16) + (self.inner & 0xFFFF);
        }

        (self.inner & 0xFFFF) as u16
    }

    /// Finalize and return the sum as a logical (network order)
    /// value, without complementing it.
    pub fn finalize_be(&mut self) -> u16 {
        u16::from_be_bytes(self.finalize().to_ne_bytes())
    }
}

impl From<HeaderChecksum> for Checksum {
    fn from(hc: HeaderChecksum) -> Self {
        Self { inner: (!u16::from_ne_bytes(hc.bytes())) as u32 }
    }
}

impl From<u32> for Checksum {
    fn from(csum: u32) -> Self {
        Self { inner: csum }
    }
}

impl core::ops::Add for Checksum {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self { inner: self.inner + other.inner }
    }
}

impl core::ops::AddAssign for Checksum {
    fn add_assign(&mut self, other: Self) {
        self.inner += other.inner
    }
}

fn csum_add(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut chunks = bytes.chunks_exact(2);
    for pair in &mut chunks {
        csum += u16::from_ne_bytes([pair[0], pair[1]]) as u32;
    }

    // An odd trailing byte is padded with zero on the right.
    if let [last] = chunks.remainder() {
        csum += u16::from_ne_bytes([*last, 0]) as u32;
    }

    csum
}

fn csum_sub(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut chunks = bytes.chunks_exact(2);
    for pair in &mut chunks {
        csum += (!u16::from_ne_bytes([pair[0], pair[1]])) as u32;
    }

    if let [last] = chunks.remainder() {
        csum += (!u16::from_ne_bytes([*last, 0])) as u32;
    }

    csum
}

#[cfg(test)]
mod test {
    use super::*;

    // A 20-byte IPv4 header with a valid checksum (0xB861).
    #[rustfmt::skip]
    const IPV4_HDR: [u8; 20] = [
        0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00,
        0x40, 0x11, 0xB8, 0x61, 0xC0, 0xA8, 0x00, 0x01,
        0xC0, 0xA8, 0x00, 0xC7,
    ];

    fn header_csum(hdr: &[u8]) -> u16 {
        let mut copy = hdr.to_vec();
        copy[10] = 0;
        copy[11] = 0;
        HeaderChecksum::from(Checksum::compute(&copy)).value()
    }

    #[test]
    fn rolling_sum_matches_header() {
        assert_eq!(header_csum(&IPV4_HDR), 0xB861);
        let mut sum = Checksum::compute(&IPV4_HDR);
        assert_eq!(sum.finalize(), 0xFFFF);
    }

    #[test]
    fn ttl_decrement_folds_high_byte() {
        let mut hdr = IPV4_HDR;
        hdr[8] -= 3;
        let expected = header_csum(&hdr);
        assert_eq!(csum16_add(0xB861, 3 << 8), expected);
    }

    #[test]
    fn replace_field() {
        // Rewrite the total length from 0x73 to 0x1C.
        let mut hdr = IPV4_HDR;
        hdr[3] = 0x1C;
        let expected = header_csum(&hdr);
        assert_eq!(csum16_replace(0xB861, 0x0073, 0x001C), expected);
    }

    #[test]
    fn zero_only_from_zeroes() {
        assert_eq!(csum16_add(0, 0), 0);
        assert_eq!(csum16_add(0xFFFF, 0), 0xFFFF);
        assert_eq!(csum16_add(0xFFFF, 0xFFFF), 0xFFFF);
        assert_eq!(csum16_add(0x8000, 0x8000), 0x0001);
        assert_eq!(csum16_sub(0x1234, 0x1234), 0xFFFF);
    }

    #[test]
    fn sub_bytes_undoes_add_bytes() {
        let mut sum = Checksum::compute(&IPV4_HDR[..12]);
        let mut copy = sum;
        let before = copy.finalize();
        sum.add_bytes(&[0xDE, 0xAD, 0xBE]);
        sum.sub_bytes(&[0xDE, 0xAD, 0xBE]);
        let after = sum.finalize();
        // Adding then subtracting may only flip between the two
        // representations of zero, never change the value.
        assert_eq!(before % 0xFFFF, after % 0xFFFF);
    }
}
