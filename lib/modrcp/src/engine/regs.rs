// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The modifier's register file.
//!
//! There are [`NUM_REGS`] registers of [`REG_BYTES`] bytes each. A
//! register is big-endian and can be addressed as a whole, as either
//! 16-bit half, or as any single byte; a [`RegField`] names one such
//! view. The last two registers are the compare registers: they are
//! the only ones a conditional ALU operation may test.
//!
//! Registers are scratch. Nothing is carried from one packet to the
//! next, and a recipe must write every byte before it reads it. Which
//! value lives in which register is decided per recipe by a
//! [`RegAlloc`], which hands out whole registers against symbolic
//! names so a builder never juggles raw indexes.

use super::isa::EncodeError;
use core::fmt;
use core::fmt::Display;
use core::ops::RangeInclusive;
use thiserror::Error;

pub const NUM_REGS: u8 = 16;
pub const REG_BYTES: u8 = 4;

/// The registers a condition may test.
pub const CMP_REGS: RangeInclusive<u8> = 14..=15;

/// The general purpose registers.
pub const GP_REGS: RangeInclusive<u8> = 0..=13;

/// The width of a register field or memory access.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Width {
    W8,
    W16,
    W32,
}

impl Width {
    pub const fn bytes(self) -> u8 {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W32 => 4,
        }
    }

    pub const fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Mask of the low `self.bits()` bits.
    pub const fn max_value(self) -> u32 {
        match self {
            Self::W8 => 0xFF,
            Self::W16 => 0xFFFF,
            Self::W32 => 0xFFFF_FFFF,
        }
    }

    /// The two-bit code used in instruction words.
    pub const fn code(self) -> u64 {
        match self {
            Self::W8 => 0,
            Self::W16 => 1,
            Self::W32 => 2,
        }
    }

    pub fn from_code(code: u64) -> Result<Self, EncodeError> {
        match code {
            0 => Ok(Self::W8),
            1 => Ok(Self::W16),
            2 => Ok(Self::W32),
            _ => Err(EncodeError::BadWidthCode(code as u8)),
        }
    }
}

/// A byte-lane view of one register.
///
/// `off` is the index of the most significant byte of the view,
/// counting from the register's most significant byte. A valid field
/// is naturally aligned and lies within its register.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RegField {
    pub reg: u8,
    pub off: u8,
    pub width: Width,
}

impl RegField {
    pub const fn new(reg: u8, off: u8, width: Width) -> Self {
        Self { reg, off, width }
    }

    /// The low `width` bytes of register `reg`.
    pub const fn low(reg: u8, width: Width) -> Self {
        Self { reg, off: REG_BYTES - width.bytes(), width }
    }

    /// Check that this field names real bytes of one register.
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.reg >= NUM_REGS {
            return Err(EncodeError::BadReg(self.reg));
        }

        let width = self.width.bytes();
        if self.off % width != 0 || self.off + width > REG_BYTES {
            return Err(EncodeError::Misaligned {
                reg: self.reg,
                off: self.off,
                width,
            });
        }

        Ok(())
    }

    pub fn is_cmp(&self) -> bool {
        CMP_REGS.contains(&self.reg)
    }

    /// The same register viewed at a different width, keeping the
    /// low bytes.
    pub const fn resize(self, width: Width) -> Self {
        Self::low(self.reg, width)
    }

    /// Byte `n` (0 = most significant) of this field.
    pub const fn byte(self, n: u8) -> Self {
        Self { reg: self.reg, off: self.off + n, width: Width::W8 }
    }

    /// The register file bytes this field covers, one bit per byte.
    ///
    /// Bit `reg * 4 + off` is the field's first byte, so the whole
    /// file fits in a `u64`.
    pub fn mask(&self) -> u64 {
        let lanes = (1u64 << self.width.bytes()) - 1;
        let shift = u32::from(self.reg) * u32::from(REG_BYTES)
            + u32::from(self.off);
        lanes.checked_shl(shift).unwrap_or(0)
    }

    /// Pack as the 8-bit operand used in instruction words:
    /// `reg[7:4] off[3:2] width[1:0]`.
    pub fn encode(&self) -> Result<u64, EncodeError> {
        self.validate()?;
        Ok((u64::from(self.reg) << 4)
            | (u64::from(self.off) << 2)
            | self.width.code())
    }

    pub fn decode(bits: u64) -> Result<Self, EncodeError> {
        let field = Self {
            reg: ((bits >> 4) & 0xF) as u8,
            off: ((bits >> 2) & 0x3) as u8,
            width: Width::from_code(bits & 0x3)?,
        };
        field.validate()?;
        Ok(field)
    }
}

impl Display for RegField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.width {
            Width::W32 => write!(f, "r{}", self.reg),
            Width::W16 => write!(f, "r{}.h{}", self.reg, self.off / 2),
            Width::W8 => write!(f, "r{}.b{}", self.reg, self.off),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum AllocError {
    #[error("no free {pool} register for {sym}")]
    OutOfRegisters { sym: &'static str, pool: &'static str },

    #[error("symbol {0} is already allocated")]
    DuplicateSymbol(&'static str),
}

/// Per-recipe mapping of symbolic values to physical registers.
///
/// Every symbol gets a whole register; the returned field is the
/// register's low bytes at the requested width, and narrower or wider
/// views of the same register are derived from it. A register stays
/// bound until it is freed, so two live symbols never alias.
#[derive(Clone, Debug, Default)]
pub struct RegAlloc {
    syms: [Option<&'static str>; NUM_REGS as usize],
}

impl RegAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a general purpose register for `sym`.
    pub fn alloc(
        &mut self,
        sym: &'static str,
        width: Width,
    ) -> Result<RegField, AllocError> {
        self.alloc_from(sym, width, GP_REGS, "general")
    }

    /// Allocate a compare register for `sym`.
    pub fn alloc_cmp(
        &mut self,
        sym: &'static str,
        width: Width,
    ) -> Result<RegField, AllocError> {
        self.alloc_from(sym, width, CMP_REGS, "compare")
    }

    fn alloc_from(
        &mut self,
        sym: &'static str,
        width: Width,
        pool: RangeInclusive<u8>,
        pool_name: &'static str,
    ) -> Result<RegField, AllocError> {
        if self.lookup(sym).is_some() {
            return Err(AllocError::DuplicateSymbol(sym));
        }

        let reg = pool
            .into_iter()
            .find(|r| self.syms[usize::from(*r)].is_none())
            .ok_or(AllocError::OutOfRegisters { sym, pool: pool_name })?;
        self.syms[usize::from(reg)] = Some(sym);
        Ok(RegField::low(reg, width))
    }

    /// Release the register holding `field`.
    pub fn free(&mut self, field: RegField) {
        if let Some(slot) = self.syms.get_mut(usize::from(field.reg)) {
            *slot = None;
        }
    }

    /// Return the register currently bound to `sym`.
    pub fn lookup(&self, sym: &str) -> Option<u8> {
        self.syms
            .iter()
            .position(|s| *s == Some(sym))
            .map(|r| r as u8)
    }

    /// The number of registers currently bound.
    pub fn live(&self) -> usize {
        self.syms.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn field_validation() {
        assert!(RegField::new(0, 0, Width::W32).validate().is_ok());
        assert!(RegField::new(15, 2, Width::W16).validate().is_ok());
        assert!(RegField::new(15, 3, Width::W8).validate().is_ok());
        assert_eq!(
            RegField::new(16, 0, Width::W8).validate(),
            Err(EncodeError::BadReg(16))
        );
        assert!(RegField::new(3, 1, Width::W16).validate().is_err());
        assert!(RegField::new(3, 2, Width::W32).validate().is_err());
        assert!(RegField::new(3, 4, Width::W8).validate().is_err());
    }

    #[test]
    fn masks_cover_bytes() {
        assert_eq!(RegField::new(0, 0, Width::W32).mask(), 0xF);
        assert_eq!(RegField::new(1, 2, Width::W16).mask(), 0b1100 << 4);
        assert_eq!(RegField::new(15, 3, Width::W8).mask(), 1 << 63);
        let word = RegField::low(5, Width::W32);
        assert_eq!(word.byte(3), RegField::low(5, Width::W8));
        assert_eq!(word.byte(0).mask() & word.mask(), word.byte(0).mask());
    }

    #[test]
    fn operand_bits_decode() {
        let field = RegField::new(9, 2, Width::W16);
        let bits = field.encode().unwrap();
        assert_eq!(bits, 0x95);
        assert_eq!(RegField::decode(bits), Ok(field));
        assert!(RegField::decode(0x93).is_err());
    }

    #[test]
    fn alloc_pools() {
        let mut ra = RegAlloc::new();
        let a = ra.alloc("a", Width::W16).unwrap();
        assert_eq!(a, RegField::new(0, 2, Width::W16));
        let c = ra.alloc_cmp("c", Width::W16).unwrap();
        assert!(c.is_cmp());
        assert!(!a.is_cmp());
        assert_eq!(
            ra.alloc("a", Width::W8),
            Err(AllocError::DuplicateSymbol("a"))
        );
        assert_eq!(ra.lookup("c"), Some(14));
        assert_eq!(ra.live(), 2);
    }

    #[test]
    fn alloc_exhaustion_and_reuse() {
        let mut ra = RegAlloc::new();
        const NAMES: [&str; 14] = [
            "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9",
            "s10", "s11", "s12", "s13",
        ];
        let fields: Vec<_> = NAMES
            .iter()
            .map(|n| ra.alloc(n, Width::W32).unwrap())
            .collect();
        assert_eq!(
            ra.alloc("extra", Width::W8),
            Err(AllocError::OutOfRegisters { sym: "extra", pool: "general" })
        );
        ra.free(fields[4]);
        assert_eq!(ra.alloc("extra", Width::W8).unwrap().reg, 4);
        assert!(ra.alloc_cmp("c0", Width::W8).is_ok());
        assert!(ra.alloc_cmp("c1", Width::W8).is_ok());
        assert!(ra.alloc_cmp("c2", Width::W8).is_err());
    }
}
