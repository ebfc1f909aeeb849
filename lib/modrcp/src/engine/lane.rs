// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The modifier's two execution lanes and their view of the register
//! file.
//!
//! Both lanes share the register file, but neither sees a byte until
//! it is entitled to: bytes written by a fetch are visible to no lane
//! until it syncs on them, and bytes written by one lane's ALU are
//! visible to that lane only. A [`SyncTracker`] follows this through
//! a program and rejects any read of a byte the reading lane cannot
//! see. It knows nothing about values, only about which bytes hold
//! something.

use super::isa::Insn;
use super::isa::Op;
use super::regs::RegField;
use super::regs::Width;
use core::fmt;
use core::fmt::Display;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Lane {
    A,
    B,
}

impl Lane {
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    const fn idx(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

impl Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::B => "B",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum SyncError {
    #[error("lane {lane} reads {field} without syncing on it")]
    UnsyncedRead { lane: Lane, field: RegField },

    #[error("lane {lane} syncs on {field}, which nothing has written")]
    SyncUnwritten { lane: Lane, field: RegField },
}

/// Which register file bytes each lane may read.
///
/// Masks carry one bit per register byte, see [`RegField::mask`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SyncTracker {
    visible: [u64; 2],
    written: u64,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetch landed in `dst`; no lane sees it yet.
    pub fn fetch(&mut self, dst: RegField) {
        let mask = dst.mask();
        self.written |= mask;
        self.visible[0] &= !mask;
        self.visible[1] &= !mask;
    }

    /// `lane` wrote `dst` from its ALU.
    pub fn write(&mut self, lane: Lane, dst: RegField) {
        let mask = dst.mask();
        self.written |= mask;
        self.visible[lane.idx()] |= mask;
        self.visible[lane.other().idx()] &= !mask;
    }

    pub fn sync(
        &mut self,
        lane: Lane,
        field: RegField,
    ) -> Result<(), SyncError> {
        let mask = field.mask();
        if self.written & mask != mask {
            return Err(SyncError::SyncUnwritten { lane, field });
        }
        self.visible[lane.idx()] |= mask;
        Ok(())
    }

    /// The register holding `field` was freed: whatever it held is
    /// gone for both lanes.
    pub fn release(&mut self, field: RegField) {
        let mask = RegField::low(field.reg, Width::W32).mask();
        self.written &= !mask;
        self.visible[0] &= !mask;
        self.visible[1] &= !mask;
    }

    pub fn read(&self, lane: Lane, field: RegField) -> Result<(), SyncError> {
        if !self.can_read(lane, field) {
            return Err(SyncError::UnsyncedRead { lane, field });
        }
        Ok(())
    }

    pub fn can_read(&self, lane: Lane, field: RegField) -> bool {
        let mask = field.mask();
        self.visible[lane.idx()] & mask == mask
    }

    /// Account for one instruction: check its reads, then record its
    /// writes.
    pub fn step(&mut self, insn: &Insn) -> Result<(), SyncError> {
        let lane = insn.lane;
        match insn.op {
            Op::Nop | Op::Replace(_) | Op::NatCopy { .. } => {}

            Op::SiToReg { dst, .. } | Op::PktToReg { dst, .. } => {
                self.fetch(dst)
            }

            Op::Alu(alu) => {
                for field in alu.reads() {
                    self.read(lane, field)?;
                }
                self.write(lane, alu.dst);
            }

            Op::Sync { field } => self.sync(lane, field)?,

            Op::RegToPkt { src, .. } | Op::RegToNhdr { src, .. } => {
                self.read(lane, src)?
            }
        }
        Ok(())
    }
}
