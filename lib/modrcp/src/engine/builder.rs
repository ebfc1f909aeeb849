// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Emitting recipe programs.
//!
//! A [`RecipeBuilder`] owns one program under construction along with
//! everything needed to keep it sound: the register allocator, the
//! lane [`SyncTracker`], and what the program has done to the packet
//! so far. Instructions are emitted through a [`LaneCursor`], one per
//! lane, which all append to the same program. Every instruction is
//! encoded and checked as it is emitted, and the first failure is
//! returned to the caller; there is no way to get a [`Program`] out of
//! a builder which saw an error.

use super::isa::Alu;
use super::isa::AluOp;
use super::isa::EncodeError;
use super::isa::Insn;
use super::isa::Op;
use super::isa::Operand;
use super::lane::Lane;
use super::lane::SyncError;
use super::lane::SyncTracker;
use super::layout::Layer;
use super::layout::NhdrField;
use super::layout::PktField;
use super::layout::Replace;
use super::layout::SiField;
use super::layout::StripOffset;
use super::program::Program;
use super::program::ProgramFull;
use super::regs::AllocError;
use super::regs::RegAlloc;
use super::regs::RegField;
use super::regs::Width;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum BuildError {
    #[error("instruction encoding failure: {0}")]
    Encode(#[from] EncodeError),

    #[error("register allocation failure: {0}")]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    TooLong(#[from] ProgramFull),

    #[error("layer {0} is discarded by the header replace")]
    StrippedRegion(Layer),

    #[error("template store before the header replace")]
    TemplateBeforeReplace,

    #[error("more than one header replace")]
    DuplicateReplace,

    #[error("instruction emitted after completion")]
    AfterComplete,
}

/// Bit per [`Layer`] code.
fn layer_bit(layer: Layer) -> u8 {
    1 << layer.code()
}

#[derive(Debug, Default)]
pub struct RecipeBuilder {
    prog: Program,
    regs: RegAlloc,
    sync: SyncTracker,
    replace: Option<Replace>,
    // Layers the program has already modified.
    stored: u8,
    complete: bool,
}

impl RecipeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cursor emitting on `lane`.
    pub fn lane(&mut self, lane: Lane) -> LaneCursor<'_> {
        LaneCursor { b: self, lane }
    }

    pub fn alloc(
        &mut self,
        sym: &'static str,
        width: Width,
    ) -> Result<RegField, BuildError> {
        Ok(self.regs.alloc(sym, width)?)
    }

    pub fn alloc_cmp(
        &mut self,
        sym: &'static str,
        width: Width,
    ) -> Result<RegField, BuildError> {
        Ok(self.regs.alloc_cmp(sym, width)?)
    }

    /// Release `field`'s register. Its contents are no longer readable
    /// by either lane, so a later owner must write it first.
    pub fn free(&mut self, field: RegField) {
        self.regs.free(field);
        self.sync.release(field);
    }

    /// The header replace emitted so far, if any.
    pub fn replace(&self) -> Option<Replace> {
        self.replace
    }

    /// Replace the start of the packet with the header template.
    pub fn replace_hdr(
        &mut self,
        strip: StripOffset,
        extra: u8,
    ) -> Result<(), BuildError> {
        self.emit(Insn::new(Lane::A, Op::Replace(Replace { strip, extra })))
    }

    /// Copy the sideband NAT addresses (and ports) into the IPv4
    /// header at `layer`.
    pub fn nat_copy(
        &mut self,
        layer: Layer,
        ports: bool,
    ) -> Result<(), BuildError> {
        self.emit(Insn::new(Lane::A, Op::NatCopy { layer, ports }))
    }

    fn stripped(&self, layer: Layer) -> bool {
        self.replace.is_some_and(|r| layer.stripped_by(r))
    }

    fn check_region(&self, op: &Op) -> Result<(), BuildError> {
        match op {
            Op::Replace(rep) => {
                if self.replace.is_some() {
                    return Err(BuildError::DuplicateReplace);
                }
                for code in 0..8 {
                    if self.stored & (1 << code) == 0 {
                        continue;
                    }
                    if let Some(layer) = Layer::from_code(code) {
                        if layer.stripped_by(*rep) {
                            return Err(BuildError::StrippedRegion(layer));
                        }
                    }
                }
            }

            Op::PktToReg { src: PktField { layer, .. }, .. }
            | Op::RegToPkt { dst: PktField { layer, .. }, .. } => {
                if self.stripped(*layer) {
                    return Err(BuildError::StrippedRegion(*layer));
                }
            }

            Op::NatCopy { layer, ports } => {
                let l4 = if *ports { layer.l4() } else { None };
                for l in core::iter::once(*layer).chain(l4) {
                    if self.stripped(l) {
                        return Err(BuildError::StrippedRegion(l));
                    }
                }
            }

            Op::RegToNhdr { .. } => {
                if self.replace.is_none() {
                    return Err(BuildError::TemplateBeforeReplace);
                }
            }

            Op::Nop | Op::SiToReg { .. } | Op::Alu(_) | Op::Sync { .. } => {}
        }
        Ok(())
    }

    fn record(&mut self, op: &Op) {
        match op {
            Op::Replace(rep) => self.replace = Some(*rep),
            Op::RegToPkt { dst, .. } => self.stored |= layer_bit(dst.layer),
            Op::NatCopy { layer, ports } => {
                self.stored |= layer_bit(*layer);
                if let (true, Some(l4)) = (*ports, layer.l4()) {
                    self.stored |= layer_bit(l4);
                }
            }
            _ => {}
        }
    }

    fn emit(&mut self, insn: Insn) -> Result<(), BuildError> {
        if self.complete {
            return Err(BuildError::AfterComplete);
        }
        self.check_region(&insn.op)?;
        let word = insn.encode()?;
        self.sync.step(&insn)?;
        self.prog.push(word)?;
        self.record(&insn.op);
        Ok(())
    }

    /// Terminate the program and hand it over.
    pub fn finish(mut self) -> Result<Program, BuildError> {
        self.emit(Insn::COMPLETE)?;
        self.complete = true;
        Ok(self.prog)
    }
}

/// Emits instructions on one lane of a [`RecipeBuilder`].
pub struct LaneCursor<'a> {
    b: &'a mut RecipeBuilder,
    lane: Lane,
}

impl LaneCursor<'_> {
    pub fn lane(&self) -> Lane {
        self.lane
    }

    fn emit(&mut self, op: Op) -> Result<(), BuildError> {
        self.b.emit(Insn::new(self.lane, op))
    }

    pub fn alloc(
        &mut self,
        sym: &'static str,
        width: Width,
    ) -> Result<RegField, BuildError> {
        self.b.alloc(sym, width)
    }

    pub fn alloc_cmp(
        &mut self,
        sym: &'static str,
        width: Width,
    ) -> Result<RegField, BuildError> {
        self.b.alloc_cmp(sym, width)
    }

    pub fn free(&mut self, field: RegField) {
        self.b.free(field);
    }

    pub fn fetch_si(
        &mut self,
        src: SiField,
        dst: RegField,
    ) -> Result<(), BuildError> {
        self.emit(Op::SiToReg { src, dst })
    }

    pub fn fetch_pkt(
        &mut self,
        src: PktField,
        dst: RegField,
    ) -> Result<(), BuildError> {
        self.emit(Op::PktToReg { src, dst })
    }

    pub fn sync(&mut self, field: RegField) -> Result<(), BuildError> {
        self.emit(Op::Sync { field })
    }

    /// Allocate `sym`, fetch a sideband field into it, and sync this
    /// lane on it.
    pub fn load_si(
        &mut self,
        sym: &'static str,
        src: SiField,
    ) -> Result<RegField, BuildError> {
        let dst = self.alloc(sym, src.width)?;
        self.fetch_si(src, dst)?;
        self.sync(dst)?;
        Ok(dst)
    }

    /// Allocate `sym`, fetch a packet field into it, and sync this lane
    /// on it.
    pub fn load_pkt(
        &mut self,
        sym: &'static str,
        src: PktField,
    ) -> Result<RegField, BuildError> {
        let dst = self.alloc(sym, src.width)?;
        self.fetch_pkt(src, dst)?;
        self.sync(dst)?;
        Ok(dst)
    }

    /// As [`Self::load_pkt`], into a compare register.
    pub fn load_pkt_cmp(
        &mut self,
        sym: &'static str,
        src: PktField,
    ) -> Result<RegField, BuildError> {
        let dst = self.alloc_cmp(sym, src.width)?;
        self.fetch_pkt(src, dst)?;
        self.sync(dst)?;
        Ok(dst)
    }

    pub fn alu(&mut self, alu: Alu) -> Result<(), BuildError> {
        self.emit(Op::Alu(alu))
    }

    pub fn mov(
        &mut self,
        dst: RegField,
        src: impl Into<Operand>,
    ) -> Result<(), BuildError> {
        self.alu(Alu::mov(dst, src))
    }

    pub fn add(
        &mut self,
        dst: RegField,
        a: RegField,
        b: impl Into<Operand>,
    ) -> Result<(), BuildError> {
        self.alu(Alu::new(AluOp::Add, dst, a, b))
    }

    pub fn sub(
        &mut self,
        dst: RegField,
        a: RegField,
        b: impl Into<Operand>,
    ) -> Result<(), BuildError> {
        self.alu(Alu::new(AluOp::Sub, dst, a, b))
    }

    pub fn and(
        &mut self,
        dst: RegField,
        a: RegField,
        b: impl Into<Operand>,
    ) -> Result<(), BuildError> {
        self.alu(Alu::new(AluOp::And, dst, a, b))
    }

    pub fn shl(
        &mut self,
        dst: RegField,
        a: RegField,
        b: impl Into<Operand>,
    ) -> Result<(), BuildError> {
        self.alu(Alu::new(AluOp::Shl, dst, a, b))
    }

    pub fn csum_add(
        &mut self,
        dst: RegField,
        a: RegField,
        b: impl Into<Operand>,
    ) -> Result<(), BuildError> {
        self.alu(Alu::new(AluOp::CsumAdd, dst, a, b))
    }

    pub fn csum_sub(
        &mut self,
        dst: RegField,
        a: RegField,
        b: impl Into<Operand>,
    ) -> Result<(), BuildError> {
        self.alu(Alu::new(AluOp::CsumSub, dst, a, b))
    }

    pub fn rand16(&mut self, dst: RegField) -> Result<(), BuildError> {
        self.alu(Alu::rand16(dst))
    }

    pub fn store_pkt(
        &mut self,
        src: RegField,
        dst: PktField,
    ) -> Result<(), BuildError> {
        self.emit(Op::RegToPkt { src, dst })
    }

    pub fn store_nhdr(
        &mut self,
        src: RegField,
        dst: NhdrField,
    ) -> Result<(), BuildError> {
        self.emit(Op::RegToNhdr { src, dst })
    }
}
