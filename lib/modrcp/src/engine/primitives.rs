// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Checksum and length building blocks shared by the recipes.
//!
//! Each function here emits a short, fixed instruction sequence on
//! one lane. The [`host`] module holds the same computations on plain
//! integers, which is what tests and the sideband setup predict recipe
//! results with.

use super::builder::BuildError;
use super::builder::LaneCursor;
use super::isa::Alu;
use super::isa::AluOp;
use super::isa::CmpOp;
use super::isa::Operand;
use super::regs::RegField;

/// Fold `delta` into the stored checksum `csum`: `csum += delta`.
pub fn fold_add(
    c: &mut LaneCursor,
    csum: RegField,
    delta: impl Into<Operand>,
) -> Result<(), BuildError> {
    c.csum_add(csum, csum, delta)
}

/// Fold `delta` out of the stored checksum `csum`: `csum -= delta`.
pub fn fold_sub(
    c: &mut LaneCursor,
    csum: RegField,
    delta: impl Into<Operand>,
) -> Result<(), BuildError> {
    c.csum_sub(csum, csum, delta)
}

/// Fold `delta` into the stored checksum `csum` unless `csum` is zero,
/// which for UDP means the datagram carries no checksum. `csum` must be
/// a compare register.
pub fn fold_add_nonzero(
    c: &mut LaneCursor,
    csum: RegField,
    delta: impl Into<Operand>,
) -> Result<(), BuildError> {
    c.alu(
        Alu::new(AluOp::CsumAdd, csum, csum, delta).when(CmpOp::Ne, csum, 0),
    )
}

/// `dst = if cmp_reg <cmp> imm { on_true } else { on_false }`.
///
/// Emitted as an unconditional move followed by a conditional one, or
/// the conditional one alone when `on_false` is `dst` itself.
/// `cmp_reg` must be a compare register.
pub fn cond_select(
    c: &mut LaneCursor,
    dst: RegField,
    cmp: CmpOp,
    cmp_reg: RegField,
    imm: u8,
    on_true: impl Into<Operand>,
    on_false: impl Into<Operand>,
) -> Result<(), BuildError> {
    let on_false = on_false.into();
    if on_false != Operand::Reg(dst) {
        c.mov(dst, on_false)?;
    }
    c.alu(Alu::mov(dst, on_true).when(cmp, cmp_reg, imm))
}

/// Generate a new IPv4 identification into `ident` and fold it into
/// the header checksum `csum`.
///
/// The fold directly follows the generation; nothing may be emitted
/// between them.
pub fn rand_ip_id(
    c: &mut LaneCursor,
    ident: RegField,
    csum: RegField,
) -> Result<(), BuildError> {
    c.rand16(ident)?;
    fold_sub(c, csum, ident)
}

/// A computed UDP checksum of zero is sent as `0xFFFF`, zero meaning
/// "no checksum". `csum` must be a compare register.
pub fn udp_zero_fixup(
    c: &mut LaneCursor,
    csum: RegField,
) -> Result<(), BuildError> {
    cond_select(c, csum, CmpOp::Eq, csum, 0, 0xFFFFu16, csum)
}

/// A chain of lengths derived from one another, innermost first.
///
/// Each step writes a fresh register, so every intermediate length
/// remains available to be stored or folded into a checksum.
#[derive(Clone, Copy, Debug)]
pub struct LenChain {
    cur: RegField,
}

impl LenChain {
    pub fn start(inner: RegField) -> Self {
        Self { cur: inner }
    }

    pub fn current(&self) -> RegField {
        self.cur
    }

    /// `dst = current + n`, which becomes the current length.
    pub fn add(
        &mut self,
        c: &mut LaneCursor,
        dst: RegField,
        n: impl Into<Operand>,
    ) -> Result<RegField, BuildError> {
        c.add(dst, self.cur, n)?;
        self.cur = dst;
        Ok(dst)
    }

    /// `dst = current - n`, which becomes the current length.
    pub fn sub(
        &mut self,
        c: &mut LaneCursor,
        dst: RegField,
        n: impl Into<Operand>,
    ) -> Result<RegField, BuildError> {
        c.sub(dst, self.cur, n)?;
        self.cur = dst;
        Ok(dst)
    }

    /// As [`Self::add`], also folding the new length into the stored
    /// checksum `csum` of the header carrying it.
    pub fn add_folded(
        &mut self,
        c: &mut LaneCursor,
        dst: RegField,
        n: impl Into<Operand>,
        csum: RegField,
    ) -> Result<RegField, BuildError> {
        let len = self.add(c, dst, n)?;
        fold_sub(c, csum, len)?;
        Ok(len)
    }
}

pub mod host {
    //! Host-side equivalents of the emitted primitives.

    use crate::engine::isa::CmpOp;
    use heapless::Vec as HVec;

    pub use crate::engine::checksum::csum16_add;
    pub use crate::engine::checksum::csum16_sub;

    /// The most steps a length chain may have.
    pub const LEN_CHAIN_MAX: usize = 8;

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum LenStep {
        Add(u16),
        Sub(u16),
    }

    pub fn cmp_eval(cmp: CmpOp, lhs: u32, rhs: u8) -> bool {
        cmp.eval(lhs, u32::from(rhs))
    }

    pub fn cond_select(
        cmp: CmpOp,
        lhs: u32,
        rhs: u8,
        on_true: u32,
        on_false: u32,
    ) -> u32 {
        if cmp_eval(cmp, lhs, rhs) { on_true } else { on_false }
    }

    /// Every length of the chain, the innermost one first. Steps past
    /// [`LEN_CHAIN_MAX`] are ignored.
    pub fn length_chain(
        inner: u16,
        steps: &[LenStep],
    ) -> HVec<u16, { LEN_CHAIN_MAX + 1 }> {
        let mut lens = HVec::new();
        let mut cur = inner;
        let _ = lens.push(cur);
        for step in steps.iter().take(LEN_CHAIN_MAX) {
            cur = match step {
                LenStep::Add(n) => cur.wrapping_add(*n),
                LenStep::Sub(n) => cur.wrapping_sub(*n),
            };
            let _ = lens.push(cur);
        }
        lens
    }

    /// A UDP checksum as it goes on the wire.
    pub fn udp_wire_csum(csum: u16) -> u16 {
        cond_select(CmpOp::Eq, u32::from(csum), 0, 0xFFFF, u32::from(csum))
            as u16
    }

    /// The stored checksum `csum` with `delta` folded in, or left at
    /// zero if it was zero.
    pub fn fold_add_nonzero(csum: u16, delta: u16) -> u16 {
        let folded = csum16_add(csum, delta);
        cond_select(
            CmpOp::Ne,
            u32::from(csum),
            0,
            u32::from(folded),
            u32::from(csum),
        ) as u16
    }
}

#[cfg(test)]
mod test {
    use super::host;
    use super::host::LenStep;
    use super::*;
    use crate::engine::builder::RecipeBuilder;
    use crate::engine::isa::Op;
    use crate::engine::lane::Lane;
    use crate::engine::layout::Layer;
    use crate::engine::layout::SiField;
    use crate::engine::layout::ipv4;
    use crate::engine::regs::Width;

    #[test]
    fn host_length_chain() {
        let lens = host::length_chain(
            100,
            &[LenStep::Add(8), LenStep::Add(20), LenStep::Sub(2)],
        );
        assert_eq!(&lens[..], &[100, 108, 128, 126]);
    }

    #[test]
    fn host_cond_select() {
        assert_eq!(host::cond_select(CmpOp::Ne, 0, 0, 1, 2), 2);
        assert_eq!(host::cond_select(CmpOp::Ne, 5, 0, 1, 2), 1);
        assert_eq!(host::udp_wire_csum(0), 0xFFFF);
        assert_eq!(host::udp_wire_csum(0x1234), 0x1234);
    }

    #[test]
    fn host_fold_add_nonzero() {
        assert_eq!(host::fold_add_nonzero(0, 0x1234), 0);
        assert_eq!(host::fold_add_nonzero(0x1000, 0x0234), 0x1234);
        assert_eq!(host::fold_add_nonzero(0xFFFF, 0x0001), 0x0001);
    }

    #[test]
    fn nonzero_fold_is_one_conditional_add() {
        let mut b = RecipeBuilder::new();
        let mut a = b.lane(Lane::A);
        let csum = a.load_pkt_cmp("csum", ipv4::CSUM.at(Layer::L3)).unwrap();
        let delta = a.load_si("delta", SiField::L4_CSUM_DELTA).unwrap();
        fold_add_nonzero(&mut a, csum, delta).unwrap();
        let gp = a.load_si("gp", SiField::L3_CSUM_DELTA).unwrap();
        assert!(fold_add_nonzero(&mut a, gp, delta).is_err());

        let prog = b.finish().unwrap();
        let alus: Vec<Alu> = prog
            .insns()
            .filter_map(|i| match i.unwrap().op {
                Op::Alu(alu) => Some(alu),
                _ => None,
            })
            .collect();
        assert_eq!(alus.len(), 1);
        assert_eq!(alus[0].op, AluOp::CsumAdd);
        assert_eq!(alus[0].b, Operand::Reg(delta));
        let cond = alus[0].cond.unwrap();
        assert_eq!((cond.cmp, cond.reg, cond.imm), (CmpOp::Ne, csum, 0));
    }

    #[test]
    fn cond_select_skips_move_onto_itself() {
        let mut b = RecipeBuilder::new();
        let mut a = b.lane(Lane::A);
        let cmp = a.load_pkt_cmp("cmp", ipv4::TTL.at(Layer::L3)).unwrap();
        let dst = a.alloc("dst", Width::W16).unwrap();
        cond_select(&mut a, dst, CmpOp::Lt, cmp, 2, 1u16, 7u16).unwrap();
        cond_select(&mut a, dst, CmpOp::Eq, cmp, 0, 3u16, dst).unwrap();
        let prog = b.finish().unwrap();
        let movs: Vec<Alu> = prog
            .insns()
            .filter_map(|i| match i.unwrap().op {
                Op::Alu(alu) if alu.op == AluOp::Mov => Some(alu),
                _ => None,
            })
            .collect();
        assert_eq!(movs.len(), 3);
        assert_eq!((movs[0].b, movs[0].cond), (Operand::Imm(7), None));
        assert!(movs[1].cond.is_some_and(|c| c.cmp == CmpOp::Lt));
        assert!(movs[2].cond.is_some_and(|c| c.cmp == CmpOp::Eq));
    }

    #[test]
    fn rand_id_is_adjacent_to_fold() {
        let mut b = RecipeBuilder::new();
        let mut a = b.lane(Lane::A);
        let csum = a.load_si("csum", SiField::NHDR_L3_CSUM).unwrap();
        let id = a.alloc("id", Width::W16).unwrap();
        rand_ip_id(&mut a, id, csum).unwrap();
        let prog = b.finish().unwrap();
        let insns: Vec<_> = prog.insns().map(|i| i.unwrap()).collect();
        let pos = insns
            .iter()
            .position(|i| {
                matches!(i.op, Op::Alu(alu) if alu.op == AluOp::Rand16)
            })
            .unwrap();
        match insns[pos + 1].op {
            Op::Alu(alu) => {
                assert_eq!(alu.op, AluOp::CsumSub);
                assert_eq!(alu.b, Operand::Reg(id));
            }
            _ => panic!("fold does not follow rand16"),
        }
    }

    #[test]
    fn len_chain_steps_into_fresh_registers() {
        let mut b = RecipeBuilder::new();
        let mut a = b.lane(Lane::A);
        let inner = a.load_pkt("inner", ipv4::TOTAL_LEN.at(Layer::L3)).unwrap();
        let csum = a.load_si("csum", SiField::NHDR_L3_CSUM).unwrap();
        let udp_len = a.alloc("udp_len", Width::W16).unwrap();
        let ip_len = a.alloc("ip_len", Width::W16).unwrap();
        let mut chain = LenChain::start(inner);
        chain.add(&mut a, udp_len, 8u16).unwrap();
        chain.add_folded(&mut a, ip_len, 20u16, csum).unwrap();
        assert_eq!(chain.current(), ip_len);
        assert!(b.finish().is_ok());
    }

    #[test]
    fn zero_fixup_requires_compare_register() {
        let mut b = RecipeBuilder::new();
        let mut a = b.lane(Lane::A);
        let gp = a.load_si("gp", SiField::NHDR_L4_CSUM).unwrap();
        assert!(udp_zero_fixup(&mut a, gp).is_err());
        let cmp = a.alloc_cmp("cmp", Width::W16).unwrap();
        a.mov(cmp, gp).unwrap();
        udp_zero_fixup(&mut a, cmp).unwrap();
    }
}
