// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Tunnels over UDP: L2TP, VXLAN and bare UDP encapsulation.
//!
//! The checksummed encapsulations compute the outer UDP checksum
//! without touching the payload, by assuming the inner packet is IPv4
//! with valid checksums of its own. Their catalog entries carry the
//! `IPV4` flag for this reason.

use super::IpFamily;
use super::Nat;
use super::ip_len;
use super::lco_udp_csum;
use super::nhdr_ip;
use super::patch_ip;
use crate::engine::builder::BuildError;
use crate::engine::builder::RecipeBuilder;
use crate::engine::lane::Lane;
use crate::engine::layout::Layer;
use crate::engine::layout::NhdrLayer;
use crate::engine::layout::StripOffset;
use crate::engine::layout::VXLAN_HDR_LEN;
use crate::engine::layout::desc;
use crate::engine::layout::l2tp;
use crate::engine::layout::udp;
use crate::engine::primitives::LenChain;
use crate::engine::program::Program;
use crate::engine::regs::Width;

pub(super) fn l2tp_encap(
    inner: IpFamily,
    outer: IpFamily,
) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL3, 0)?;
    patch_ip(&mut b, inner, Layer::L3, Nat::None)?;

    let mut lb = b.lane(Lane::B);
    let len = ip_len(&mut lb, inner, Layer::L3)?;
    let l2tp_len = lb.alloc("l2tp_len", Width::W16)?;
    let udp_len = lb.alloc("udp_len", Width::W16)?;

    let mut chain = LenChain::start(len);
    chain.add(&mut lb, l2tp_len, l2tp::HDR_LEN)?;
    lb.store_nhdr(l2tp_len, l2tp::LEN.nhdr(NhdrLayer::Shim))?;
    chain.add(&mut lb, udp_len, udp::HDR_LEN)?;
    lb.store_nhdr(udp_len, udp::LEN.nhdr(NhdrLayer::L4))?;
    nhdr_ip(&mut lb, outer, udp_len)?;

    lb.free(udp_len);
    lb.free(l2tp_len);
    lb.free(len);
    b.finish()
}

pub(super) fn l2tp_decap(inner: IpFamily) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL4, (udp::HDR_LEN + l2tp::HDR_LEN) as u8)?;
    patch_ip(&mut b, inner, Layer::InnerL3, Nat::None)?;
    b.finish()
}

/// Carry the whole L2 frame in VXLAN. With `csum` set the outer
/// checksum is computed, which needs an IPv4 packet in the frame;
/// otherwise the template's zero stands.
pub(super) fn vxlan_encap(
    outer: IpFamily,
    csum: bool,
) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::None, 0)?;

    let mut lb = b.lane(Lane::B);
    let frame = lb.load_pkt("frame_len", desc::FRAME_LEN.at(Layer::Desc))?;
    let udp_len = lb.alloc("udp_len", Width::W16)?;
    LenChain::start(frame).add(
        &mut lb,
        udp_len,
        udp::HDR_LEN + VXLAN_HDR_LEN,
    )?;
    lb.free(frame);
    lb.store_nhdr(udp_len, udp::LEN.nhdr(NhdrLayer::L4))?;
    if csum {
        lco_udp_csum(&mut lb, udp_len, None)?;
    }
    nhdr_ip(&mut lb, outer, udp_len)?;
    lb.free(udp_len);

    b.finish()
}

pub(super) fn vxlan_decap() -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL4, (udp::HDR_LEN + VXLAN_HDR_LEN) as u8)?;
    b.finish()
}

/// Carry the L3 packet in a bare UDP datagram. Without `csum` the
/// packet may be of either family; with it, it must be IPv4.
pub(super) fn udp_encap(
    outer: IpFamily,
    csum: bool,
) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL3, 0)?;

    let mut lb = b.lane(Lane::B);
    let len = lb.load_pkt("l3_len", desc::L3_LEN.at(Layer::Desc))?;
    let udp_len = lb.alloc("udp_len", Width::W16)?;
    LenChain::start(len).add(&mut lb, udp_len, udp::HDR_LEN)?;
    lb.free(len);
    lb.store_nhdr(udp_len, udp::LEN.nhdr(NhdrLayer::L4))?;
    if csum {
        lco_udp_csum(&mut lb, udp_len, None)?;
    }
    nhdr_ip(&mut lb, outer, udp_len)?;
    lb.free(udp_len);

    b.finish()
}

pub(super) fn udp_decap(inner: IpFamily) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL4, udp::HDR_LEN as u8)?;
    patch_ip(&mut b, inner, Layer::InnerL3, Nat::None)?;
    b.finish()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::isa::AluOp;
    use crate::engine::isa::CmpOp;
    use crate::engine::isa::Op;

    fn ops(prog: &Program) -> Vec<Op> {
        prog.insns().map(|i| i.unwrap().op).collect()
    }

    fn writes_udp_csum(ops: &[Op]) -> bool {
        let field = udp::CSUM.nhdr(NhdrLayer::L4);
        ops.iter().any(|op| matches!(
            op,
            Op::RegToNhdr { dst, .. } if *dst == field
        ))
    }

    #[test]
    fn checksum_only_when_asked() {
        for csum in [false, true] {
            let vxlan = vxlan_encap(IpFamily::V4, csum).unwrap();
            assert_eq!(writes_udp_csum(&ops(&vxlan)), csum);
            let bare = udp_encap(IpFamily::V4, csum).unwrap();
            assert_eq!(writes_udp_csum(&ops(&bare)), csum);
        }
    }

    #[test]
    fn zero_checksum_is_fixed_up() {
        let prog = ops(&udp_encap(IpFamily::V4, true).unwrap());
        assert!(prog.iter().any(|op| matches!(
            op,
            Op::Alu(alu) if alu.op == AluOp::Mov
                && alu.cond.is_some_and(|c| c.cmp == CmpOp::Eq && c.imm == 0)
        )));
    }

    #[test]
    fn l2tp_writes_both_lengths() {
        let prog = ops(&l2tp_encap(IpFamily::V6, IpFamily::V4).unwrap());
        for field in [
            l2tp::LEN.nhdr(NhdrLayer::Shim),
            udp::LEN.nhdr(NhdrLayer::L4),
        ] {
            assert!(prog.iter().any(|op| matches!(
                op,
                Op::RegToNhdr { dst, .. } if *dst == field
            )));
        }
    }
}
