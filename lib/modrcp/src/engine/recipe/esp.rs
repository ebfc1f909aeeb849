// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! ESP encapsulation. The recipes only lay out the headers; the
//! payload is encrypted downstream, into the room left for it.

use super::IpFamily;
use super::nhdr_ip;
use super::nhdr_ipv4_close;
use super::nhdr_ipv4_open;
use crate::engine::builder::BuildError;
use crate::engine::builder::LaneCursor;
use crate::engine::builder::RecipeBuilder;
use crate::engine::lane::Lane;
use crate::engine::layout::ESP_TRAILER_LEN;
use crate::engine::layout::IPPROTO_ESP;
use crate::engine::layout::Layer;
use crate::engine::layout::NhdrLayer;
use crate::engine::layout::SiField;
use crate::engine::layout::StripOffset;
use crate::engine::layout::desc;
use crate::engine::layout::ipv4;
use crate::engine::layout::ipv6;
use crate::engine::primitives::fold_sub;
use crate::engine::program::Program;
use crate::engine::regs::RegField;
use crate::engine::regs::Width;

/// Compute the length of the ESP packet protecting `payload` bytes:
/// the payload padded so that it and the trailer fill whole cipher
/// blocks, plus the fixed overhead.
fn esp_len(
    c: &mut LaneCursor,
    payload: RegField,
) -> Result<RegField, BuildError> {
    let mask = c.load_si("esp_pad_mask", SiField::ESP_PAD_MASK)?;
    let esp = c.alloc("esp_len", Width::W16)?;
    let pad = c.alloc("esp_pad", Width::W16)?;

    // pad = -(payload + trailer) mod block
    c.add(esp, payload, ESP_TRAILER_LEN)?;
    c.mov(pad, 0u16)?;
    c.sub(pad, pad, esp)?;
    c.and(pad, pad, mask)?;
    c.free(mask);

    let overhead = c.load_si("esp_overhead", SiField::ESP_OVERHEAD)?;
    c.add(esp, payload, pad)?;
    c.add(esp, esp, overhead)?;
    c.free(overhead);
    c.free(pad);
    Ok(esp)
}

/// Tunnel mode: the whole L3 packet becomes the ESP payload, behind a
/// new `outer` header.
pub(super) fn tunnel(outer: IpFamily) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL3, 0)?;

    let mut a = b.lane(Lane::A);
    let len = a.load_pkt("l3_len", desc::L3_LEN.at(Layer::Desc))?;
    let esp = esp_len(&mut a, len)?;
    a.free(len);

    let mut lb = b.lane(Lane::B);
    lb.sync(esp)?;
    nhdr_ip(&mut lb, outer, esp)?;
    lb.free(esp);

    b.finish()
}

/// Transport mode: the L4 segment becomes the ESP payload, and the IP
/// header is rebuilt from the template with its hop count carried
/// over. IPv6 extension headers go with the old header.
pub(super) fn transport(family: IpFamily) -> Result<Program, BuildError> {
    match family {
        IpFamily::V4 => transport_v4(),
        IpFamily::V6 => transport_v6(),
    }
}

fn transport_v4() -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();

    let ttl = b.lane(Lane::A).load_pkt("ttl", ipv4::TTL.at(Layer::L3))?;

    b.replace_hdr(StripOffset::UpToL4, 0)?;

    let mut a = b.lane(Lane::A);
    let delta = a.load_si("ttl_delta", SiField::TTL_DELTA)?;
    a.sub(ttl, ttl, delta)?;
    a.free(delta);

    let l4_len = a.load_pkt("l4_len", desc::L4_LEN.at(Layer::Desc))?;
    let esp = esp_len(&mut a, l4_len)?;
    a.free(l4_len);

    let mut lb = b.lane(Lane::B);
    lb.sync(esp)?;
    lb.sync(ttl)?;
    let csum = nhdr_ipv4_open(&mut lb, esp)?;

    let word = lb.alloc("ttl_proto", Width::W16)?;
    lb.mov(word.byte(0), ttl)?;
    lb.mov(word.byte(1), u16::from(IPPROTO_ESP))?;
    fold_sub(&mut lb, csum, word)?;
    lb.store_nhdr(word, ipv4::TTL_PROTO.nhdr(NhdrLayer::L3))?;
    nhdr_ipv4_close(&mut lb, csum)?;

    lb.free(word);
    lb.free(ttl);
    lb.free(esp);
    b.finish()
}

fn transport_v6() -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();

    let hop =
        b.lane(Lane::A).load_pkt("hop_limit", ipv6::HOP_LIMIT.at(Layer::L3))?;

    b.replace_hdr(StripOffset::UpToL4, 0)?;

    let mut a = b.lane(Lane::A);
    let delta = a.load_si("hopl_delta", SiField::HOPL_DELTA)?;
    a.sub(hop, hop, delta)?;
    a.free(delta);
    let l4_len = a.load_pkt("l4_len", desc::L4_LEN.at(Layer::Desc))?;
    let esp = esp_len(&mut a, l4_len)?;
    a.free(l4_len);

    let mut lb = b.lane(Lane::B);
    lb.sync(esp)?;
    lb.sync(hop)?;
    lb.store_nhdr(esp, ipv6::PAYLOAD_LEN.nhdr(NhdrLayer::L3))?;

    let word = lb.alloc("next_hop", Width::W16)?;
    lb.mov(word.byte(0), u16::from(IPPROTO_ESP))?;
    lb.mov(word.byte(1), hop)?;
    lb.store_nhdr(word, ipv6::NEXT_HOP.nhdr(NhdrLayer::L3))?;

    lb.free(word);
    lb.free(hop);
    lb.free(esp);
    b.finish()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::isa::Op;
    use crate::engine::isa::Operand;

    #[test]
    fn transport_sets_esp_protocol() {
        for family in [IpFamily::V4, IpFamily::V6] {
            let prog = transport(family).unwrap();
            let found = prog.insns().any(|i| matches!(
                i.unwrap().op,
                Op::Alu(alu) if alu.dst.width == Width::W8
                    && alu.b == Operand::Imm(u16::from(IPPROTO_ESP))
            ));
            assert!(found, "{family:?}");
        }
    }

    #[test]
    fn transport_reads_header_before_replace() {
        let prog = transport(IpFamily::V4).unwrap();
        let ops: Vec<Op> = prog.insns().map(|i| i.unwrap().op).collect();
        let replace =
            ops.iter().position(|op| matches!(op, Op::Replace(_))).unwrap();
        for (i, op) in ops.iter().enumerate() {
            if let Op::PktToReg { src, .. } = op {
                if src.layer == Layer::L3 {
                    assert!(i < replace);
                }
            }
        }
    }
}
