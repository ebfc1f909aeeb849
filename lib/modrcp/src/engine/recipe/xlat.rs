// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Stateless IPv4/IPv6 translation. The template carries the
//! translated addresses, and the sideband L4 delta moves the L4
//! checksum from one pseudo header to the other.

use super::nhdr_ipv4_close;
use super::nhdr_ipv4_open;
use super::update_l4_csum;
use crate::engine::builder::BuildError;
use crate::engine::builder::RecipeBuilder;
use crate::engine::lane::Lane;
use crate::engine::layout::Layer;
use crate::engine::layout::NhdrLayer;
use crate::engine::layout::SiField;
use crate::engine::layout::StripOffset;
use crate::engine::layout::ipv4;
use crate::engine::layout::ipv6;
use crate::engine::primitives::LenChain;
use crate::engine::primitives::fold_sub;
use crate::engine::program::Program;
use crate::engine::regs::Width;

pub(super) fn v4_to_v6() -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();

    let mut a = b.lane(Lane::A);
    let total = a.load_pkt("ip_len", ipv4::TOTAL_LEN.at(Layer::L3))?;
    let ttl = a.load_pkt("ttl", ipv4::TTL.at(Layer::L3))?;

    b.replace_hdr(StripOffset::UpToL4, 0)?;

    let mut a = b.lane(Lane::A);
    let plen = a.alloc("payload_len", Width::W16)?;
    LenChain::start(total).sub(&mut a, plen, ipv4::HDR_LEN)?;
    a.store_nhdr(plen, ipv6::PAYLOAD_LEN.nhdr(NhdrLayer::L3))?;
    a.free(plen);
    a.free(total);

    let delta = a.load_si("ttl_delta", SiField::TTL_DELTA)?;
    a.sub(ttl, ttl, delta)?;
    a.store_nhdr(ttl, ipv6::HOP_LIMIT.nhdr(NhdrLayer::L3))?;
    a.free(delta);
    a.free(ttl);

    update_l4_csum(&mut b.lane(Lane::B), Layer::L4Csum)?;
    b.finish()
}

pub(super) fn v6_to_v4() -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();

    let mut a = b.lane(Lane::A);
    let plen = a.load_pkt("payload_len", ipv6::PAYLOAD_LEN.at(Layer::L3))?;
    let hop = a.load_pkt("hop_limit", ipv6::HOP_LIMIT.at(Layer::L3))?;

    b.replace_hdr(StripOffset::UpToL4, 0)?;

    let mut a = b.lane(Lane::A);
    let delta = a.load_si("hopl_delta", SiField::HOPL_DELTA)?;
    a.sub(hop, hop, delta)?;
    a.free(delta);

    let csum = nhdr_ipv4_open(&mut a, plen)?;
    a.free(plen);

    // The TTL is the high byte of its checksum word.
    let word = a.alloc("ttl_word", Width::W16)?;
    a.shl(word, hop, 8u16)?;
    fold_sub(&mut a, csum, word)?;
    a.free(word);
    a.store_nhdr(hop, ipv4::TTL.nhdr(NhdrLayer::L3))?;
    a.free(hop);
    nhdr_ipv4_close(&mut a, csum)?;

    update_l4_csum(&mut b.lane(Lane::B), Layer::L4Csum)?;
    b.finish()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::isa::Op;

    #[test]
    fn hop_count_crosses_families() {
        let v6 = v4_to_v6().unwrap();
        let hop = ipv6::HOP_LIMIT.nhdr(NhdrLayer::L3);
        assert!(v6.insns().any(|i| matches!(
            i.unwrap().op,
            Op::RegToNhdr { dst, .. } if dst == hop
        )));

        let v4 = v6_to_v4().unwrap();
        let ttl = ipv4::TTL.nhdr(NhdrLayer::L3);
        assert!(v4.insns().any(|i| matches!(
            i.unwrap().op,
            Op::RegToNhdr { dst, .. } if dst == ttl
        )));
    }

    #[test]
    fn l4_checksum_patched_in_place() {
        for prog in [v4_to_v6().unwrap(), v6_to_v4().unwrap()] {
            assert!(prog.insns().any(|i| matches!(
                i.unwrap().op,
                Op::RegToPkt { dst, .. } if dst.layer == Layer::L4Csum
            )));
        }
    }
}
