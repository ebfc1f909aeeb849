// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The recipe builders.
//!
//! Every recipe is a single function emitting one straight-line
//! program. Where a recipe both patches the packet's existing headers
//! and fills in a new header template, lane A does the former and lane
//! B the latter, so the two lanes only meet where one needs a value
//! the other computed.
//!
//! Values that depend on the flow rather than the packet (TTL deltas,
//! NAT addresses, template checksums) come from the sideband, and a
//! recipe always applies them. A flow which needs no TTL decrement
//! simply has a zero delta in its sideband.

use super::builder::BuildError;
use super::builder::LaneCursor;
use super::builder::RecipeBuilder;
use super::lane::Lane;
use super::layout::L4_CSUM;
use super::layout::Layer;
use super::layout::NhdrLayer;
use super::layout::SiField;
use super::layout::ipv4;
use super::layout::ipv6;
use super::layout::udp;
use super::primitives::LenChain;
use super::primitives::fold_add;
use super::primitives::fold_add_nonzero;
use super::primitives::fold_sub;
use super::primitives::rand_ip_id;
use super::primitives::udp_zero_fixup;
use super::program::Program;
use super::regs::RegField;
use super::regs::Width;
use modrcp_api::RecipeId;

mod basic;
mod esp;
mod gre;
mod hdr_rplc;
mod ip_tunnel;
mod udp_tunnel;
mod xlat;

/// Build the program of recipe `id`.
pub fn build(id: RecipeId) -> Result<Program, BuildError> {
    use IpFamily::*;
    use RecipeId::*;

    match id {
        NoMod => basic::no_mod(),
        HdrRplc => basic::l2_hdr_rplc(),
        Ipv4Routed => basic::ipv4_routed(Nat::None, false),
        Ipv4Nat => basic::ipv4_routed(Nat::Addrs, false),
        Ipv4Napt => basic::ipv4_routed(Nat::AddrsPorts, false),
        Ipv6Routed => basic::ipv6_routed(false),
        Ipv4RoutedPppoe => basic::ipv4_routed(Nat::None, true),
        Ipv4NatPppoe => basic::ipv4_routed(Nat::Addrs, true),
        Ipv4NaptPppoe => basic::ipv4_routed(Nat::AddrsPorts, true),
        Ipv6RoutedPppoe => basic::ipv6_routed(true),

        Ipv4HdrRplc => hdr_rplc::l3(V4),
        Ipv6HdrRplc => hdr_rplc::l3(V6),
        Ipv4UdpHdrRplc => hdr_rplc::l4_udp(V4),
        Ipv6UdpHdrRplc => hdr_rplc::l4_udp(V6),

        Ipv4InIpv4Encp => ip_tunnel::encap(V4, V4, Nat::None),
        Ipv6InIpv6Encp => ip_tunnel::encap(V6, V6, Nat::None),
        DsliteRoutedEncp => ip_tunnel::encap(V4, V6, Nat::None),
        DsliteNatEncp => ip_tunnel::encap(V4, V6, Nat::Addrs),
        DsliteEncp => ip_tunnel::encap(V4, V6, Nat::AddrsPorts),
        SixrdEncp => ip_tunnel::encap(V6, V4, Nat::None),
        DsliteNatDecp => ip_tunnel::decap(V4, Nat::Addrs),
        DsliteDecp => ip_tunnel::decap(V4, Nat::AddrsPorts),
        Ipv6TunnDecp => ip_tunnel::decap(V6, Nat::None),
        Ipv4TunnDecp => ip_tunnel::decap(V4, Nat::None),

        GreIpv4OverIpv4Encp => gre::encap(Some(V4), V4),
        GreIpv6OverIpv4Encp => gre::encap(Some(V6), V4),
        GreIpv4OverIpv6Encp => gre::encap(Some(V4), V6),
        GreIpv6OverIpv6Encp => gre::encap(Some(V6), V6),
        EogreIpv4Encp => gre::encap(None, V4),
        EogreIpv6Encp => gre::encap(None, V6),
        GreIpv4Decp => gre::decap(Some(V4)),
        GreIpv6Decp => gre::decap(Some(V6)),
        EogreDecp => gre::decap(None),

        L2tpIpv4OverIpv4Encp => udp_tunnel::l2tp_encap(V4, V4),
        L2tpIpv6OverIpv4Encp => udp_tunnel::l2tp_encap(V6, V4),
        L2tpIpv4OverIpv6Encp => udp_tunnel::l2tp_encap(V4, V6),
        L2tpIpv6OverIpv6Encp => udp_tunnel::l2tp_encap(V6, V6),
        L2tpIpv4Decp => udp_tunnel::l2tp_decap(V4),
        L2tpIpv6Decp => udp_tunnel::l2tp_decap(V6),
        VxlanIpv4Encp => udp_tunnel::vxlan_encap(V4, false),
        VxlanIpv4CsumEncp => udp_tunnel::vxlan_encap(V4, true),
        VxlanIpv6Encp => udp_tunnel::vxlan_encap(V6, false),
        VxlanDecp => udp_tunnel::vxlan_decap(),
        UdpIpv4Encp => udp_tunnel::udp_encap(V4, false),
        UdpIpv4CsumEncp => udp_tunnel::udp_encap(V4, true),
        UdpIpv6Encp => udp_tunnel::udp_encap(V6, false),
        UdpIpv4Decp => udp_tunnel::udp_decap(V4),
        UdpIpv6Decp => udp_tunnel::udp_decap(V6),

        EspIpv4TunnEncp => esp::tunnel(V4),
        EspIpv6TunnEncp => esp::tunnel(V6),
        EspIpv4TrnsEncp => esp::transport(V4),
        EspIpv6TrnsEncp => esp::transport(V6),

        Ipv4ToIpv6 => xlat::v4_to_v6(),
        Ipv6ToIpv4 => xlat::v6_to_v4(),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IpFamily {
    V4,
    V6,
}

/// The NAT rewrite a recipe applies to an IPv4 header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Nat {
    None,
    Addrs,
    AddrsPorts,
}

/// Decrement the TTL at `layer` by the sideband delta and fold the
/// change into the header checksum held in `csum`.
fn dec_ttl(
    c: &mut LaneCursor,
    layer: Layer,
    csum: RegField,
) -> Result<(), BuildError> {
    let ttl = c.load_pkt("ttl", ipv4::TTL.at(layer))?;
    let delta = c.load_si("ttl_delta", SiField::TTL_DELTA)?;
    c.sub(ttl, ttl, delta)?;
    c.store_pkt(ttl, ipv4::TTL.at(layer))?;

    // The TTL is the high byte of its checksum word.
    let word = c.alloc("ttl_delta_word", Width::W16)?;
    c.shl(word, delta, 8u16)?;
    fold_add(c, csum, word)?;

    c.free(word);
    c.free(delta);
    c.free(ttl);
    Ok(())
}

/// Patch the existing IPv4 header at `l3`: TTL and, per `nat`, the
/// addresses and ports along with the L4 checksum covering them.
fn patch_ipv4(
    b: &mut RecipeBuilder,
    l3: Layer,
    nat: Nat,
) -> Result<(), BuildError> {
    let mut a = b.lane(Lane::A);
    let csum = a.load_pkt("l3_csum", ipv4::CSUM.at(l3))?;
    dec_ttl(&mut a, l3, csum)?;
    if nat != Nat::None {
        let delta = a.load_si("l3_csum_delta", SiField::L3_CSUM_DELTA)?;
        fold_add(&mut a, csum, delta)?;
        a.free(delta);
    }
    a.store_pkt(csum, ipv4::CSUM.at(l3))?;
    a.free(csum);

    if nat == Nat::None {
        return Ok(());
    }

    b.nat_copy(l3, nat == Nat::AddrsPorts)?;

    let l4csum = match l3 {
        Layer::InnerL3 => Layer::InnerL4Csum,
        _ => Layer::L4Csum,
    };
    let mut lb = b.lane(Lane::B);
    update_l4_csum(&mut lb, l4csum)
}

/// Fold the sideband L4 delta into the L4 checksum at `layer`, unless
/// that checksum is zero (a UDP datagram sent without one).
fn update_l4_csum(c: &mut LaneCursor, layer: Layer) -> Result<(), BuildError> {
    let csum = c.load_pkt_cmp("l4_csum", L4_CSUM.at(layer))?;
    let delta = c.load_si("l4_csum_delta", SiField::L4_CSUM_DELTA)?;
    fold_add_nonzero(c, csum, delta)?;
    c.store_pkt(csum, L4_CSUM.at(layer))?;
    c.free(delta);
    c.free(csum);
    Ok(())
}

/// Decrement the hop limit of the IPv6 header at `layer`.
fn patch_ipv6(c: &mut LaneCursor, layer: Layer) -> Result<(), BuildError> {
    let hop = c.load_pkt("hop_limit", ipv6::HOP_LIMIT.at(layer))?;
    let delta = c.load_si("hopl_delta", SiField::HOPL_DELTA)?;
    c.sub(hop, hop, delta)?;
    c.store_pkt(hop, ipv6::HOP_LIMIT.at(layer))?;
    c.free(delta);
    c.free(hop);
    Ok(())
}

/// Patch the existing IP header of `family` at `l3`.
fn patch_ip(
    b: &mut RecipeBuilder,
    family: IpFamily,
    l3: Layer,
    nat: Nat,
) -> Result<(), BuildError> {
    match family {
        IpFamily::V4 => patch_ipv4(b, l3, nat),
        IpFamily::V6 => patch_ipv6(&mut b.lane(Lane::A), l3),
    }
}

/// Load the full length of the IP packet of `family` at `l3`, taken
/// from its own header rather than the frame so that link padding is
/// not counted.
fn ip_len(
    c: &mut LaneCursor,
    family: IpFamily,
    l3: Layer,
) -> Result<RegField, BuildError> {
    match family {
        IpFamily::V4 => c.load_pkt("ip_len", ipv4::TOTAL_LEN.at(l3)),
        IpFamily::V6 => {
            let len = c.load_pkt("ip_len", ipv6::PAYLOAD_LEN.at(l3))?;
            c.add(len, len, ipv6::HDR_LEN)?;
            Ok(len)
        }
    }
}

/// Fill in the template's IPv4 header, given the length of everything
/// following it. Returns the header checksum register, still live, for
/// recipes which have more to fold into it.
fn nhdr_ipv4_open(
    c: &mut LaneCursor,
    payload: RegField,
) -> Result<RegField, BuildError> {
    let csum = c.load_si("nhdr_l3_csum", SiField::NHDR_L3_CSUM)?;
    let total = c.alloc("nhdr_total_len", Width::W16)?;
    LenChain::start(payload).add_folded(c, total, ipv4::HDR_LEN, csum)?;
    c.store_nhdr(total, ipv4::TOTAL_LEN.nhdr(NhdrLayer::L3))?;
    c.free(total);

    let ident = c.alloc("nhdr_ident", Width::W16)?;
    rand_ip_id(c, ident, csum)?;
    c.store_nhdr(ident, ipv4::IDENT.nhdr(NhdrLayer::L3))?;
    c.free(ident);
    Ok(csum)
}

/// Store the template IPv4 checksum opened by [`nhdr_ipv4_open`].
fn nhdr_ipv4_close(
    c: &mut LaneCursor,
    csum: RegField,
) -> Result<(), BuildError> {
    c.store_nhdr(csum, ipv4::CSUM.nhdr(NhdrLayer::L3))?;
    c.free(csum);
    Ok(())
}

/// Fill in the template's IP header of `family`, given the length of
/// everything following it.
fn nhdr_ip(
    c: &mut LaneCursor,
    family: IpFamily,
    payload: RegField,
) -> Result<(), BuildError> {
    match family {
        IpFamily::V4 => {
            let csum = nhdr_ipv4_open(c, payload)?;
            nhdr_ipv4_close(c, csum)
        }
        IpFamily::V6 => {
            c.store_nhdr(payload, ipv6::PAYLOAD_LEN.nhdr(NhdrLayer::L3))
        }
    }
}

/// Compute the template's UDP checksum for a datagram of `udp_len`
/// bytes carrying the IPv4 packet at `L3`, with `shim_len` the value of
/// a length field between the two, if there is one.
///
/// The sideband holds the stored checksum over everything which does
/// not depend on the packet length, including the inner packet's own
/// addresses: since the inner IPv4 and L4 checksums are valid, the
/// inner packet sums to minus its pseudo header, which leaves only its
/// length to account for here.
///
/// This only holds for an IPv4 inner packet carrying an L4 checksum.
/// The length is read from an IPv4 header, so the catalog keys these
/// recipes on the `IPV4` flag. A UDP datagram sent with a zero
/// checksum does not sum to minus its pseudo header, and gets a wrong
/// outer checksum; the classifier must not offload such flows to these
/// recipes.
fn lco_udp_csum(
    c: &mut LaneCursor,
    udp_len: RegField,
    shim_len: Option<RegField>,
) -> Result<(), BuildError> {
    let csum = c.alloc_cmp("udp_csum", Width::W16)?;
    c.fetch_si(SiField::NHDR_L4_CSUM, csum)?;
    c.sync(csum)?;

    // Once in the pseudo header, once in the UDP header.
    fold_sub(c, csum, udp_len)?;
    fold_sub(c, csum, udp_len)?;
    if let Some(shim_len) = shim_len {
        fold_sub(c, csum, shim_len)?;
    }

    let inner = c.load_pkt("inner_len", ipv4::TOTAL_LEN.at(Layer::L3))?;
    fold_add(c, csum, inner)?;
    c.free(inner);

    udp_zero_fixup(c, csum)?;
    c.store_nhdr(csum, udp::CSUM.nhdr(NhdrLayer::L4))?;
    c.free(csum);
    Ok(())
}

/// Does recipe `id` put a new IPv4 header on the packet?
pub fn introduces_ipv4(id: RecipeId) -> bool {
    use RecipeId::*;

    matches!(
        id,
        Ipv4HdrRplc
            | Ipv4UdpHdrRplc
            | Ipv4InIpv4Encp
            | SixrdEncp
            | GreIpv4OverIpv4Encp
            | GreIpv6OverIpv4Encp
            | EogreIpv4Encp
            | L2tpIpv4OverIpv4Encp
            | L2tpIpv6OverIpv4Encp
            | VxlanIpv4Encp
            | VxlanIpv4CsumEncp
            | UdpIpv4Encp
            | UdpIpv4CsumEncp
            | EspIpv4TunnEncp
            | EspIpv4TrnsEncp
            | Ipv6ToIpv4
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::isa::AluOp;
    use crate::engine::isa::Op;
    use crate::engine::verify::verify;

    #[test]
    fn every_recipe_builds_and_verifies() {
        for id in RecipeId::ALL {
            let prog = build(id).unwrap_or_else(|e| panic!("{id}: {e}"));
            verify(&prog).unwrap_or_else(|e| panic!("{id}: {e}"));
        }
    }

    #[test]
    fn new_ipv4_headers_get_fresh_ids() {
        for id in RecipeId::ALL {
            let prog = build(id).unwrap();
            let rands = prog
                .insns()
                .filter(|i| {
                    matches!(
                        i.unwrap().op,
                        Op::Alu(alu) if alu.op == AluOp::Rand16
                    )
                })
                .count();
            let want = if introduces_ipv4(id) { 1 } else { 0 };
            assert_eq!(rands, want, "{id}");
        }
    }

    #[test]
    fn no_mod_is_complete_only() {
        let prog = build(RecipeId::NoMod).unwrap();
        assert_eq!(prog.len(), 1);
    }
}
