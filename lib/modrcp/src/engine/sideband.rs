// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The per-flow sideband, as the classifier fills it in.
//!
//! Recipes only ever fetch from the sideband. This type is for the
//! other side: laying the bytes out, and deriving the checksum
//! constants the recipes fold into packets.

use super::checksum::Checksum;
use super::checksum::HeaderChecksum;
use super::checksum::csum16_sub;
use super::layout::IPPROTO_UDP;
use super::layout::SIDEBAND_LEN;
use super::layout::SiField;
use super::layout::ipv4;
use super::layout::udp;
use super::regs::Width;
use std::net::Ipv4Addr;

/// The addresses and ports of a flow before and after NAT.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NatV4 {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub sport: u16,
    pub dport: u16,
}

impl NatV4 {
    fn addr_bytes(&self) -> [u8; 8] {
        let mut bytes = [0; 8];
        bytes[..4].copy_from_slice(&self.src.octets());
        bytes[4..].copy_from_slice(&self.dst.octets());
        bytes
    }

    fn port_bytes(&self) -> [u8; 4] {
        let mut bytes = [0; 4];
        bytes[..2].copy_from_slice(&self.sport.to_be_bytes());
        bytes[2..].copy_from_slice(&self.dport.to_be_bytes());
        bytes
    }
}

/// Stored checksum delta for `old` words being rewritten to `new`:
/// `HC' = csum16_add(HC, delta)`.
fn rewrite_delta(old: &[u8], new: &[u8]) -> u16 {
    let old = Checksum::compute(old).finalize_be();
    let new = Checksum::compute(new).finalize_be();
    csum16_sub(old, new)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Sideband {
    bytes: [u8; SIDEBAND_LEN as usize],
}

impl Default for Sideband {
    fn default() -> Self {
        Self::new()
    }
}

impl Sideband {
    pub fn new() -> Self {
        Self { bytes: [0; SIDEBAND_LEN as usize] }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Set `field` to the low bytes of `val`, in network order.
    pub fn set(&mut self, field: SiField, val: u32) {
        let off = usize::from(field.off);
        let be = val.to_be_bytes();
        let width = usize::from(field.width.bytes());
        self.bytes[off..off + width].copy_from_slice(&be[4 - width..]);
    }

    pub fn get(&self, field: SiField) -> u32 {
        let off = usize::from(field.off);
        let width = usize::from(field.width.bytes());
        self.bytes[off..off + width]
            .iter()
            .fold(0, |acc, b| (acc << 8) | u32::from(*b))
    }

    /// Fill in the NAT fields and their checksum deltas for a flow
    /// rewritten from `old` to `new`.
    ///
    /// The L4 delta covers the pseudo header addresses, and the ports
    /// when `ports` is set, so it suits TCP and UDP alike. A recipe
    /// copying ports always copies both, so without NAPT the new ports
    /// are the old ones.
    pub fn set_nat_v4(&mut self, old: &NatV4, new: &NatV4, ports: bool) {
        let new_ports = if ports { new.port_bytes() } else { old.port_bytes() };
        let l3 = rewrite_delta(&old.addr_bytes(), &new.addr_bytes());

        let mut old_l4 = [0u8; 12];
        old_l4[..8].copy_from_slice(&old.addr_bytes());
        old_l4[8..].copy_from_slice(&old.port_bytes());
        let mut new_l4 = [0u8; 12];
        new_l4[..8].copy_from_slice(&new.addr_bytes());
        new_l4[8..].copy_from_slice(&new_ports);

        self.set(SiField::NAT_IPV4_SRC, u32::from(new.src));
        self.set(SiField::NAT_IPV4_DST, u32::from(new.dst));
        self.set(
            SiField::NAT_SPORT,
            u32::from(u16::from_be_bytes([new_ports[0], new_ports[1]])),
        );
        self.set(
            SiField::NAT_DPORT,
            u32::from(u16::from_be_bytes([new_ports[2], new_ports[3]])),
        );
        self.set(SiField::L3_CSUM_DELTA, u32::from(l3));
        let l4 = rewrite_delta(&old_l4, &new_l4);
        self.set(SiField::L4_CSUM_DELTA, u32::from(l4));
    }

    /// Set the template IPv4 checksum from the template's IPv4 header,
    /// with total length and identification taken as zero.
    pub fn set_nhdr_ipv4(&mut self, hdr: &[u8; ipv4::HDR_LEN as usize]) {
        let mut hdr = *hdr;
        for field in [ipv4::TOTAL_LEN, ipv4::IDENT, ipv4::CSUM] {
            let off = usize::from(field.off);
            hdr[off..off + usize::from(field.width.bytes())].fill(0);
        }
        let hc = HeaderChecksum::from(Checksum::compute(&hdr));
        self.set(SiField::NHDR_L3_CSUM, u32::from(hc.value()));
    }

    /// Set the template UDP checksum constant of a checksummed UDP
    /// encapsulation, which never reads the payload it covers.
    ///
    /// `outer` is the template's IPv4 header. `udp_on` is every byte
    /// from the outer UDP header up to the inner IPv4 header: the
    /// template's UDP and tunnel headers, and for VXLAN the flow's
    /// inner Ethernet header. The UDP length and checksum in it are
    /// taken as zero. `inner` is the IPv4 header the flow's packets
    /// carry. `udp_on` must be of even length so the inner packet
    /// starts on a checksum word.
    ///
    /// The constant only holds for inner packets whose IPv4 and L4
    /// checksums are valid, since such a packet sums to minus its
    /// pseudo header. A UDP datagram sent without a checksum does not.
    pub fn set_nhdr_udp_lco(
        &mut self,
        outer: &[u8; ipv4::HDR_LEN as usize],
        udp_on: &[u8],
        inner: &[u8; ipv4::HDR_LEN as usize],
    ) {
        debug_assert!(udp_on.len() % 2 == 0);
        let addrs = usize::from(ipv4::SRC.off)..usize::from(ipv4::DST.off) + 4;
        let hdr_len = usize::from(udp::HDR_LEN);

        let mut sum = Checksum::compute(&outer[addrs.clone()]);
        sum.add_bytes(&[0, IPPROTO_UDP]);
        sum.add_bytes(&udp_on[..usize::from(udp::LEN.off)]);
        sum.add_bytes(&udp_on[hdr_len..]);

        let ihl = u16::from(inner[0] & 0x0F) * 4;
        sum.add_bytes(&ihl.to_be_bytes());
        sum.sub_bytes(&inner[addrs]);
        sum.sub_bytes(&[0, inner[usize::from(ipv4::PROTO.off)]]);

        let hc = HeaderChecksum::from(sum);
        self.set(SiField::NHDR_L4_CSUM, u32::from(hc.value()));
    }

    pub fn set_u8(&mut self, field: SiField, val: u8) {
        debug_assert_eq!(field.width, Width::W8);
        self.set(field, u32::from(val));
    }
}
