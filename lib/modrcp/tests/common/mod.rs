// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Common routines for integration tests: packet builders, checksum
//! checks, and a software model of the packet modifier which runs a
//! recipe program over a frame.

// Not every test file uses every routine.
#![allow(dead_code)]

pub use modrcp::api::ModRequirement;
pub use modrcp::api::RecipeId;
pub use modrcp::engine::catalog::select;
pub use modrcp::engine::checksum::Checksum;
pub use modrcp::engine::checksum::HeaderChecksum;
pub use modrcp::engine::isa::AluOp;
pub use modrcp::engine::isa::Insn;
pub use modrcp::engine::isa::Op;
pub use modrcp::engine::isa::Operand;
pub use modrcp::engine::layout::IPPROTO_ESP;
pub use modrcp::engine::layout::IPPROTO_UDP;
pub use modrcp::engine::layout::Layer;
pub use modrcp::engine::layout::NhdrLayer;
pub use modrcp::engine::layout::SiField;
pub use modrcp::engine::layout::StripOffset;
pub use modrcp::engine::layout::ipv4;
pub use modrcp::engine::layout::ipv6;
pub use modrcp::engine::layout::udp;
pub use modrcp::engine::program::Program;
pub use modrcp::engine::recipe;
pub use modrcp::engine::regs::RegField;
pub use modrcp::engine::sideband::NatV4;
pub use modrcp::engine::sideband::Sideband;
pub use std::net::Ipv4Addr;

pub const ETHER_LEN: usize = 14;
pub const IPV4_LEN: usize = 20;
pub const IPV6_LEN: usize = 40;
pub const UDP_LEN: usize = 8;

pub const CLIENT: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
pub const SERVER: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 7);
pub const PUBLIC: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 9);
pub const TUNNEL_SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const TUNNEL_DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

pub fn ether(ethertype: u16) -> Vec<u8> {
    let mut hdr = vec![0xA8, 0x40, 0x25, 0x00, 0x00, 0x01];
    hdr.extend_from_slice(&[0xA8, 0x40, 0x25, 0x00, 0x00, 0x02]);
    hdr.extend_from_slice(&ethertype.to_be_bytes());
    hdr
}

pub fn be16(bytes: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([bytes[off], bytes[off + 1]])
}

/// An IPv4 header without options and with a valid checksum.
pub fn ipv4_hdr(
    total: u16,
    ttl: u8,
    proto: u8,
    src: Ipv4Addr,
    dst: Ipv4Addr,
) -> [u8; IPV4_LEN] {
    let mut hdr = [0u8; IPV4_LEN];
    hdr[0] = 0x45;
    hdr[2..4].copy_from_slice(&total.to_be_bytes());
    hdr[4..6].copy_from_slice(&0x2A2Au16.to_be_bytes());
    hdr[6] = 0x40;
    hdr[8] = ttl;
    hdr[9] = proto;
    hdr[12..16].copy_from_slice(&src.octets());
    hdr[16..20].copy_from_slice(&dst.octets());
    let hc = HeaderChecksum::from(Checksum::compute(&hdr));
    hdr[10..12].copy_from_slice(&hc.bytes());
    hdr
}

pub fn ipv6_hdr(next: u8, hop: u8) -> [u8; IPV6_LEN] {
    let mut hdr = [0u8; IPV6_LEN];
    hdr[0] = 0x60;
    hdr[6] = next;
    hdr[7] = hop;
    hdr[8] = 0x20;
    hdr[9] = 0x01;
    hdr[23] = 0x01;
    hdr[24] = 0x20;
    hdr[25] = 0x01;
    hdr[39] = 0x02;
    hdr
}

/// The sum of an L4 segment and its IPv4 pseudo header.
pub fn l4_sum(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    proto: u8,
    seg: &[u8],
) -> Checksum {
    let mut sum = Checksum::compute(&src.octets());
    sum.add_bytes(&dst.octets());
    sum.add_bytes(&[0, proto]);
    sum.add_bytes(&(seg.len() as u16).to_be_bytes());
    sum.add_bytes(seg);
    sum
}

pub fn ipv4_valid(hdr: &[u8]) -> bool {
    Checksum::compute(&hdr[..IPV4_LEN]).finalize() == 0xFFFF
}

pub fn l4_valid(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, seg: &[u8]) -> bool {
    l4_sum(src, dst, proto, seg).finalize() == 0xFFFF
}

/// A UDP datagram with a valid checksum.
pub fn udp(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    sport: u16,
    dport: u16,
    payload: &[u8],
) -> Vec<u8> {
    let len = (UDP_LEN + payload.len()) as u16;
    let mut seg = Vec::with_capacity(usize::from(len));
    seg.extend_from_slice(&sport.to_be_bytes());
    seg.extend_from_slice(&dport.to_be_bytes());
    seg.extend_from_slice(&len.to_be_bytes());
    seg.extend_from_slice(&[0, 0]);
    seg.extend_from_slice(payload);
    let hc = HeaderChecksum::from(l4_sum(src, dst, IPPROTO_UDP, &seg));
    let csum = match hc.bytes() {
        [0, 0] => [0xFF, 0xFF],
        csum => csum,
    };
    seg[6..8].copy_from_slice(&csum);
    seg
}

/// An IPv4 packet carrying `seg` as protocol `proto`.
pub fn ipv4_packet(
    ttl: u8,
    proto: u8,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    seg: &[u8],
) -> Vec<u8> {
    let total = (IPV4_LEN + seg.len()) as u16;
    let mut pkt = ipv4_hdr(total, ttl, proto, src, dst).to_vec();
    pkt.extend_from_slice(seg);
    pkt
}

/// A received frame, with the layer boundaries the parser found.
#[derive(Clone, Debug)]
pub struct Frame {
    pub bytes: Vec<u8>,
    /// Offsets of the packet layers, by [`Layer`] code.
    pub layers: [Option<usize>; 6],
}

impl Frame {
    /// An Ethernet frame carrying the IPv4 `packet`, whose L4
    /// checksum sits `csum_off` bytes into its L4 header.
    pub fn ipv4(packet: &[u8], csum_off: u8) -> Self {
        let mut bytes = ether(0x0800);
        bytes.extend_from_slice(packet);
        let l3 = ETHER_LEN;
        let l4 = l3 + usize::from(packet[0] & 0x0F) * 4;
        let csum = l4 + usize::from(csum_off);
        let layers = [Some(l3), Some(l4), Some(csum), None, None, None];
        Self { bytes, layers }
    }

    pub fn l3(&self) -> usize {
        self.layers[0].unwrap_or(0)
    }

    pub fn l4(&self) -> usize {
        self.layers[1].unwrap_or(0)
    }

    /// The packet descriptor of this frame.
    fn desc(&self) -> [u8; 8] {
        let len = self.bytes.len();
        let mut desc = [0u8; 8];
        desc[0..2].copy_from_slice(&(len as u16).to_be_bytes());
        desc[2..4].copy_from_slice(&((len - self.l3()) as u16).to_be_bytes());
        desc[4..6].copy_from_slice(&((len - self.l4()) as u16).to_be_bytes());
        desc
    }
}

/// A new header template, with the offsets of its layers by
/// [`NhdrLayer`] code.
#[derive(Clone, Debug)]
pub struct Template {
    pub bytes: Vec<u8>,
    pub layers: [usize; 4],
}

impl Template {
    /// A bare Ethernet header.
    pub fn ether() -> Self {
        Self { bytes: ether(0x0800), layers: [0, ETHER_LEN, ETHER_LEN, 0] }
    }

    /// The headers `hdrs` back to back, an Ethernet header first, with
    /// the shim, L3 and L4 layers at the given offsets.
    pub fn new(hdrs: &[&[u8]], shim: usize, l3: usize, l4: usize) -> Self {
        let bytes = hdrs.iter().fold(Vec::new(), |mut acc, h| {
            acc.extend_from_slice(h);
            acc
        });
        Self { bytes, layers: [0, shim, l3, l4] }
    }
}

/// Run `prog` over `frame` the way the modifier does, returning the
/// frame as transmitted. `rand` is what the random number generator
/// yields. Instructions execute one at a time, in program order.
pub fn run(
    prog: &Program,
    frame: &Frame,
    tmpl: &Template,
    sb: &Sideband,
    rand: u16,
) -> Vec<u8> {
    let mut m = Machine {
        regs: [0; 64],
        sb,
        desc: frame.desc(),
        pkt: frame.bytes.clone(),
        layers: frame.layers,
        tmpl,
        rand,
    };
    for insn in prog.insns() {
        let insn = insn.unwrap();
        if insn.is_complete() {
            break;
        }
        m.step(&insn);
    }
    m.pkt
}

struct Machine<'a> {
    regs: [u8; 64],
    sb: &'a Sideband,
    desc: [u8; 8],
    pkt: Vec<u8>,
    layers: [Option<usize>; 6],
    tmpl: &'a Template,
    rand: u16,
}

impl Machine<'_> {
    fn reg(&self, field: RegField) -> u32 {
        let start = usize::from(field.reg) * 4 + usize::from(field.off);
        let end = start + usize::from(field.width.bytes());
        load(&self.regs[start..end])
    }

    fn set_reg(&mut self, field: RegField, val: u32) {
        let start = usize::from(field.reg) * 4 + usize::from(field.off);
        let width = usize::from(field.width.bytes());
        let be = val.to_be_bytes();
        self.regs[start..start + width].copy_from_slice(&be[4 - width..]);
    }

    fn operand(&self, op: Operand) -> u32 {
        match op {
            Operand::Reg(field) => self.reg(field),
            Operand::Imm(imm) => u32::from(imm),
        }
    }

    fn layer(&self, layer: Layer) -> usize {
        self.layers[layer.code() as usize]
            .unwrap_or_else(|| panic!("layer {layer} is not in the packet"))
    }

    fn step(&mut self, insn: &Insn) {
        match insn.op {
            Op::Nop => {}

            Op::SiToReg { src, dst } => self.set_reg(dst, self.sb.get(src)),

            Op::PktToReg { src, dst } => {
                let width = usize::from(src.width.bytes());
                let val = match src.layer {
                    Layer::Desc => {
                        let off = usize::from(src.off);
                        load(&self.desc[off..off + width])
                    }
                    layer => {
                        let off = self.layer(layer) + usize::from(src.off);
                        load(&self.pkt[off..off + width])
                    }
                };
                self.set_reg(dst, val);
            }

            Op::Alu(alu) => {
                if let Some(cond) = alu.cond {
                    let lhs = self.reg(cond.reg);
                    if !cond.cmp.eval(lhs, u32::from(cond.imm)) {
                        return;
                    }
                }
                let a = self.reg(alu.a);
                let b = match alu.op {
                    AluOp::Rand16 => u32::from(self.rand),
                    _ => self.operand(alu.b),
                };
                let val = alu.op.apply(a, b, alu.dst.width);
                self.set_reg(alu.dst, val);
            }

            // Visibility only matters to the lanes, not to the values.
            Op::Sync { .. } => {}

            Op::RegToPkt { src, dst } => {
                let off = self.layer(dst.layer) + usize::from(dst.off);
                let val = self.reg(src);
                store(&mut self.pkt[off..], src, val);
            }

            Op::Replace(rep) => {
                let cut = match rep.strip {
                    StripOffset::None => 0,
                    StripOffset::UpToL3 => self.layer(Layer::L3),
                    StripOffset::UpToL4 => self.layer(Layer::L4),
                } + usize::from(rep.extra);
                let tlen = self.tmpl.bytes.len();
                let mut pkt = self.tmpl.bytes.clone();
                pkt.extend_from_slice(&self.pkt[cut..]);
                self.pkt = pkt;
                for layer in &mut self.layers {
                    *layer = layer
                        .filter(|off| *off >= cut)
                        .map(|off| off - cut + tlen);
                }
            }

            Op::RegToNhdr { src, dst } => {
                let off = self.tmpl.layers[dst.layer.code() as usize]
                    + usize::from(dst.off);
                let val = self.reg(src);
                store(&mut self.pkt[off..], src, val);
            }

            Op::NatCopy { layer, ports } => {
                let sb = self.sb.as_bytes();
                let l3 = self.layer(layer);
                let src = usize::from(SiField::NAT_IPV4_SRC.off);
                let dst = usize::from(ipv4::SRC.off);
                self.pkt[l3 + dst..l3 + dst + 8]
                    .copy_from_slice(&sb[src..src + 8]);
                if ports {
                    let l4 = layer.l4().map(|l| self.layer(l)).unwrap();
                    let src = usize::from(SiField::NAT_SPORT.off);
                    self.pkt[l4..l4 + 4].copy_from_slice(&sb[src..src + 4]);
                }
            }
        }
    }
}

fn load(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0, |acc, b| (acc << 8) | u32::from(*b))
}

fn store(dst: &mut [u8], src: RegField, val: u32) {
    let width = usize::from(src.width.bytes());
    dst[..width].copy_from_slice(&val.to_be_bytes()[4 - width..]);
}
