// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Where recipe instructions read from and write to.
//!
//! A recipe addresses three kinds of memory besides its registers:
//!
//! * the per-flow sideband ([`SiField`]), filled in by the classifier,
//! * the packet itself ([`PktField`]), addressed relative to a layer
//!   boundary resolved by the parser, and
//! * the new header template ([`NhdrField`]), the bytes inserted by a
//!   [`Replace`] operation, addressed relative to the headers it
//!   contains.
//!
//! Offsets of the protocol fields recipes touch live in the small
//! per-protocol modules below, as [`HdrField`] values which can be
//! placed at any packet layer or template layer.

use super::regs::Width;
use core::fmt;
use core::fmt::Display;

/// The size of the per-flow sideband, in bytes.
pub const SIDEBAND_LEN: u8 = 32;

/// The size of the packet descriptor, in bytes.
pub const DESC_LEN: u8 = 8;

/// A field of the per-flow sideband.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SiField {
    pub off: u8,
    pub width: Width,
}

impl SiField {
    pub const fn new(off: u8, width: Width) -> Self {
        Self { off, width }
    }

    /// Length of the new header template.
    pub const NHDR_LEN: Self = Self::new(0, Width::W8);
    /// IPv4 TTL decrement.
    pub const TTL_DELTA: Self = Self::new(1, Width::W8);
    /// IPv6 hop limit decrement.
    pub const HOPL_DELTA: Self = Self::new(2, Width::W8);
    /// Cipher block size minus one.
    pub const ESP_PAD_MASK: Self = Self::new(3, Width::W8);
    /// IPv4 header checksum delta of a NAT rewrite.
    pub const L3_CSUM_DELTA: Self = Self::new(4, Width::W16);
    /// L4 checksum delta of a NAT rewrite or a translation's pseudo
    /// header change.
    pub const L4_CSUM_DELTA: Self = Self::new(6, Width::W16);
    pub const NAT_IPV4_SRC: Self = Self::new(8, Width::W32);
    pub const NAT_IPV4_DST: Self = Self::new(12, Width::W32);
    pub const NAT_SPORT: Self = Self::new(16, Width::W16);
    pub const NAT_DPORT: Self = Self::new(18, Width::W16);
    /// Template IPv4 header checksum, computed with the total length
    /// and identification zeroed. Recipes which write the TTL or the
    /// protocol expect the template to carry zero there.
    pub const NHDR_L3_CSUM: Self = Self::new(20, Width::W16);
    /// Constant part of the template UDP checksum, for an IPv4 inner
    /// packet: the template's pseudo header and UDP header with the
    /// lengths zeroed, and any flow-constant template bytes after the
    /// UDP header, less the inner pseudo header terms (addresses,
    /// protocol and header length). `Sideband::set_nhdr_udp_lco`
    /// derives it.
    pub const NHDR_L4_CSUM: Self = Self::new(22, Width::W16);
    /// ESP header, IV, trailer and ICV bytes, excluding padding.
    pub const ESP_OVERHEAD: Self = Self::new(24, Width::W16);

    pub const ALL: [(&'static str, Self); 13] = [
        ("NHDR_LEN", Self::NHDR_LEN),
        ("TTL_DELTA", Self::TTL_DELTA),
        ("HOPL_DELTA", Self::HOPL_DELTA),
        ("ESP_PAD_MASK", Self::ESP_PAD_MASK),
        ("L3_CSUM_DELTA", Self::L3_CSUM_DELTA),
        ("L4_CSUM_DELTA", Self::L4_CSUM_DELTA),
        ("NAT_IPV4_SRC", Self::NAT_IPV4_SRC),
        ("NAT_IPV4_DST", Self::NAT_IPV4_DST),
        ("NAT_SPORT", Self::NAT_SPORT),
        ("NAT_DPORT", Self::NAT_DPORT),
        ("NHDR_L3_CSUM", Self::NHDR_L3_CSUM),
        ("NHDR_L4_CSUM", Self::NHDR_L4_CSUM),
        ("ESP_OVERHEAD", Self::ESP_OVERHEAD),
    ];

    pub fn name(&self) -> Option<&'static str> {
        Self::ALL.iter().find(|(_, f)| f == self).map(|(n, _)| *n)
    }
}

impl Display for SiField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "si.{}", name),
            None => write!(f, "si[{}:{}]", self.off, self.width.bytes()),
        }
    }
}

/// A packet layer boundary, as resolved by the parser.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Layer {
    L3 = 0,
    L4,
    /// The L4 checksum field itself, wherever the L4 protocol keeps it.
    L4Csum,
    InnerL3,
    InnerL4,
    InnerL4Csum,
    /// The packet descriptor rather than packet bytes.
    Desc,
}

impl Layer {
    pub const fn code(self) -> u64 {
        self as u64
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::L3),
            1 => Some(Self::L4),
            2 => Some(Self::L4Csum),
            3 => Some(Self::InnerL3),
            4 => Some(Self::InnerL4),
            5 => Some(Self::InnerL4Csum),
            6 => Some(Self::Desc),
            _ => None,
        }
    }

    /// Is this layer discarded by `rep`?
    ///
    /// Stripping up to L4 discards L3, and the L4 header too when any
    /// extra bytes go with it. Inner layers and the descriptor are
    /// never discarded.
    pub fn stripped_by(self, rep: Replace) -> bool {
        match (rep.strip, self) {
            (StripOffset::None, _) => false,
            (StripOffset::UpToL3, Self::L3) => rep.extra > 0,
            (StripOffset::UpToL3, _) => false,
            (StripOffset::UpToL4, Self::L3) => true,
            (StripOffset::UpToL4, Self::L4 | Self::L4Csum) => rep.extra > 0,
            (StripOffset::UpToL4, _) => false,
        }
    }

    /// The L4 layer following this L3 layer.
    pub fn l4(self) -> Option<Self> {
        match self {
            Self::L3 => Some(Self::L4),
            Self::InnerL3 => Some(Self::InnerL4),
            _ => None,
        }
    }
}

impl Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::L3 => "l3",
            Self::L4 => "l4",
            Self::L4Csum => "l4csum",
            Self::InnerL3 => "il3",
            Self::InnerL4 => "il4",
            Self::InnerL4Csum => "il4csum",
            Self::Desc => "desc",
        };
        write!(f, "{}", s)
    }
}

/// A field of the packet, relative to a layer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PktField {
    pub layer: Layer,
    pub off: u8,
    pub width: Width,
}

impl Display for PktField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}[{}:{}]", self.layer, self.off, self.width.bytes())
    }
}

/// A layer of the new header template.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum NhdrLayer {
    L2 = 0,
    /// A PPPoE or L2TP header.
    Shim,
    L3,
    L4,
}

impl NhdrLayer {
    pub const fn code(self) -> u64 {
        self as u64
    }

    pub fn from_code(code: u64) -> Self {
        match code & 0x3 {
            0 => Self::L2,
            1 => Self::Shim,
            2 => Self::L3,
            _ => Self::L4,
        }
    }
}

/// A field of the new header template. The width is that of the
/// register stored to it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NhdrField {
    pub layer: NhdrLayer,
    pub off: u8,
}

impl Display for NhdrField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let layer = match self.layer {
            NhdrLayer::L2 => "l2",
            NhdrLayer::Shim => "shim",
            NhdrLayer::L3 => "l3",
            NhdrLayer::L4 => "l4",
        };
        write!(f, "nhdr.{}[{}]", layer, self.off)
    }
}

/// How much of the original packet a [`Replace`] discards.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StripOffset {
    /// Keep the whole frame, L2 included.
    None,
    /// Discard everything in front of L3.
    UpToL3,
    /// Discard everything in front of L4, L3 included.
    UpToL4,
}

impl StripOffset {
    pub const fn code(self) -> u64 {
        match self {
            Self::None => 0,
            Self::UpToL3 => 1,
            Self::UpToL4 => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::UpToL3),
            2 => Some(Self::UpToL4),
            _ => None,
        }
    }
}

/// Strip the start of the packet up to `strip` and then `extra` more
/// bytes, and insert the `NHDR_LEN` byte header template in their
/// place.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Replace {
    pub strip: StripOffset,
    pub extra: u8,
}

impl Display for Replace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let strip = match self.strip {
            StripOffset::None => "none",
            StripOffset::UpToL3 => "l3",
            StripOffset::UpToL4 => "l4",
        };
        write!(f, "strip={} extra={}", strip, self.extra)
    }
}

/// A protocol header field, placed at a layer when used.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct HdrField {
    pub off: u8,
    pub width: Width,
}

impl HdrField {
    pub const fn new(off: u8, width: Width) -> Self {
        Self { off, width }
    }

    pub const fn at(self, layer: Layer) -> PktField {
        PktField { layer, off: self.off, width: self.width }
    }

    pub const fn nhdr(self, layer: NhdrLayer) -> NhdrField {
        NhdrField { layer, off: self.off }
    }
}

pub mod desc {
    use super::HdrField;
    use super::Width;

    /// Length of the frame as received.
    pub const FRAME_LEN: HdrField = HdrField::new(0, Width::W16);
    /// Length from the start of L3 to the end of the packet.
    pub const L3_LEN: HdrField = HdrField::new(2, Width::W16);
    /// Length from the start of L4 to the end of the packet.
    pub const L4_LEN: HdrField = HdrField::new(4, Width::W16);
}

pub mod ipv4 {
    use super::HdrField;
    use super::Width;

    pub const HDR_LEN: u16 = 20;
    pub const TOTAL_LEN: HdrField = HdrField::new(2, Width::W16);
    pub const IDENT: HdrField = HdrField::new(4, Width::W16);
    pub const TTL: HdrField = HdrField::new(8, Width::W8);
    /// The TTL and protocol bytes as one checksum word.
    pub const TTL_PROTO: HdrField = HdrField::new(8, Width::W16);
    pub const PROTO: HdrField = HdrField::new(9, Width::W8);
    pub const CSUM: HdrField = HdrField::new(10, Width::W16);
    pub const SRC: HdrField = HdrField::new(12, Width::W32);
    pub const DST: HdrField = HdrField::new(16, Width::W32);
}

pub mod ipv6 {
    use super::HdrField;
    use super::Width;

    pub const HDR_LEN: u16 = 40;
    pub const PAYLOAD_LEN: HdrField = HdrField::new(4, Width::W16);
    pub const NEXT_HDR: HdrField = HdrField::new(6, Width::W8);
    pub const HOP_LIMIT: HdrField = HdrField::new(7, Width::W8);
    /// The next header and hop limit bytes as one word.
    pub const NEXT_HOP: HdrField = HdrField::new(6, Width::W16);
}

pub mod udp {
    use super::HdrField;
    use super::Width;

    pub const HDR_LEN: u16 = 8;
    pub const SRC_PORT: HdrField = HdrField::new(0, Width::W16);
    pub const DST_PORT: HdrField = HdrField::new(2, Width::W16);
    pub const LEN: HdrField = HdrField::new(4, Width::W16);
    pub const CSUM: HdrField = HdrField::new(6, Width::W16);
}

/// The checksum field at an `L4Csum` layer.
pub const L4_CSUM: HdrField = HdrField::new(0, Width::W16);

pub mod pppoe {
    use super::HdrField;
    use super::Width;

    /// PPPoE session header plus the PPP protocol field.
    pub const HDR_LEN: u16 = 8;
    /// The PPPoE payload length covers the PPP protocol field.
    pub const PPP_PROTO_LEN: u16 = 2;
    pub const LEN: HdrField = HdrField::new(4, Width::W16);
}

pub mod l2tp {
    use super::HdrField;
    use super::Width;

    /// L2TPv2 data header with the length bit set, plus the PPP
    /// address, control and protocol fields.
    pub const HDR_LEN: u16 = 12;
    pub const LEN: HdrField = HdrField::new(2, Width::W16);
}

pub const GRE_HDR_LEN: u16 = 4;
pub const VXLAN_HDR_LEN: u16 = 8;
pub const ETHER_HDR_LEN: u16 = 14;

pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_ESP: u8 = 50;

/// Pad length and next header bytes ending every ESP payload.
pub const ESP_TRAILER_LEN: u16 = 2;
