// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Modification flags and the requirement bitmap built from them.
//!
//! The flow classifier describes what a flow needs done to its
//! packets as a set of independent facts: which outer family the
//! packet has, which new outer header gets pushed, which tunnel is
//! added or removed, whether NAT applies, and so on. Each fact is a
//! [`ModFlag`], and the set of them is a [`ModRequirement`]. The
//! requirement is what the recipe catalog is keyed on.

use alloc::string::String;
use bitflags::bitflags;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// A single fact about the modification a flow requires.
///
/// The discriminant is the flag's bit position in a
/// [`ModRequirement`].
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[repr(u8)]
pub enum ModFlag {
    /// The packet's outer L3 header is IPv4.
    Ipv4 = 0,
    /// The packet's outer L3 header is IPv6.
    Ipv6 = 1,
    /// A new outer IPv4 header is pushed.
    NhdrIpv4 = 2,
    /// A new outer IPv6 header is pushed.
    NhdrIpv6 = 3,
    /// Existing headers are replaced up to and including L2.
    HdrRplcL2 = 4,
    /// Existing headers are replaced up to and including L3.
    HdrRplcL3 = 5,
    /// Existing headers are replaced up to and including L4.
    HdrRplcL4 = 6,
    /// The IPv4 addresses are rewritten.
    Ipv4Nat = 7,
    /// The IPv4 TTL is decremented.
    Ipv4Ttl = 8,
    /// The IPv6 hop limit is decremented.
    Ipv6Hopl = 9,
    /// The L4 ports are rewritten.
    L4Napt = 10,
    /// A PPPoE session header is pushed.
    PppoeEncp = 11,
    /// A PPPoE session header is removed.
    PppoeDecp = 12,
    /// The packet is prepared for ESP tunnel mode encryption.
    EspTunnEncp = 13,
    /// The packet is prepared for ESP transport mode encryption.
    EspTrnsEncp = 14,
    /// The packet matched an IPsec bypass policy.
    EspBypass = 15,
    GreEncp = 16,
    GreDecp = 17,
    /// IPv4-in-IPv6 (DS-Lite) encapsulation.
    DsliteEncp = 18,
    DsliteDecp = 19,
    /// IPv6-in-IPv4 (6RD) encapsulation.
    SixrdEncp = 20,
    SixrdDecp = 21,
    L2tpEncp = 22,
    L2tpDecp = 23,
    VxlanEncp = 24,
    VxlanDecp = 25,
    UdpEncp = 26,
    UdpDecp = 27,
    /// The pushed UDP header carries no checksum.
    UdpCsumOff = 28,
}

impl ModFlag {
    /// The number of defined flags.
    pub const COUNT: usize = 29;

    /// Every flag, in bit order.
    pub const ALL: [ModFlag; Self::COUNT] = [
        Self::Ipv4,
        Self::Ipv6,
        Self::NhdrIpv4,
        Self::NhdrIpv6,
        Self::HdrRplcL2,
        Self::HdrRplcL3,
        Self::HdrRplcL4,
        Self::Ipv4Nat,
        Self::Ipv4Ttl,
        Self::Ipv6Hopl,
        Self::L4Napt,
        Self::PppoeEncp,
        Self::PppoeDecp,
        Self::EspTunnEncp,
        Self::EspTrnsEncp,
        Self::EspBypass,
        Self::GreEncp,
        Self::GreDecp,
        Self::DsliteEncp,
        Self::DsliteDecp,
        Self::SixrdEncp,
        Self::SixrdDecp,
        Self::L2tpEncp,
        Self::L2tpDecp,
        Self::VxlanEncp,
        Self::VxlanDecp,
        Self::UdpEncp,
        Self::UdpDecp,
        Self::UdpCsumOff,
    ];

    /// Return the flag's mask in a requirement bitmap.
    pub const fn bit(self) -> u64 {
        1 << self as u8
    }

    /// Return the flag's diagnostic name.
    pub const fn name(self) -> &'static str {
        FLAG_NAMES[self as usize]
    }

    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::ALL.get(usize::from(bit)).copied()
    }
}

// Every flag must have a bit in the requirement bitmap.
const _: () = assert!(ModFlag::COUNT < u64::BITS as usize);

const FLAG_NAMES: [&str; ModFlag::COUNT] = [
    "IPV4",
    "IPV6",
    "NHDR_IPV4",
    "NHDR_IPV6",
    "HDR_RPLC_L2",
    "HDR_RPLC_L3",
    "HDR_RPLC_L4",
    "IPV4_NAT",
    "IPV4_TTL",
    "IPV6_HOPL",
    "L4_NAPT",
    "PPPOE_ENCP",
    "PPPOE_DECP",
    "ESP_TUNN_ENCP",
    "ESP_TRNS_ENCP",
    "ESP_BYPASS",
    "GRE_ENCP",
    "GRE_DECP",
    "DSLITE_ENCP",
    "DSLITE_DECP",
    "SIXRD_ENCP",
    "SIXRD_DECP",
    "L2TP_ENCP",
    "L2TP_DECP",
    "VXLAN_ENCP",
    "VXLAN_DECP",
    "UDP_ENCP",
    "UDP_DECP",
    "UDP_CSUM_OFF",
];

/// Return the name of the flag at `bit`.
///
/// This is total: any bit past the last defined flag is reported as
/// `"UNKNOWN"`.
pub fn flag_name(bit: u8) -> &'static str {
    FLAG_NAMES.get(usize::from(bit)).copied().unwrap_or("UNKNOWN")
}

impl Display for ModFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ModFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .iter()
            .find(|flag| flag.name() == upper)
            .copied()
            .ok_or_else(|| format!("unknown modification flag: {}", s))
    }
}

bitflags! {
    /// The set of [`ModFlag`]s a flow requires.
    ///
    /// The classifier produces one of these per flow and hands it to
    /// the recipe catalog, which maps it to a recipe by exact
    /// equality.
    #[derive(
        Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq,
        Serialize,
    )]
    pub struct ModRequirement: u64 {
        const IPV4 = ModFlag::Ipv4.bit();
        const IPV6 = ModFlag::Ipv6.bit();
        const NHDR_IPV4 = ModFlag::NhdrIpv4.bit();
        const NHDR_IPV6 = ModFlag::NhdrIpv6.bit();
        const HDR_RPLC_L2 = ModFlag::HdrRplcL2.bit();
        const HDR_RPLC_L3 = ModFlag::HdrRplcL3.bit();
        const HDR_RPLC_L4 = ModFlag::HdrRplcL4.bit();
        const IPV4_NAT = ModFlag::Ipv4Nat.bit();
        const IPV4_TTL = ModFlag::Ipv4Ttl.bit();
        const IPV6_HOPL = ModFlag::Ipv6Hopl.bit();
        const L4_NAPT = ModFlag::L4Napt.bit();
        const PPPOE_ENCP = ModFlag::PppoeEncp.bit();
        const PPPOE_DECP = ModFlag::PppoeDecp.bit();
        const ESP_TUNN_ENCP = ModFlag::EspTunnEncp.bit();
        const ESP_TRNS_ENCP = ModFlag::EspTrnsEncp.bit();
        const ESP_BYPASS = ModFlag::EspBypass.bit();
        const GRE_ENCP = ModFlag::GreEncp.bit();
        const GRE_DECP = ModFlag::GreDecp.bit();
        const DSLITE_ENCP = ModFlag::DsliteEncp.bit();
        const DSLITE_DECP = ModFlag::DsliteDecp.bit();
        const SIXRD_ENCP = ModFlag::SixrdEncp.bit();
        const SIXRD_DECP = ModFlag::SixrdDecp.bit();
        const L2TP_ENCP = ModFlag::L2tpEncp.bit();
        const L2TP_DECP = ModFlag::L2tpDecp.bit();
        const VXLAN_ENCP = ModFlag::VxlanEncp.bit();
        const VXLAN_DECP = ModFlag::VxlanDecp.bit();
        const UDP_ENCP = ModFlag::UdpEncp.bit();
        const UDP_DECP = ModFlag::UdpDecp.bit();
        const UDP_CSUM_OFF = ModFlag::UdpCsumOff.bit();
    }
}

impl ModRequirement {
    /// Return this requirement with `flag` added.
    pub const fn with(self, flag: ModFlag) -> Self {
        Self::from_bits_retain(self.bits() | flag.bit())
    }

    /// Does this requirement include `flag`?
    pub const fn has(self, flag: ModFlag) -> bool {
        self.bits() & flag.bit() != 0
    }

    /// Iterate the defined flags present in this requirement, in bit
    /// order.
    pub fn mod_flags(self) -> impl Iterator<Item = ModFlag> {
        ModFlag::ALL.into_iter().filter(move |flag| self.has(*flag))
    }

    /// A displayable list of every set bit's name, including bits
    /// which name no defined flag.
    pub fn names(self) -> FlagNames {
        FlagNames(self)
    }
}

impl From<ModFlag> for ModRequirement {
    fn from(flag: ModFlag) -> Self {
        Self::from_bits_retain(flag.bit())
    }
}

impl FromIterator<ModFlag> for ModRequirement {
    fn from_iter<I: IntoIterator<Item = ModFlag>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |req, flag| req.with(flag))
    }
}

/// The flag names of a [`ModRequirement`], rendered without
/// allocating.
///
/// Known flags print as their name, undefined bits as
/// `UNKNOWN(<bit>)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FlagNames(ModRequirement);

impl Display for FlagNames {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bits = self.0.bits();
        write!(f, "{{")?;
        let mut first = true;
        for bit in 0..u64::BITS as u8 {
            if bits & (1 << bit) == 0 {
                continue;
            }

            if !first {
                write!(f, ", ")?;
            }
            first = false;

            match ModFlag::from_bit(bit) {
                Some(flag) => write!(f, "{}", flag.name())?,
                None => write!(f, "UNKNOWN({})", bit)?,
            }
        }
        write!(f, "}}")
    }
}
