// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Recipe identifiers.
//!
//! A recipe is a micro-program committed once to the modifier's
//! recipe memory, at the slot given by its [`RecipeId`]. The ids are
//! part of the contract with the classifier, which stores the
//! selected id in each flow's session entry, so the numbering below
//! must only ever grow at the end.

use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// The raw id telling the modifier to leave the packet untouched
/// without running any recipe.
pub const RECIPE_NOP: u8 = 0xFE;

/// The raw id of a session with no valid recipe.
pub const RECIPE_INVALID: u8 = 0xFF;

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
pub enum RecipeId {
    NoMod = 0,
    HdrRplc,
    Ipv4Routed,
    Ipv4Nat,
    Ipv4Napt,
    Ipv6Routed,
    Ipv4RoutedPppoe,
    Ipv4NaptPppoe,
    Ipv6RoutedPppoe,
    Ipv4HdrRplc,
    Ipv6HdrRplc,
    Ipv4UdpHdrRplc,
    Ipv6UdpHdrRplc,
    Ipv4InIpv4Encp,
    Ipv6InIpv6Encp,
    DsliteEncp,
    SixrdEncp,
    DsliteDecp,
    Ipv6TunnDecp,
    Ipv4TunnDecp,
    GreIpv4OverIpv4Encp,
    GreIpv6OverIpv4Encp,
    GreIpv4OverIpv6Encp,
    GreIpv6OverIpv6Encp,
    EogreIpv4Encp,
    EogreIpv6Encp,
    GreIpv4Decp,
    GreIpv6Decp,
    EogreDecp,
    L2tpIpv4OverIpv4Encp,
    L2tpIpv6OverIpv4Encp,
    L2tpIpv4OverIpv6Encp,
    L2tpIpv6OverIpv6Encp,
    L2tpIpv4Decp,
    L2tpIpv6Decp,
    VxlanIpv4Encp,
    VxlanIpv4CsumEncp,
    VxlanIpv6Encp,
    VxlanDecp,
    UdpIpv4Encp,
    UdpIpv4CsumEncp,
    UdpIpv6Encp,
    UdpIpv4Decp,
    UdpIpv6Decp,
    EspIpv4TunnEncp,
    EspIpv6TunnEncp,
    EspIpv4TrnsEncp,
    EspIpv6TrnsEncp,
    Ipv4ToIpv6,
    Ipv6ToIpv4,
    Ipv4NatPppoe,
    DsliteRoutedEncp,
    DsliteNatEncp,
    DsliteNatDecp,
}

impl RecipeId {
    pub const COUNT: usize = 54;

    /// Every recipe, in id order. This is also the bring-up order.
    pub const ALL: [RecipeId; Self::COUNT] = [
        Self::NoMod,
        Self::HdrRplc,
        Self::Ipv4Routed,
        Self::Ipv4Nat,
        Self::Ipv4Napt,
        Self::Ipv6Routed,
        Self::Ipv4RoutedPppoe,
        Self::Ipv4NaptPppoe,
        Self::Ipv6RoutedPppoe,
        Self::Ipv4HdrRplc,
        Self::Ipv6HdrRplc,
        Self::Ipv4UdpHdrRplc,
        Self::Ipv6UdpHdrRplc,
        Self::Ipv4InIpv4Encp,
        Self::Ipv6InIpv6Encp,
        Self::DsliteEncp,
        Self::SixrdEncp,
        Self::DsliteDecp,
        Self::Ipv6TunnDecp,
        Self::Ipv4TunnDecp,
        Self::GreIpv4OverIpv4Encp,
        Self::GreIpv6OverIpv4Encp,
        Self::GreIpv4OverIpv6Encp,
        Self::GreIpv6OverIpv6Encp,
        Self::EogreIpv4Encp,
        Self::EogreIpv6Encp,
        Self::GreIpv4Decp,
        Self::GreIpv6Decp,
        Self::EogreDecp,
        Self::L2tpIpv4OverIpv4Encp,
        Self::L2tpIpv6OverIpv4Encp,
        Self::L2tpIpv4OverIpv6Encp,
        Self::L2tpIpv6OverIpv6Encp,
        Self::L2tpIpv4Decp,
        Self::L2tpIpv6Decp,
        Self::VxlanIpv4Encp,
        Self::VxlanIpv4CsumEncp,
        Self::VxlanIpv6Encp,
        Self::VxlanDecp,
        Self::UdpIpv4Encp,
        Self::UdpIpv4CsumEncp,
        Self::UdpIpv6Encp,
        Self::UdpIpv4Decp,
        Self::UdpIpv6Decp,
        Self::EspIpv4TunnEncp,
        Self::EspIpv6TunnEncp,
        Self::EspIpv4TrnsEncp,
        Self::EspIpv6TrnsEncp,
        Self::Ipv4ToIpv6,
        Self::Ipv6ToIpv4,
        Self::Ipv4NatPppoe,
        Self::DsliteRoutedEncp,
        Self::DsliteNatEncp,
        Self::DsliteNatDecp,
    ];

    /// The recipe memory slot and session id of this recipe.
    pub const fn raw(self) -> u8 {
        self as u8
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(usize::from(raw)).copied()
    }

    pub const fn name(self) -> &'static str {
        RECIPE_NAMES[self as usize]
    }
}

// Recipe ids must never collide with the reserved ids.
const _: () = assert!(RecipeId::COUNT <= RECIPE_NOP as usize);

const RECIPE_NAMES: [&str; RecipeId::COUNT] = [
    "no modification",
    "L2 header replace",
    "IPv4 routed",
    "IPv4 NAT",
    "IPv4 NAPT",
    "IPv6 routed",
    "IPv4 routed over PPPoE",
    "IPv4 NAPT over PPPoE",
    "IPv6 routed over PPPoE",
    "IPv4 header replace",
    "IPv6 header replace",
    "IPv4/UDP header replace",
    "IPv6/UDP header replace",
    "IPv4-over-IPv4 encapsulation",
    "IPv6-over-IPv6 encapsulation",
    "IPv4-over-IPv6 encapsulation",
    "IPv6-over-IPv4 encapsulation",
    "IPv4-over-IPv6 decapsulation",
    "IPv6 tunnel decapsulation",
    "IPv4 tunnel decapsulation",
    "IPv4-over-GRE-over-IPv4 encapsulation",
    "IPv6-over-GRE-over-IPv4 encapsulation",
    "IPv4-over-GRE-over-IPv6 encapsulation",
    "IPv6-over-GRE-over-IPv6 encapsulation",
    "Ethernet-over-GRE-over-IPv4 encapsulation",
    "Ethernet-over-GRE-over-IPv6 encapsulation",
    "GRE decapsulation, inner IPv4",
    "GRE decapsulation, inner IPv6",
    "Ethernet-over-GRE decapsulation",
    "IPv4-over-L2TP-over-IPv4 encapsulation",
    "IPv6-over-L2TP-over-IPv4 encapsulation",
    "IPv4-over-L2TP-over-IPv6 encapsulation",
    "IPv6-over-L2TP-over-IPv6 encapsulation",
    "L2TP decapsulation, inner IPv4",
    "L2TP decapsulation, inner IPv6",
    "VXLAN-over-IPv4 encapsulation",
    "VXLAN-over-IPv4 encapsulation with UDP checksum",
    "VXLAN-over-IPv6 encapsulation",
    "VXLAN decapsulation",
    "IP-over-UDP-over-IPv4 encapsulation",
    "IP-over-UDP-over-IPv4 encapsulation with UDP checksum",
    "IP-over-UDP-over-IPv6 encapsulation",
    "UDP decapsulation, inner IPv4",
    "UDP decapsulation, inner IPv6",
    "ESP tunnel mode IPv4 encapsulation",
    "ESP tunnel mode IPv6 encapsulation",
    "ESP transport mode IPv4",
    "ESP transport mode IPv6",
    "IPv4-to-IPv6 translation",
    "IPv6-to-IPv4 translation",
    "IPv4 NAT over PPPoE",
    "IPv4-over-IPv6 encapsulation without NAT",
    "IPv4-over-IPv6 encapsulation with address NAT",
    "IPv4-over-IPv6 decapsulation with address NAT",
];

/// Return the name of the recipe with the given raw id.
///
/// This is total over `u8`: the reserved ids have their own names and
/// every other value outside the recipe range is reported as
/// invalid.
pub fn recipe_name(raw: u8) -> &'static str {
    match raw {
        RECIPE_NOP => "no-operation",
        _ => match RecipeId::from_raw(raw) {
            Some(id) => id.name(),
            None => "invalid",
        },
    }
}

impl Display for RecipeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for RecipeId {
    type Err = String;

    /// Parse either a raw id or a recipe name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(raw) = s.parse::<u8>() {
            return Self::from_raw(raw)
                .ok_or_else(|| format!("no recipe with id {}", raw));
        }

        Self::ALL
            .iter()
            .find(|id| id.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown recipe: {}", s))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn all_is_in_id_order() {
        for (i, id) in RecipeId::ALL.iter().enumerate() {
            assert_eq!(id.raw() as usize, i);
            assert_eq!(RecipeId::from_raw(i as u8), Some(*id));
        }
    }

    #[test]
    fn recipe_name_is_total() {
        assert_eq!(recipe_name(RECIPE_NOP), "no-operation");
        assert_eq!(recipe_name(RECIPE_INVALID), "invalid");
        assert_eq!(recipe_name(RecipeId::Ipv4Napt.raw()), "IPv4 NAPT");
        for raw in RecipeId::COUNT as u8..RECIPE_NOP {
            assert_eq!(recipe_name(raw), "invalid");
        }
    }

    #[test]
    fn names_are_unique() {
        for (i, a) in RecipeId::ALL.iter().enumerate() {
            for b in &RecipeId::ALL[i + 1..] {
                assert_ne!(a.name(), b.name());
            }
        }
    }

    #[test]
    fn parse_recipe() {
        assert_eq!("3".parse::<RecipeId>(), Ok(RecipeId::Ipv4Nat));
        assert_eq!("ipv6 routed".parse::<RecipeId>(), Ok(RecipeId::Ipv6Routed));
        assert_eq!(
            "ipv4 nat over pppoe".parse::<RecipeId>(),
            Ok(RecipeId::Ipv4NatPppoe)
        );
        assert_eq!("53".parse::<RecipeId>(), Ok(RecipeId::DsliteNatDecp));
        assert!("200".parse::<RecipeId>().is_err());
        assert!("teleport".parse::<RecipeId>().is_err());
    }
}
