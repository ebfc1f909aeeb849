// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The recipe catalog.
//!
//! Every modification the hardware can perform is listed here as the
//! exact requirement bitmap the classifier produces for it. Lookup is
//! by equality: a requirement with one flag more or less than an
//! entry does not match it. Several bitmaps may share a recipe, as
//! flags like `PPPOE_DECP` or `ESP_BYPASS` change nothing the recipe
//! does beyond what the template already covers. Flags that do
//! change what a recipe does select a different one: NAT rows without
//! `L4_NAPT` never copy ports, and the checksummed UDP encapsulations
//! name the `IPV4` inner family their checksum derivation relies on.
//!
//! No two entries may carry the same bitmap. This is checked when the
//! crate is compiled.

use modrcp_api::CatalogEntryDump;
use modrcp_api::DumpCatalogResp;
use modrcp_api::ModFlag;
use modrcp_api::ModFlag::*;
use modrcp_api::ModRequirement;
use modrcp_api::RecipeId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CatalogEntry {
    pub req: ModRequirement,
    pub recipe: RecipeId,
}

const fn entry(flags: &[ModFlag], recipe: RecipeId) -> CatalogEntry {
    let mut req = ModRequirement::empty();
    let mut i = 0;
    while i < flags.len() {
        req = req.with(flags[i]);
        i += 1;
    }
    CatalogEntry { req, recipe }
}

#[rustfmt::skip]
pub const CATALOG: [CatalogEntry; 100] = [
    entry(&[], RecipeId::NoMod),
    entry(&[HdrRplcL2], RecipeId::HdrRplc),

    entry(&[Ipv4Ttl], RecipeId::Ipv4Routed),
    entry(&[Ipv4, Ipv4Ttl], RecipeId::Ipv4Routed),
    entry(&[PppoeDecp, Ipv4Ttl], RecipeId::Ipv4Routed),
    entry(&[EspBypass, Ipv4Ttl], RecipeId::Ipv4Routed),
    entry(&[Ipv4Nat], RecipeId::Ipv4Nat),
    entry(&[Ipv4Nat, Ipv4Ttl], RecipeId::Ipv4Nat),
    entry(&[PppoeDecp, Ipv4Nat], RecipeId::Ipv4Nat),
    entry(&[PppoeDecp, Ipv4Nat, Ipv4Ttl], RecipeId::Ipv4Nat),
    entry(&[Ipv4Nat, L4Napt], RecipeId::Ipv4Napt),
    entry(&[Ipv4Nat, L4Napt, Ipv4Ttl], RecipeId::Ipv4Napt),
    entry(&[PppoeDecp, Ipv4Nat, L4Napt], RecipeId::Ipv4Napt),
    entry(&[PppoeDecp, Ipv4Nat, L4Napt, Ipv4Ttl], RecipeId::Ipv4Napt),
    entry(&[Ipv6Hopl], RecipeId::Ipv6Routed),
    entry(&[Ipv6, Ipv6Hopl], RecipeId::Ipv6Routed),
    entry(&[PppoeDecp, Ipv6Hopl], RecipeId::Ipv6Routed),
    entry(&[EspBypass, Ipv6Hopl], RecipeId::Ipv6Routed),

    entry(&[PppoeEncp, Ipv4Ttl], RecipeId::Ipv4RoutedPppoe),
    entry(&[PppoeEncp, Ipv4Nat], RecipeId::Ipv4NatPppoe),
    entry(&[PppoeEncp, Ipv4Nat, Ipv4Ttl], RecipeId::Ipv4NatPppoe),
    entry(&[PppoeEncp, Ipv4Nat, L4Napt], RecipeId::Ipv4NaptPppoe),
    entry(&[PppoeEncp, Ipv4Nat, L4Napt, Ipv4Ttl], RecipeId::Ipv4NaptPppoe),
    entry(&[PppoeEncp, Ipv6Hopl], RecipeId::Ipv6RoutedPppoe),

    entry(&[HdrRplcL3, NhdrIpv4], RecipeId::Ipv4HdrRplc),
    entry(&[HdrRplcL3, Ipv4, NhdrIpv4], RecipeId::Ipv4HdrRplc),
    entry(&[HdrRplcL3, NhdrIpv6], RecipeId::Ipv6HdrRplc),
    entry(&[HdrRplcL3, Ipv6, NhdrIpv6], RecipeId::Ipv6HdrRplc),
    entry(&[HdrRplcL3, Ipv4, NhdrIpv6], RecipeId::Ipv4ToIpv6),
    entry(&[HdrRplcL3, Ipv6, NhdrIpv4], RecipeId::Ipv6ToIpv4),
    entry(&[HdrRplcL4, NhdrIpv4], RecipeId::Ipv4UdpHdrRplc),
    entry(&[HdrRplcL4, NhdrIpv6], RecipeId::Ipv6UdpHdrRplc),

    entry(&[Ipv4, NhdrIpv4], RecipeId::Ipv4InIpv4Encp),
    entry(&[Ipv4, NhdrIpv4, Ipv4Ttl], RecipeId::Ipv4InIpv4Encp),
    entry(&[Ipv6, NhdrIpv6], RecipeId::Ipv6InIpv6Encp),
    entry(&[Ipv6, NhdrIpv6, Ipv6Hopl], RecipeId::Ipv6InIpv6Encp),
    entry(&[DsliteEncp], RecipeId::DsliteRoutedEncp),
    entry(&[DsliteEncp, Ipv4Ttl], RecipeId::DsliteRoutedEncp),
    entry(&[DsliteEncp, Ipv4Nat], RecipeId::DsliteNatEncp),
    entry(&[DsliteEncp, Ipv4Nat, L4Napt], RecipeId::DsliteEncp),
    entry(&[DsliteEncp, Ipv4Nat, Ipv4Ttl], RecipeId::DsliteNatEncp),
    entry(&[DsliteEncp, Ipv4Nat, L4Napt, Ipv4Ttl], RecipeId::DsliteEncp),
    entry(&[SixrdEncp], RecipeId::SixrdEncp),
    entry(&[SixrdEncp, Ipv6Hopl], RecipeId::SixrdEncp),
    entry(&[DsliteDecp], RecipeId::Ipv4TunnDecp),
    entry(&[DsliteDecp, Ipv4Ttl], RecipeId::Ipv4TunnDecp),
    entry(&[DsliteDecp, Ipv4Nat], RecipeId::DsliteNatDecp),
    entry(&[DsliteDecp, Ipv4Nat, Ipv4Ttl], RecipeId::DsliteNatDecp),
    entry(&[DsliteDecp, Ipv4Nat, L4Napt], RecipeId::DsliteDecp),
    entry(&[DsliteDecp, Ipv4Nat, L4Napt, Ipv4Ttl], RecipeId::DsliteDecp),
    entry(&[SixrdDecp], RecipeId::Ipv6TunnDecp),
    entry(&[SixrdDecp, Ipv6Hopl], RecipeId::Ipv6TunnDecp),

    entry(&[GreEncp, Ipv4, NhdrIpv4], RecipeId::GreIpv4OverIpv4Encp),
    entry(&[GreEncp, Ipv4, NhdrIpv4, Ipv4Ttl], RecipeId::GreIpv4OverIpv4Encp),
    entry(&[GreEncp, Ipv6, NhdrIpv4], RecipeId::GreIpv6OverIpv4Encp),
    entry(&[GreEncp, Ipv6, NhdrIpv4, Ipv6Hopl], RecipeId::GreIpv6OverIpv4Encp),
    entry(&[GreEncp, Ipv4, NhdrIpv6], RecipeId::GreIpv4OverIpv6Encp),
    entry(&[GreEncp, Ipv4, NhdrIpv6, Ipv4Ttl], RecipeId::GreIpv4OverIpv6Encp),
    entry(&[GreEncp, Ipv6, NhdrIpv6], RecipeId::GreIpv6OverIpv6Encp),
    entry(&[GreEncp, Ipv6, NhdrIpv6, Ipv6Hopl], RecipeId::GreIpv6OverIpv6Encp),
    entry(&[GreEncp, NhdrIpv4], RecipeId::EogreIpv4Encp),
    entry(&[GreEncp, NhdrIpv6], RecipeId::EogreIpv6Encp),
    entry(&[GreDecp, Ipv4], RecipeId::GreIpv4Decp),
    entry(&[GreDecp, Ipv4, Ipv4Ttl], RecipeId::GreIpv4Decp),
    entry(&[GreDecp, Ipv6], RecipeId::GreIpv6Decp),
    entry(&[GreDecp, Ipv6, Ipv6Hopl], RecipeId::GreIpv6Decp),
    entry(&[GreDecp], RecipeId::EogreDecp),

    entry(&[L2tpEncp, Ipv4, NhdrIpv4], RecipeId::L2tpIpv4OverIpv4Encp),
    entry(&[L2tpEncp, Ipv4, NhdrIpv4, Ipv4Ttl], RecipeId::L2tpIpv4OverIpv4Encp),
    entry(&[L2tpEncp, Ipv6, NhdrIpv4], RecipeId::L2tpIpv6OverIpv4Encp),
    entry(&[L2tpEncp, Ipv6, NhdrIpv4, Ipv6Hopl], RecipeId::L2tpIpv6OverIpv4Encp),
    entry(&[L2tpEncp, Ipv4, NhdrIpv6], RecipeId::L2tpIpv4OverIpv6Encp),
    entry(&[L2tpEncp, Ipv4, NhdrIpv6, Ipv4Ttl], RecipeId::L2tpIpv4OverIpv6Encp),
    entry(&[L2tpEncp, Ipv6, NhdrIpv6], RecipeId::L2tpIpv6OverIpv6Encp),
    entry(&[L2tpEncp, Ipv6, NhdrIpv6, Ipv6Hopl], RecipeId::L2tpIpv6OverIpv6Encp),
    entry(&[L2tpDecp, Ipv4], RecipeId::L2tpIpv4Decp),
    entry(&[L2tpDecp, Ipv4, Ipv4Ttl], RecipeId::L2tpIpv4Decp),
    entry(&[L2tpDecp, Ipv6], RecipeId::L2tpIpv6Decp),
    entry(&[L2tpDecp, Ipv6, Ipv6Hopl], RecipeId::L2tpIpv6Decp),

    entry(&[VxlanEncp, NhdrIpv4, UdpCsumOff], RecipeId::VxlanIpv4Encp),
    entry(&[VxlanEncp, Ipv4, NhdrIpv4], RecipeId::VxlanIpv4CsumEncp),
    entry(&[VxlanEncp, NhdrIpv6], RecipeId::VxlanIpv6Encp),
    entry(&[VxlanDecp], RecipeId::VxlanDecp),
    entry(&[UdpEncp, NhdrIpv4, UdpCsumOff], RecipeId::UdpIpv4Encp),
    entry(&[UdpEncp, Ipv4, NhdrIpv4], RecipeId::UdpIpv4CsumEncp),
    entry(&[UdpEncp, NhdrIpv6], RecipeId::UdpIpv6Encp),
    entry(&[UdpDecp, Ipv4], RecipeId::UdpIpv4Decp),
    entry(&[UdpDecp, Ipv4, Ipv4Ttl], RecipeId::UdpIpv4Decp),
    entry(&[UdpDecp, Ipv6], RecipeId::UdpIpv6Decp),
    entry(&[UdpDecp, Ipv6, Ipv6Hopl], RecipeId::UdpIpv6Decp),

    entry(&[EspTunnEncp, NhdrIpv4], RecipeId::EspIpv4TunnEncp),
    entry(&[EspTunnEncp, Ipv4, NhdrIpv4], RecipeId::EspIpv4TunnEncp),
    entry(&[EspTunnEncp, Ipv6, NhdrIpv4], RecipeId::EspIpv4TunnEncp),
    entry(&[EspTunnEncp, NhdrIpv6], RecipeId::EspIpv6TunnEncp),
    entry(&[EspTunnEncp, Ipv4, NhdrIpv6], RecipeId::EspIpv6TunnEncp),
    entry(&[EspTunnEncp, Ipv6, NhdrIpv6], RecipeId::EspIpv6TunnEncp),
    entry(&[EspTrnsEncp, Ipv4], RecipeId::EspIpv4TrnsEncp),
    entry(&[EspTrnsEncp, Ipv4, Ipv4Ttl], RecipeId::EspIpv4TrnsEncp),
    entry(&[EspTrnsEncp, Ipv6], RecipeId::EspIpv6TrnsEncp),
    entry(&[EspTrnsEncp, Ipv6, Ipv6Hopl], RecipeId::EspIpv6TrnsEncp),
];

const fn bitmaps_unique(entries: &[CatalogEntry]) -> bool {
    let mut i = 0;
    while i < entries.len() {
        let mut j = i + 1;
        while j < entries.len() {
            if entries[i].req.bits() == entries[j].req.bits() {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    bitmaps_unique(&CATALOG),
    "two catalog entries share a requirement bitmap"
);

/// No catalog entry matches the requirement.
///
/// The flow cannot be offloaded and must take the software path.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("no recipe for modification {}", .req.names())]
pub struct UnsupportedModification {
    pub req: ModRequirement,
}

/// Map `req` to the recipe performing exactly that modification.
pub fn select(
    req: ModRequirement,
) -> Result<RecipeId, UnsupportedModification> {
    CATALOG
        .iter()
        .find(|e| e.req == req)
        .map(|e| e.recipe)
        .ok_or(UnsupportedModification { req })
}

pub fn dump() -> DumpCatalogResp {
    DumpCatalogResp {
        entries: CATALOG
            .iter()
            .map(|e| CatalogEntryDump { req: e.req, recipe: e.recipe })
            .collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_recipe_is_reachable() {
        for id in RecipeId::ALL {
            assert!(
                CATALOG.iter().any(|e| e.recipe == id),
                "{id} has no catalog entry"
            );
        }
    }

    #[test]
    fn checksummed_udp_encap_needs_ipv4_inner() {
        use ModRequirement as R;

        for encap in [R::UDP_ENCP, R::VXLAN_ENCP] {
            let blind = encap | R::NHDR_IPV4;
            assert!(select(blind).is_err());
            assert!(select(blind | R::IPV6).is_err());
            assert!(select(blind | R::UDP_CSUM_OFF).is_ok());
        }
        assert_eq!(
            select(R::UDP_ENCP | R::IPV4 | R::NHDR_IPV4),
            Ok(RecipeId::UdpIpv4CsumEncp)
        );
        assert_eq!(
            select(R::VXLAN_ENCP | R::IPV4 | R::NHDR_IPV4),
            Ok(RecipeId::VxlanIpv4CsumEncp)
        );
    }

    #[test]
    fn extra_flag_does_not_match() {
        let req = ModRequirement::IPV4_NAT | ModRequirement::UDP_CSUM_OFF;
        let err = select(req).unwrap_err();
        assert_eq!(err.req, req);
        assert_eq!(
            err.to_string(),
            "no recipe for modification {IPV4_NAT, UDP_CSUM_OFF}"
        );
    }
}
