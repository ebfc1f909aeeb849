// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Routed traffic: a new L2 header, the IP header patched in place,
//! and optionally a PPPoE session header in between.

use super::IpFamily;
use super::Nat;
use super::ip_len;
use super::patch_ip;
use crate::engine::builder::BuildError;
use crate::engine::builder::RecipeBuilder;
use crate::engine::lane::Lane;
use crate::engine::layout::Layer;
use crate::engine::layout::NhdrLayer;
use crate::engine::layout::StripOffset;
use crate::engine::layout::pppoe;
use crate::engine::primitives::LenChain;
use crate::engine::program::Program;
use crate::engine::regs::Width;

pub(super) fn no_mod() -> Result<Program, BuildError> {
    RecipeBuilder::new().finish()
}

pub(super) fn l2_hdr_rplc() -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL3, 0)?;
    b.finish()
}

/// Write the PPPoE payload length of a template carrying a PPPoE
/// session header in front of the IP packet at `L3`.
fn pppoe_len(
    b: &mut RecipeBuilder,
    family: IpFamily,
) -> Result<(), BuildError> {
    let mut lb = b.lane(Lane::B);
    let len = ip_len(&mut lb, family, Layer::L3)?;
    let plen = lb.alloc("pppoe_len", Width::W16)?;
    LenChain::start(len).add(&mut lb, plen, pppoe::PPP_PROTO_LEN)?;
    lb.store_nhdr(plen, pppoe::LEN.nhdr(NhdrLayer::Shim))?;
    lb.free(plen);
    lb.free(len);
    Ok(())
}

pub(super) fn ipv4_routed(
    nat: Nat,
    pppoe: bool,
) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL3, 0)?;
    patch_ip(&mut b, IpFamily::V4, Layer::L3, nat)?;
    if pppoe {
        pppoe_len(&mut b, IpFamily::V4)?;
    }
    b.finish()
}

pub(super) fn ipv6_routed(pppoe: bool) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL3, 0)?;
    patch_ip(&mut b, IpFamily::V6, Layer::L3, Nat::None)?;
    if pppoe {
        pppoe_len(&mut b, IpFamily::V6)?;
    }
    b.finish()
}
