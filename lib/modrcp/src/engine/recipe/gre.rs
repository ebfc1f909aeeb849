// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! GRE tunnels. With no inner family the payload is the whole L2
//! frame (EoGRE) and nothing inside it is touched.

use super::IpFamily;
use super::Nat;
use super::ip_len;
use super::nhdr_ip;
use super::patch_ip;
use crate::engine::builder::BuildError;
use crate::engine::builder::RecipeBuilder;
use crate::engine::lane::Lane;
use crate::engine::layout::GRE_HDR_LEN;
use crate::engine::layout::Layer;
use crate::engine::layout::StripOffset;
use crate::engine::layout::desc;
use crate::engine::primitives::LenChain;
use crate::engine::program::Program;
use crate::engine::regs::Width;

pub(super) fn encap(
    inner: Option<IpFamily>,
    outer: IpFamily,
) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();

    let strip = match inner {
        Some(_) => StripOffset::UpToL3,
        None => StripOffset::None,
    };
    b.replace_hdr(strip, 0)?;
    if let Some(family) = inner {
        patch_ip(&mut b, family, Layer::L3, Nat::None)?;
    }

    let mut lb = b.lane(Lane::B);
    let len = match inner {
        Some(family) => ip_len(&mut lb, family, Layer::L3)?,
        None => lb.load_pkt("frame_len", desc::FRAME_LEN.at(Layer::Desc))?,
    };
    let gre_len = lb.alloc("gre_len", Width::W16)?;
    LenChain::start(len).add(&mut lb, gre_len, GRE_HDR_LEN)?;
    nhdr_ip(&mut lb, outer, gre_len)?;
    lb.free(gre_len);
    lb.free(len);

    b.finish()
}

pub(super) fn decap(inner: Option<IpFamily>) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL4, GRE_HDR_LEN as u8)?;
    if let Some(family) = inner {
        patch_ip(&mut b, family, Layer::InnerL3, Nat::None)?;
    }
    b.finish()
}
