// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! IP-in-IP tunnels: plain 4in4 and 6in6, DS-Lite, and 6rd.

use super::IpFamily;
use super::Nat;
use super::ip_len;
use super::nhdr_ip;
use super::patch_ip;
use crate::engine::builder::BuildError;
use crate::engine::builder::RecipeBuilder;
use crate::engine::lane::Lane;
use crate::engine::layout::Layer;
use crate::engine::layout::StripOffset;
use crate::engine::program::Program;

/// Put an `outer` header in front of the `inner` packet, which is
/// patched in place first.
pub(super) fn encap(
    inner: IpFamily,
    outer: IpFamily,
    nat: Nat,
) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL3, 0)?;
    patch_ip(&mut b, inner, Layer::L3, nat)?;

    let mut lb = b.lane(Lane::B);
    let len = ip_len(&mut lb, inner, Layer::L3)?;
    nhdr_ip(&mut lb, outer, len)?;
    lb.free(len);

    b.finish()
}

/// Strip the outer header and patch the `inner` packet it carried.
pub(super) fn decap(inner: IpFamily, nat: Nat) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL4, 0)?;
    patch_ip(&mut b, inner, Layer::InnerL3, nat)?;
    b.finish()
}
