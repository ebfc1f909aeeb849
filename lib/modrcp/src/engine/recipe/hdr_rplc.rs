// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Header replacement: the flow's L3 (and optionally UDP) header is
//! swapped for one taken from the template.

use super::IpFamily;
use super::nhdr_ip;
use super::update_l4_csum;
use crate::engine::builder::BuildError;
use crate::engine::builder::RecipeBuilder;
use crate::engine::lane::Lane;
use crate::engine::layout::Layer;
use crate::engine::layout::NhdrLayer;
use crate::engine::layout::SiField;
use crate::engine::layout::StripOffset;
use crate::engine::layout::desc;
use crate::engine::layout::udp;
use crate::engine::primitives::fold_add_nonzero;
use crate::engine::program::Program;

/// Replace L2 and L3. The L4 header stays, and its checksum takes the
/// sideband's pseudo header delta.
pub(super) fn l3(family: IpFamily) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();
    b.replace_hdr(StripOffset::UpToL4, 0)?;

    let mut lb = b.lane(Lane::B);
    let len = lb.load_pkt("l4_len", desc::L4_LEN.at(Layer::Desc))?;
    nhdr_ip(&mut lb, family, len)?;
    lb.free(len);

    update_l4_csum(&mut b.lane(Lane::A), Layer::L4Csum)?;
    b.finish()
}

/// Replace L2, L3 and the UDP header. The datagram length does not
/// change; the old UDP checksum is carried over to the new header with
/// the sideband delta folded in, and stays zero if it was zero.
pub(super) fn l4_udp(family: IpFamily) -> Result<Program, BuildError> {
    let mut b = RecipeBuilder::new();

    // The old header is gone after the replace.
    let mut lb = b.lane(Lane::B);
    let csum = lb.load_pkt_cmp("udp_csum", udp::CSUM.at(Layer::L4))?;

    b.replace_hdr(StripOffset::UpToL4, udp::HDR_LEN as u8)?;

    let mut lb = b.lane(Lane::B);
    let delta = lb.load_si("l4_csum_delta", SiField::L4_CSUM_DELTA)?;
    fold_add_nonzero(&mut lb, csum, delta)?;
    lb.store_nhdr(csum, udp::CSUM.nhdr(NhdrLayer::L4))?;
    lb.free(delta);
    lb.free(csum);

    let mut a = b.lane(Lane::A);
    let len = a.load_pkt("l4_len", desc::L4_LEN.at(Layer::Desc))?;
    a.store_nhdr(len, udp::LEN.nhdr(NhdrLayer::L4))?;
    nhdr_ip(&mut a, family, len)?;
    a.free(len);

    b.finish()
}
