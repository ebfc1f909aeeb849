// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Property tests of the checksum and length arithmetic the recipes
//! are built on.

use modrcp::engine::checksum::Checksum;
use modrcp::engine::checksum::HeaderChecksum;
use modrcp::engine::isa::AluOp;
use modrcp::engine::primitives::host::LenStep;
use modrcp::engine::primitives::host::csum16_add;
use modrcp::engine::primitives::host::csum16_sub;
use modrcp::engine::primitives::host::length_chain;
use modrcp::engine::regs::Width;
use proptest::prelude::*;

#[derive(Clone, Copy, Debug)]
enum Fold {
    Add(u16),
    Sub(u16),
}

fn apply(csum: u16, folds: &[Fold]) -> u16 {
    folds.iter().fold(csum, |acc, fold| match fold {
        Fold::Add(d) => csum16_add(acc, *d),
        Fold::Sub(d) => csum16_sub(acc, *d),
    })
}

fn fold() -> impl Strategy<Value = Fold> {
    prop_oneof![
        any::<u16>().prop_map(Fold::Add),
        any::<u16>().prop_map(Fold::Sub),
    ]
}

fn folds_and_shuffle() -> impl Strategy<Value = (Vec<Fold>, Vec<Fold>)> {
    prop::collection::vec(fold(), 0..16).prop_flat_map(|folds| {
        (Just(folds.clone()), Just(folds).prop_shuffle())
    })
}

/// Equality of one's complement values, where `0x0000` and `0xFFFF`
/// are both zero.
fn ones_eq(a: u16, b: u16) -> bool {
    a % 0xFFFF == b % 0xFFFF
}

#[rustfmt::skip]
const IPV4_HDR: [u8; 20] = [
    0x45, 0x00, 0x00, 0x54, 0x1c, 0x46, 0x40, 0x00,
    0x40, 0x01, 0x00, 0x00, 0xac, 0x10, 0x0a, 0x63,
    0xac, 0x10, 0x0a, 0x0c,
];

fn header_csum(hdr: &[u8; 20]) -> u16 {
    let mut hdr = *hdr;
    hdr[10..12].fill(0);
    HeaderChecksum::from(Checksum::compute(&hdr)).value()
}

proptest! {
    #[test]
    fn fold_order_is_irrelevant(
        start in any::<u16>(),
        (folds, shuffled) in folds_and_shuffle(),
    ) {
        prop_assert_eq!(apply(start, &folds), apply(start, &shuffled));
    }

    #[test]
    fn alu_matches_host_folds(a in any::<u16>(), b in any::<u16>()) {
        let (a32, b32) = (u32::from(a), u32::from(b));
        prop_assert_eq!(
            AluOp::CsumAdd.apply(a32, b32, Width::W16),
            u32::from(csum16_add(a, b))
        );
        prop_assert_eq!(
            AluOp::CsumSub.apply(a32, b32, Width::W16),
            u32::from(csum16_sub(a, b))
        );
    }

    #[test]
    fn ttl_fold_matches_recompute(ttl in 1u8.., delta in 0u8..4) {
        prop_assume!(delta <= ttl);
        let mut hdr = IPV4_HDR;
        hdr[8] = ttl;
        let hc = header_csum(&hdr);

        hdr[8] = ttl - delta;
        let folded = csum16_add(hc, u16::from(delta) << 8);
        prop_assert!(ones_eq(folded, header_csum(&hdr)));
    }

    #[test]
    fn new_length_fold_matches_recompute(len in 20u16..1500) {
        let mut hdr = IPV4_HDR;
        hdr[2..4].fill(0);
        let hc = header_csum(&hdr);

        hdr[2..4].copy_from_slice(&len.to_be_bytes());
        prop_assert!(ones_eq(csum16_sub(hc, len), header_csum(&hdr)));
    }

    #[test]
    fn length_chain_accumulates(
        inner in 0u16..9000,
        steps in prop::collection::vec(0u16..64, 0..8),
    ) {
        let steps: Vec<LenStep> =
            steps.into_iter().map(LenStep::Add).collect();
        let lens = length_chain(inner, &steps);
        prop_assert_eq!(lens.len(), steps.len() + 1);
        prop_assert_eq!(lens[0], inner);
        for (pair, step) in lens.windows(2).zip(&steps) {
            let LenStep::Add(n) = step else { unreachable!() };
            prop_assert_eq!(pair[1], pair[0] + n);
        }
    }
}
