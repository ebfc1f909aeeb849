// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Recipe synthesis for the packet modifier.
//!
//! The modifier is a coprocessor in the packet pipeline which rewrites
//! headers by running a small micro-program (a recipe) per packet.
//! This crate holds the catalog mapping a flow's modification
//! requirement to a recipe, the builders emitting each recipe's
//! instructions, and the bring-up which commits them all to recipe
//! memory.

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub use modrcp_api as api;

pub mod engine;
pub mod print;
