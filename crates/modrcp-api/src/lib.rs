// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

pub mod cmd;
pub mod flag;
pub mod recipe;

pub use cmd::*;
pub use flag::*;
pub use recipe::*;

/// The overall version of the API. Anytime a type in this crate is
/// added, removed, or modified, this number should increment. It is
/// stamped into recipe images so that a reader can tell whether it
/// was built against the same flag and recipe numbering.
pub const API_VERSION: u64 = 3;

/// Major version of the modifier recipe package.
pub const MAJOR_VERSION: u64 = 0;
