// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The recipe engine: the modifier's instruction set, the builder
//! which emits it, the recipes themselves, and their bring-up.
pub mod builder;
pub mod catalog;
pub mod checksum;
pub mod init;
pub mod isa;
pub mod lane;
pub mod layout;
pub mod memory;
pub mod primitives;
pub mod program;
pub mod recipe;
pub mod regs;
pub mod sideband;
pub mod verify;

pub use catalog::UnsupportedModification;
pub use catalog::select;
pub use init::InitError;
pub use init::RecipeEngine;
pub use memory::RecipeMem;
pub use memory::RecipeMemCfg;
pub use memory::SimRecipeMem;
