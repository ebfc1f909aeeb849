// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Types exchanged with administrative consumers: dumps of committed
//! recipes and of the selection catalog.

use super::API_VERSION;
use super::flag::ModRequirement;
use super::recipe::RecipeId;
use alloc::vec::Vec;
use serde::Deserialize;
use serde::Serialize;

/// The committed instruction words of one recipe.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RecipeDump {
    pub id: RecipeId,
    pub words: Vec<u64>,
}

/// A full copy of recipe memory, as written at bring-up.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RecipeImage {
    pub api_version: u64,
    pub recipes: Vec<RecipeDump>,
}

impl RecipeImage {
    pub fn new(recipes: Vec<RecipeDump>) -> Self {
        Self { api_version: API_VERSION, recipes }
    }
}

/// One row of the selection catalog.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CatalogEntryDump {
    pub req: ModRequirement,
    pub recipe: RecipeId,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DumpCatalogResp {
    pub entries: Vec<CatalogEntryDump>,
}
