// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Recipe memory.
//!
//! The modifier executes recipes out of a table of fixed-size slots,
//! one per recipe id. Bring-up writes each slot once; after that the
//! table is only read. [`RecipeMem`] is the interface to that table,
//! and [`SimRecipeMem`] an in-process implementation of it.

use super::program::Program;
use super::program::RECIPE_MAX_INSNS;
use modrcp_api::RecipeId;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum MemError {
    #[error("recipe {id}: slot {} already committed", id.raw())]
    SlotOccupied { id: RecipeId },

    #[error("recipe {id}: {len} words exceed the slot size of {max}")]
    ProgramTooLarge { id: RecipeId, len: usize, max: usize },

    #[error("recipe {id}: no slot {} in a memory of {slots}", id.raw())]
    BadSlot { id: RecipeId, slots: usize },
}

/// The geometry of recipe memory.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecipeMemCfg {
    /// Number of recipe slots.
    pub slots: usize,
    /// Instruction words per slot.
    pub slot_words: usize,
}

impl Default for RecipeMemCfg {
    fn default() -> Self {
        Self { slots: 64, slot_words: RECIPE_MAX_INSNS }
    }
}

pub trait RecipeMem {
    fn cfg(&self) -> RecipeMemCfg;

    /// Write `prog` to the slot of recipe `id`.
    fn commit(&mut self, id: RecipeId, prog: &Program) -> Result<(), MemError>;

    /// The program committed for recipe `id`, if any.
    fn program(&self, id: RecipeId) -> Option<&Program>;
}

impl<M: RecipeMem + ?Sized> RecipeMem for &mut M {
    fn cfg(&self) -> RecipeMemCfg {
        (**self).cfg()
    }

    fn commit(&mut self, id: RecipeId, prog: &Program) -> Result<(), MemError> {
        (**self).commit(id, prog)
    }

    fn program(&self, id: RecipeId) -> Option<&Program> {
        (**self).program(id)
    }
}

/// Recipe memory held in process, with write-once slots.
#[derive(Clone, Debug)]
pub struct SimRecipeMem {
    cfg: RecipeMemCfg,
    slots: Vec<Option<Program>>,
}

impl SimRecipeMem {
    pub fn new(cfg: RecipeMemCfg) -> Self {
        Self { cfg, slots: vec![None; cfg.slots] }
    }

    /// The number of committed slots.
    pub fn committed(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for SimRecipeMem {
    fn default() -> Self {
        Self::new(RecipeMemCfg::default())
    }
}

impl RecipeMem for SimRecipeMem {
    fn cfg(&self) -> RecipeMemCfg {
        self.cfg
    }

    fn commit(&mut self, id: RecipeId, prog: &Program) -> Result<(), MemError> {
        let slots = self.slots.len();
        let slot = self
            .slots
            .get_mut(usize::from(id.raw()))
            .ok_or(MemError::BadSlot { id, slots })?;

        if slot.is_some() {
            return Err(MemError::SlotOccupied { id });
        }

        if prog.len() > self.cfg.slot_words {
            return Err(MemError::ProgramTooLarge {
                id,
                len: prog.len(),
                max: self.cfg.slot_words,
            });
        }

        *slot = Some(prog.clone());
        Ok(())
    }

    fn program(&self, id: RecipeId) -> Option<&Program> {
        self.slots.get(usize::from(id.raw()))?.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::recipe;

    #[test]
    fn slots_are_write_once() {
        let mut mem = SimRecipeMem::default();
        let prog = recipe::build(RecipeId::Ipv4Nat).unwrap();
        mem.commit(RecipeId::Ipv4Nat, &prog).unwrap();
        assert_eq!(mem.program(RecipeId::Ipv4Nat), Some(&prog));
        assert_eq!(
            mem.commit(RecipeId::Ipv4Nat, &prog),
            Err(MemError::SlotOccupied { id: RecipeId::Ipv4Nat })
        );
        assert_eq!(mem.committed(), 1);
    }

    #[test]
    fn geometry_is_enforced() {
        let prog = recipe::build(RecipeId::Ipv4Napt).unwrap();

        let mut small =
            SimRecipeMem::new(RecipeMemCfg { slots: 2, ..Default::default() });
        assert_eq!(
            small.commit(RecipeId::Ipv4Napt, &prog),
            Err(MemError::BadSlot { id: RecipeId::Ipv4Napt, slots: 2 })
        );

        let mut short = SimRecipeMem::new(RecipeMemCfg {
            slot_words: 4,
            ..Default::default()
        });
        assert!(matches!(
            short.commit(RecipeId::Ipv4Napt, &prog),
            Err(MemError::ProgramTooLarge { max: 4, .. })
        ));
        assert!(short.program(RecipeId::Ipv4Napt).is_none());
    }

    #[test]
    fn cfg_from_toml_defaults_missing_fields() {
        let cfg: RecipeMemCfg = toml::from_str("slots = 50").unwrap();
        assert_eq!(cfg, RecipeMemCfg { slots: 50, slot_words: 64 });
        assert!(toml::from_str::<RecipeMemCfg>("depth = 1").is_err());
    }
}
