// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Bring-up of the recipe engine.
//!
//! Every recipe is built and verified, and the memory checked for
//! room and free slots, before the first one is committed, so a
//! defect in any of them leaves recipe memory untouched. There is no
//! partial bring-up: the recipes form one fixed set, and a flow
//! selecting a missing recipe would fail in ways much harder to
//! diagnose than a refusal to start. Only the memory itself failing a
//! write midway can leave some slots committed.

use super::builder::BuildError;
use super::catalog;
use super::catalog::UnsupportedModification;
use super::memory::MemError;
use super::memory::RecipeMem;
use super::program::Program;
use super::recipe;
use super::verify::VerifyError;
use super::verify::verify;
use modrcp_api::ModRequirement;
use modrcp_api::RecipeDump;
use modrcp_api::RecipeId;
use modrcp_api::RecipeImage;
use slog::Logger;
use slog::debug;
use slog::error;
use slog::info;
use slog::o;
use slog::warn;
use thiserror::Error;

/// Why a recipe was refused.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum RecipeFault {
    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
}

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum InitError {
    #[error("recipe {recipe}: {source}")]
    BuildAbort { recipe: RecipeId, source: RecipeFault },

    #[error("recipe memory has {slots} slots, {need} recipes need one each")]
    TooFewSlots { slots: usize, need: usize },

    #[error(
        "recipe memory of {slots} slots x {slot_words} words cannot hold \
         recipe {recipe} ({len} words)"
    )]
    Config { recipe: RecipeId, len: usize, slots: usize, slot_words: usize },

    #[error(transparent)]
    Mem(#[from] MemError),
}

fn build_one(id: RecipeId) -> Result<Program, RecipeFault> {
    let prog = recipe::build(id)?;
    verify(&prog)?;
    Ok(prog)
}

/// The committed recipes, and selection over them.
pub struct RecipeEngine<M: RecipeMem> {
    mem: M,
    log: Logger,
}

impl<M: RecipeMem> RecipeEngine<M> {
    /// Build, verify and commit every recipe to `mem`, in id order.
    pub fn init(mut mem: M, log: &Logger) -> Result<Self, InitError> {
        let log = log.new(o!("component" => "recipe-engine"));
        let cfg = mem.cfg();

        if cfg.slots < RecipeId::COUNT {
            error!(log, "recipe memory too small"; "slots" => cfg.slots);
            return Err(InitError::TooFewSlots {
                slots: cfg.slots,
                need: RecipeId::COUNT,
            });
        }

        let mut built = Vec::with_capacity(RecipeId::COUNT);
        for id in RecipeId::ALL {
            let prog = build_one(id).map_err(|source| {
                error!(log, "recipe refused";
                    "recipe" => %id, "err" => %source);
                InitError::BuildAbort { recipe: id, source }
            })?;

            if prog.len() > cfg.slot_words {
                return Err(InitError::Config {
                    recipe: id,
                    len: prog.len(),
                    slots: cfg.slots,
                    slot_words: cfg.slot_words,
                });
            }

            debug!(log, "recipe built"; "recipe" => %id, "words" => prog.len());
            built.push((id, prog));
        }

        if let Some(id) =
            RecipeId::ALL.into_iter().find(|id| mem.program(*id).is_some())
        {
            return Err(MemError::SlotOccupied { id }.into());
        }

        for (n, (id, prog)) in built.iter().enumerate() {
            mem.commit(*id, prog).inspect_err(|e| {
                error!(log, "recipe memory partly committed";
                    "committed" => n, "err" => %e);
            })?;
        }

        info!(log, "recipes committed"; "count" => built.len());
        Ok(Self { mem, log })
    }

    /// Select the recipe for `req`, as [`catalog::select`] does,
    /// logging the requirement when there is none.
    pub fn select(
        &self,
        req: ModRequirement,
    ) -> Result<RecipeId, UnsupportedModification> {
        catalog::select(req).inspect_err(|_| {
            let flags = req.names();
            warn!(self.log, "unsupported modification"; "flags" => %flags);
        })
    }

    pub fn program(&self, id: RecipeId) -> Option<&Program> {
        self.mem.program(id)
    }

    pub fn mem(&self) -> &M {
        &self.mem
    }

    /// A copy of every committed recipe.
    pub fn image(&self) -> RecipeImage {
        RecipeImage::new(
            RecipeId::ALL
                .iter()
                .filter_map(|id| {
                    self.program(*id).map(|prog| RecipeDump {
                        id: *id,
                        words: prog.words().to_vec(),
                    })
                })
                .collect(),
        )
    }
}
