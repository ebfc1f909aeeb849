// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Print recipes, flags and the catalog in a human-friendly manner.
//!
//! Shared by modrcpadm and the integration tests.

use crate::api::DumpCatalogResp;
use crate::api::ModFlag;
use crate::api::RecipeId;
use crate::api::RecipeImage;
use crate::engine::isa::Insn;
use crate::engine::program::Program;
use std::io::Write;
use tabwriter::TabWriter;

/// Print a [`RecipeImage`] as a list of recipes.
pub fn print_recipes(image: &RecipeImage) -> std::io::Result<()> {
    print_recipes_into(&mut std::io::stdout(), image)
}

/// Print a [`RecipeImage`] as a list of recipes into a given writer.
pub fn print_recipes_into(
    writer: &mut impl Write,
    image: &RecipeImage,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "ID\tNAME\tWORDS")?;
    for recipe in &image.recipes {
        writeln!(
            t,
            "{}\t{}\t{}",
            recipe.id.raw(),
            recipe.id,
            recipe.words.len(),
        )?;
    }
    t.flush()
}

/// Print every modification flag.
pub fn print_flags() -> std::io::Result<()> {
    print_flags_into(&mut std::io::stdout())
}

/// Print every modification flag into a given writer.
pub fn print_flags_into(writer: &mut impl Write) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "BIT\tNAME\tMASK")?;
    for flag in ModFlag::ALL {
        writeln!(t, "{}\t{}\t{:#018x}", flag as u8, flag, flag.bit())?;
    }
    t.flush()
}

/// Print a [`DumpCatalogResp`].
pub fn print_catalog(resp: &DumpCatalogResp) -> std::io::Result<()> {
    print_catalog_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpCatalogResp`] into a given writer.
pub fn print_catalog_into(
    writer: &mut impl Write,
    resp: &DumpCatalogResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "RECIPE\tBITMAP\tFLAGS")?;
    for entry in &resp.entries {
        writeln!(
            t,
            "{}\t{:#010x}\t{}",
            entry.recipe,
            entry.req.bits(),
            entry.req.names(),
        )?;
    }
    t.flush()
}

/// Print the disassembly of recipe `id`.
pub fn print_program(id: RecipeId, prog: &Program) -> std::io::Result<()> {
    print_program_into(&mut std::io::stdout(), id, prog)
}

/// Print the disassembly of recipe `id` into a given writer.
pub fn print_program_into(
    writer: &mut impl Write,
    id: RecipeId,
    prog: &Program,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "Recipe {} ({})", id.raw(), id)?;
    write_hrb(&mut t)?;
    writeln!(t, "WORD\tRAW\tLANE  OP")?;
    write_hr(&mut t)?;
    for (i, word) in prog.words().iter().enumerate() {
        match Insn::decode(*word) {
            Ok(insn) => writeln!(t, "{}\t{:#018x}\t{}", i, word, insn)?,
            Err(e) => writeln!(t, "{}\t{:#018x}\t<{}>", i, word, e)?,
        }
    }
    t.flush()
}

/// Print a horizontal rule in bold.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Print a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}
