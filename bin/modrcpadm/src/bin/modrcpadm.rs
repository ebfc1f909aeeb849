// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;

use modrcp::api::ModFlag;
use modrcp::api::ModRequirement;
use modrcp::api::RecipeId;
use modrcp::engine::catalog;
use modrcp::print::print_catalog;
use modrcp::print::print_flags;
use modrcp::print::print_program;
use modrcp::print::print_recipes;
use modrcpadm::API_VERSION;
use modrcpadm::MAJOR_VERSION;

/// Inspect the packet modifier's recipes.
///
/// Every command first brings the recipe engine up against simulated
/// recipe memory, exactly as the subsystem would at start.
#[derive(Debug, Parser)]
#[command(version = modrcp_pkg_version())]
struct Cli {
    /// Recipe memory configuration, in TOML.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List all committed recipes.
    ListRecipes,

    /// List the modification flags.
    ListFlags,

    /// Dump the selection catalog.
    Catalog,

    /// Select the recipe for a set of modification flags.
    Select {
        /// Flag names, e.g. IPV4_NAT L4_NAPT. None selects the
        /// no-modification recipe.
        flags: Vec<ModFlag>,
    },

    /// Disassemble a recipe, by id or by name.
    DumpRecipe { recipe: RecipeId },

    /// Write the committed recipe image, postcard encoded.
    Image {
        #[arg(long)]
        out: PathBuf,
    },
}

fn modrcp_pkg_version() -> String {
    format!("{MAJOR_VERSION}.{API_VERSION}")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log = modrcpadm::logger();
    let cfg = modrcpadm::load_cfg(cli.config.as_deref())?;
    let engine = modrcpadm::bring_up(cfg, &log)?;

    match cli.cmd {
        Command::ListRecipes => print_recipes(&engine.image())?,

        Command::ListFlags => print_flags()?,

        Command::Catalog => print_catalog(&catalog::dump())?,

        Command::Select { flags } => {
            let req: ModRequirement = flags.into_iter().collect();
            let id = engine.select(req)?;
            println!("{} ({})", id, id.raw());
        }

        Command::DumpRecipe { recipe } => {
            let prog = engine
                .program(recipe)
                .with_context(|| format!("recipe {recipe} not committed"))?;
            print_program(recipe, prog)?;
        }

        Command::Image { out } => {
            let image = engine.image();
            let bytes = postcard::to_allocvec(&image)
                .context("failed to serialize recipe image")?;
            std::fs::write(&out, &bytes).with_context(|| {
                format!("failed to write {}", out.display())
            })?;
            println!(
                "wrote {} recipes ({} bytes) to {}",
                image.recipes.len(),
                bytes.len(),
                out.display()
            );
        }
    }

    Ok(())
}
