// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! modrcp administration library

use anyhow::Context;
use modrcp::engine::RecipeEngine;
use modrcp::engine::RecipeMemCfg;
use modrcp::engine::SimRecipeMem;
use slog::Drain;
use slog::Logger;
use slog::o;
use std::path::Path;

pub use modrcp::api::API_VERSION;
pub use modrcp::api::MAJOR_VERSION;

/// A terminal logger on stderr, filtered by `RUST_LOG`.
pub fn logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain);
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("unit" => "modrcpadm"))
}

/// Parse a recipe memory configuration in TOML.
pub fn parse_cfg(s: &str) -> anyhow::Result<RecipeMemCfg> {
    toml::from_str(s).context("invalid recipe memory configuration")
}

/// Load the recipe memory configuration at `path`, or the default one.
pub fn load_cfg(path: Option<&Path>) -> anyhow::Result<RecipeMemCfg> {
    let Some(path) = path else {
        return Ok(RecipeMemCfg::default());
    };

    let s = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_cfg(&s).with_context(|| format!("in {}", path.display()))
}

/// Bring up the recipe engine against simulated recipe memory.
pub fn bring_up(
    cfg: RecipeMemCfg,
    log: &Logger,
) -> anyhow::Result<RecipeEngine<SimRecipeMem>> {
    RecipeEngine::init(SimRecipeMem::new(cfg), log)
        .context("recipe engine bring-up failed")
}
