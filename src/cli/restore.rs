use std::path::Path;

use anyhow::{bail, Result};
use dialoguer::Confirm;
use webpkeep_core::{AssetId, BatchMode, ConversionEngine, WebpEncoder};

use super::progress::run_batch;
use crate::context::require;

pub fn run(cwd: &Path, ids: &[AssetId], all: bool, yes: bool, json: bool) -> Result<()> {
    let library = require(cwd)?;
    let engine = ConversionEngine::new(&library.db, WebpEncoder, library.config.paths());

    let ids = if all {
        let restorable = engine.ledger().list_assets()?.restorable_ids();
        if restorable.is_empty() {
            eprintln!("No converted images to restore");
            return Ok(());
        }
        if !yes && !confirm_all(restorable.len())? {
            eprintln!("Aborted");
            return Ok(());
        }
        restorable
    } else if ids.is_empty() {
        bail!("give asset ids to restore, or --all");
    } else {
        ids.to_vec()
    };

    run_batch(&engine, &library.db, BatchMode::Restore, ids, json)
}

fn confirm_all(count: usize) -> Result<bool> {
    let answer = Confirm::new()
        .with_prompt(format!("Restore all images? ({count} converted)"))
        .default(false)
        .interact_opt()?;
    Ok(answer.unwrap_or(false))
}
