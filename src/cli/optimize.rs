use std::path::Path;

use anyhow::Result;
use webpkeep_core::{AssetId, BatchMode, ConversionEngine, WebpEncoder};

use super::progress::run_batch;
use crate::config::validate_quality;
use crate::context::require;

pub fn run(cwd: &Path, ids: &[AssetId], quality: Option<u32>, json: bool) -> Result<()> {
    let library = require(cwd)?;
    let quality = quality.unwrap_or(library.config.quality);
    validate_quality(quality)?;

    let engine = ConversionEngine::new(&library.db, WebpEncoder, library.config.paths());
    let ids = if ids.is_empty() {
        engine.ledger().list_assets()?.pending_ids()
    } else {
        ids.to_vec()
    };
    if ids.is_empty() {
        eprintln!("No pending images to optimize");
        return Ok(());
    }

    run_batch(&engine, &library.db, BatchMode::Optimize { quality }, ids, json)
}
