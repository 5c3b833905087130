use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use console::style;
use walkdir::WalkDir;
use webpkeep_core::format::{TARGET_EXTENSION, TARGET_MIME};
use webpkeep_core::SourceFormat;

use crate::config;
use crate::context::{require, Library};
use crate::util::whoami;

pub fn run(cwd: &Path, paths: &[String]) -> Result<()> {
    let library = require(cwd)?;
    let media_root = &library.config.media_root;

    let targets: Vec<PathBuf> = if paths.is_empty() {
        vec![media_root.clone()]
    } else {
        paths
            .iter()
            .map(|p| {
                let resolved = config::resolve(cwd, p);
                if !resolved.exists() {
                    bail!("path not found: {p}");
                }
                if !resolved.starts_with(media_root) {
                    bail!("{p} is outside the media root {}", media_root.display());
                }
                Ok(resolved)
            })
            .collect::<Result<_>>()?
    };

    let mut added = 0usize;
    let mut seen = 0usize;
    for target in &targets {
        for path in image_files(&library, target) {
            seen += 1;
            if register(&library, &path)? {
                added += 1;
            }
        }
    }

    library.db.insert_audit(
        "scan",
        None,
        Some(&whoami()),
        Some(&format!("{added} registered")),
    )?;

    eprintln!(
        "{} Registered {added} new image(s) ({seen} found)",
        style("●").green()
    );
    Ok(())
}

/// Mime type for a file the library would manage, by extension.
pub fn managed_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    if ext.eq_ignore_ascii_case(TARGET_EXTENSION) {
        return Some(TARGET_MIME);
    }
    SourceFormat::from_extension(ext).map(SourceFormat::mime)
}

fn image_files(library: &Library, target: &Path) -> Vec<PathBuf> {
    let backup_root = &library.config.backup_root;
    WalkDir::new(target)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() > 0 && entry.file_type().is_dir() {
                let hidden = entry.file_name().to_string_lossy().starts_with('.');
                return !hidden && entry.path() != backup_root.as_path();
            }
            true
        })
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| managed_mime(p).is_some())
        .collect()
}

fn register(library: &Library, path: &Path) -> Result<bool> {
    let Some(mime) = managed_mime(path) else {
        return Ok(false);
    };
    if library.db.get_asset_by_path(path)?.is_some() {
        return Ok(false);
    }
    library
        .db
        .insert_asset(path, mime)
        .with_context(|| format!("failed to register {}", path.display()))?;
    tracing::debug!(path = %path.display(), mime, "registered");
    Ok(true)
}
