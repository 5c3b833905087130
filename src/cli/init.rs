use std::path::Path;

use anyhow::{bail, Context, Result};
use console::style;

use crate::config::{self, LibraryConfig, BACKUP_DIR_NAME, DB_FILE};
use crate::db::LibraryDb;
use crate::util::whoami;

pub fn run(
    cwd: &Path,
    media_root: Option<&str>,
    backup_root: Option<&str>,
    quality: Option<u32>,
) -> Result<()> {
    let db_path = cwd.join(DB_FILE);
    if db_path.exists() {
        bail!("library already exists in {}", cwd.display());
    }

    let root = cwd
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", cwd.display()))?;
    let mut settings = LibraryConfig::defaults(&root);
    if let Some(media) = media_root {
        settings.media_root = config::resolve(&root, media);
        if !settings.media_root.is_dir() {
            bail!("media root is not a directory: {}", settings.media_root.display());
        }
        settings.backup_root = settings.media_root.join(BACKUP_DIR_NAME);
    }
    if let Some(backup) = backup_root {
        settings.backup_root = config::resolve(&root, backup);
    }
    if let Some(q) = quality {
        config::validate_quality(q)?;
        settings.quality = q;
    }

    let db = LibraryDb::create(&db_path)?;
    settings.save(&db)?;
    db.insert_audit("init", None, Some(&whoami()), None)?;

    eprintln!(
        "{} Initialized library in {}",
        style("●").green(),
        root.display()
    );
    eprintln!("  Media:   {}", settings.media_root.display());
    eprintln!("  Backups: {}", settings.backup_root.display());
    eprintln!("  Quality: {}", settings.quality);

    Ok(())
}
