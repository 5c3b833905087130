use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};

use crate::config::{LibraryConfig, DB_FILE};
use crate::db::LibraryDb;

/// An opened library: the directory holding `.wpk`, its database and settings.
pub struct Library {
    pub root: PathBuf,
    pub db: LibraryDb,
    pub config: LibraryConfig,
}

impl Library {
    pub fn open(root: &Path) -> Result<Self> {
        let db = LibraryDb::open(&root.join(DB_FILE))?;
        let config = LibraryConfig::load(&db, root)
            .with_context(|| format!("failed to load settings of {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            db,
            config,
        })
    }
}

/// Walks up from `cwd` to the nearest directory containing a library database.
pub fn discover(cwd: &Path) -> Result<Option<Library>> {
    let mut dir = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
    loop {
        if dir.join(DB_FILE).is_file() {
            return Library::open(&dir).map(Some);
        }
        if !dir.pop() {
            return Ok(None);
        }
    }
}

pub fn require(cwd: &Path) -> Result<Library> {
    match discover(cwd)? {
        Some(library) => Ok(library),
        None => bail!("not inside a webpkeep library (run 'wpk init' first)"),
    }
}
