use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use webpkeep_core::{Encoder, LibraryPaths, WebpEncoder};

use crate::db::LibraryDb;

pub const DB_FILE: &str = ".wpk";
pub const BACKUP_DIR_NAME: &str = "webp-backups";
pub const DEFAULT_QUALITY: u32 = 80;

pub const QUALITY_ENV: &str = "WPK_QUALITY";
pub const BACKUP_ROOT_ENV: &str = "WPK_BACKUP_ROOT";

const MEDIA_ROOT_KEY: &str = "media_root";
const BACKUP_ROOT_KEY: &str = "backup_root";
const QUALITY_KEY: &str = "quality";

/// Settings of one library, stored in its `library_config` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryConfig {
    pub media_root: PathBuf,
    pub backup_root: PathBuf,
    pub quality: u32,
}

impl LibraryConfig {
    pub fn defaults(library_root: &Path) -> Self {
        Self {
            media_root: library_root.to_path_buf(),
            backup_root: library_root.join(BACKUP_DIR_NAME),
            quality: DEFAULT_QUALITY,
        }
    }

    pub fn load(db: &LibraryDb, library_root: &Path) -> Result<Self> {
        Self::load_with(db, library_root, |key| std::env::var(key).ok())
    }

    /// Loads stored settings, then applies overrides looked up through `env`.
    pub fn load_with(
        db: &LibraryDb,
        library_root: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let media_root = db
            .get_config(MEDIA_ROOT_KEY)?
            .map_or_else(|| library_root.to_path_buf(), |v| resolve(library_root, &v));

        let backup_root = match env(BACKUP_ROOT_ENV).filter(|v| !v.is_empty()) {
            Some(v) => resolve(library_root, &v),
            None => db
                .get_config(BACKUP_ROOT_KEY)?
                .map_or_else(|| media_root.join(BACKUP_DIR_NAME), |v| resolve(library_root, &v)),
        };

        let quality = match env(QUALITY_ENV).filter(|v| !v.is_empty()) {
            Some(v) => parse_quality(&v).with_context(|| format!("invalid {QUALITY_ENV}"))?,
            None => match db.get_config(QUALITY_KEY)? {
                Some(v) => parse_quality(&v).context("invalid stored quality")?,
                None => DEFAULT_QUALITY,
            },
        };

        Ok(Self {
            media_root,
            backup_root,
            quality,
        })
    }

    pub fn save(&self, db: &LibraryDb) -> Result<()> {
        db.set_config(MEDIA_ROOT_KEY, &self.media_root.to_string_lossy())?;
        db.set_config(BACKUP_ROOT_KEY, &self.backup_root.to_string_lossy())?;
        db.set_config(QUALITY_KEY, &self.quality.to_string())?;
        Ok(())
    }

    pub fn paths(&self) -> LibraryPaths {
        LibraryPaths::new(&self.media_root, &self.backup_root)
    }
}

pub fn parse_quality(value: &str) -> Result<u32> {
    let quality: u32 = value
        .trim()
        .parse()
        .with_context(|| format!("'{value}' is not a number"))?;
    validate_quality(quality)?;
    Ok(quality)
}

pub fn validate_quality(quality: u32) -> Result<()> {
    let range = WebpEncoder.quality_range();
    if !range.contains(&quality) {
        bail!(
            "quality {quality} is outside {}..={}",
            range.start(),
            range.end()
        );
    }
    Ok(())
}

/// Absolute form of a configured path, relative ones anchored at the library root.
pub fn resolve(library_root: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        library_root.join(path)
    };
    joined.canonicalize().unwrap_or(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LibraryDb) {
        let dir = TempDir::new().unwrap();
        let db = LibraryDb::create(&dir.path().join(DB_FILE)).unwrap();
        (dir, db)
    }

    #[test]
    fn defaults_when_nothing_stored() {
        let (dir, db) = setup();
        let config = LibraryConfig::load_with(&db, dir.path(), |_| None).unwrap();
        assert_eq!(config, LibraryConfig::defaults(dir.path()));
        assert_eq!(config.backup_root, dir.path().join("webp-backups"));
    }

    #[test]
    fn save_and_load() {
        let (dir, db) = setup();
        let config = LibraryConfig {
            media_root: dir.path().join("media"),
            backup_root: dir.path().join("archive"),
            quality: 55,
        };
        config.save(&db).unwrap();
        let loaded = LibraryConfig::load_with(&db, dir.path(), |_| None).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn backup_root_follows_media_root() {
        let (dir, db) = setup();
        db.set_config("media_root", "media").unwrap();
        let config = LibraryConfig::load_with(&db, dir.path(), |_| None).unwrap();
        assert_eq!(config.media_root, dir.path().join("media"));
        assert_eq!(config.backup_root, dir.path().join("media").join("webp-backups"));
    }

    #[test]
    fn env_overrides_win() {
        let (dir, db) = setup();
        LibraryConfig::defaults(dir.path()).save(&db).unwrap();
        let config = LibraryConfig::load_with(&db, dir.path(), |key| match key {
            QUALITY_ENV => Some("42".to_string()),
            BACKUP_ROOT_ENV => Some("elsewhere".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.quality, 42);
        assert_eq!(config.backup_root, dir.path().join("elsewhere"));
    }

    #[test]
    fn bad_env_quality_is_an_error() {
        let (dir, db) = setup();
        let result = LibraryConfig::load_with(&db, dir.path(), |key| {
            (key == QUALITY_ENV).then(|| "101".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn quality_parsing() {
        assert_eq!(parse_quality(" 0 ").unwrap(), 0);
        assert_eq!(parse_quality("100").unwrap(), 100);
        assert!(parse_quality("high").is_err());
        assert!(parse_quality("-1").is_err());
        assert!(validate_quality(101).is_err());
    }
}
