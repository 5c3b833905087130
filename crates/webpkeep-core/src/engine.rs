use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::asset::{AssetId, AssetRecord, BackupMarker};
use crate::encoder::{Encoder, WebpEncoder};
use crate::error::{Error, ErrorKind, Result};
use crate::format::{self, SourceFormat, Sniffed, TARGET_EXTENSION, TARGET_MIME};
use crate::ledger::{Ledger, BACKUP_PATH_KEY, BYTES_SAVED_KEY};
use crate::registry::AssetRegistry;

/// Where managed media lives and where originals are archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPaths {
    pub media_root: PathBuf,
    pub backup_root: PathBuf,
}

impl LibraryPaths {
    pub fn new(media_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            backup_root: backup_root.into(),
        }
    }

    /// Mirrors the source's directory relative to the media root under the
    /// backup root. Files outside the media root land directly in the backup root.
    pub fn backup_destination(&self, source: &Path) -> PathBuf {
        let file_name = source.file_name().unwrap_or_else(|| OsStr::new("original"));
        let rel_dir = match source.strip_prefix(&self.media_root) {
            Ok(rel) => rel.parent().map(Path::to_path_buf).unwrap_or_default(),
            Err(_) => {
                warn!(
                    path = %source.display(),
                    media_root = %self.media_root.display(),
                    "asset lies outside the media root"
                );
                PathBuf::new()
            }
        };
        self.backup_root.join(rel_dir).join(file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted {
    pub id: AssetId,
    pub file_path: PathBuf,
    pub backup_path: PathBuf,
    pub original_size: u64,
    pub converted_size: u64,
    pub bytes_saved: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restored {
    pub id: AssetId,
    pub file_path: PathBuf,
    pub mime_type: &'static str,
}

/// Response shape handed to driving clients for single-item calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpResponse {
    Success,
    Error { kind: ErrorKind, message: String },
}

impl<T> From<Result<T>> for OpResponse {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => Self::Error {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

/// Converts one asset at a time and undoes conversions from backup.
pub struct ConversionEngine<R, E = WebpEncoder> {
    registry: R,
    encoder: E,
    paths: LibraryPaths,
}

impl<R: AssetRegistry, E: Encoder> ConversionEngine<R, E> {
    pub const fn new(registry: R, encoder: E, paths: LibraryPaths) -> Self {
        Self {
            registry,
            encoder,
            paths,
        }
    }

    pub const fn registry(&self) -> &R {
        &self.registry
    }

    pub const fn paths(&self) -> &LibraryPaths {
        &self.paths
    }

    pub const fn ledger(&self) -> Ledger<'_, R> {
        Ledger::new(&self.registry)
    }

    pub fn optimize(&self, id: AssetId, quality: u32) -> OpResponse {
        self.convert(id, quality).into()
    }

    pub fn restore_response(&self, id: AssetId) -> OpResponse {
        self.restore(id).into()
    }

    /// Encodes the asset to WebP beside the original, moves the original into
    /// the backup tree, then records both in the ledger and registry.
    ///
    /// Both the WebP path and the backup path must be free before anything is
    /// written. Nothing is mutated before the move succeeds except the encoded
    /// sibling, which is removed again if archiving fails. A registry failure
    /// after the move puts the original back.
    pub fn convert(&self, id: AssetId, quality: u32) -> Result<Converted> {
        let range = self.encoder.quality_range();
        if !range.contains(&quality) {
            return Err(Error::InvalidParameter(format!(
                "quality {quality} outside {}..={}",
                range.start(),
                range.end()
            )));
        }

        let ledger = self.ledger();
        if let Some(BackupMarker::Path(existing)) = ledger.backup_marker(id)? {
            return Err(Error::InconsistentState {
                id,
                reason: format!("already converted, backup at {}", existing.display()),
            });
        }

        let record = self
            .registry
            .get_asset_record(id)?
            .ok_or(Error::UnknownAsset(id))?;
        let source = record.file_path;
        if !source.is_file() {
            return Err(Error::NotFound(source));
        }

        let bytes = fs::read(&source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound(source.clone()),
            _ => Error::Decode {
                path: source.clone(),
                reason: e.to_string(),
            },
        })?;
        let source_format = detect_format(&source, &record.mime_type, &bytes)?;
        let image = source_format.decode(&bytes).map_err(|e| Error::Decode {
            path: source.clone(),
            reason: e.to_string(),
        })?;
        debug!(
            %id,
            format = source_format.mime(),
            width = image.width(),
            height = image.height(),
            "decoded source"
        );

        let original_size = bytes.len() as u64;
        drop(bytes);

        let target = source.with_extension(TARGET_EXTENSION);
        if target == source {
            return Err(Error::UnsupportedFormat(format!(
                "{} already carries the .{TARGET_EXTENSION} extension",
                source.display()
            )));
        }
        self.ensure_unclaimed(id, &target)?;
        let backup = self.paths.backup_destination(&source);
        if backup.is_file() {
            return Err(Error::PathTaken { id, path: backup });
        }

        let encoded = self
            .encoder
            .encode(&image, quality)
            .map_err(|e| Error::Encode {
                path: source.clone(),
                reason: e.to_string(),
            })?;
        drop(image);

        if let Err(e) = fs::write(&target, &encoded) {
            discard(&target);
            return Err(Error::Write {
                path: target,
                source: e,
            });
        }
        let converted_size = encoded.len() as u64;

        if let Some(dir) = backup.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                discard(&target);
                return Err(Error::BackupDir {
                    path: dir.to_path_buf(),
                    source: e,
                });
            }
        }
        if let Err(e) = move_file(&source, &backup) {
            discard(&target);
            return Err(Error::Archive {
                from: source,
                to: backup,
                source: e,
            });
        }

        let bytes_saved = signed(original_size) - signed(converted_size);
        if let Err(e) = self.record_conversion(id, &target, &backup, bytes_saved) {
            self.undo_conversion(id, &source, &backup, &target);
            return Err(e);
        }

        info!(
            %id,
            path = %target.display(),
            original_size,
            converted_size,
            bytes_saved,
            "converted"
        );

        Ok(Converted {
            id,
            file_path: target,
            backup_path: backup,
            original_size,
            converted_size,
            bytes_saved,
        })
    }

    /// Moves the archived original back in place of the WebP file.
    ///
    /// The WebP file is only deleted once the registry and ledger accept the
    /// restoration; a registry failure moves the original back into the backup tree.
    pub fn restore(&self, id: AssetId) -> Result<Restored> {
        let ledger = self.ledger();
        let Some(BackupMarker::Path(backup)) = ledger.backup_marker(id)? else {
            return Err(Error::NoBackup(id));
        };
        if !backup.is_file() {
            return Err(Error::BackupMissing(backup));
        }

        let record = self
            .registry
            .get_asset_record(id)?
            .ok_or(Error::UnknownAsset(id))?;

        let Some(extension) = backup.extension().and_then(OsStr::to_str).map(str::to_owned) else {
            return Err(Error::InconsistentState {
                id,
                reason: format!("backup {} has no file extension", backup.display()),
            });
        };

        let current = &record.file_path;
        let restored = current.with_extension(&extension);
        if restored != *current {
            self.ensure_unclaimed(id, &restored)?;
        }

        if let Err(e) = move_file(&backup, &restored) {
            return Err(Error::Archive {
                from: backup,
                to: restored,
                source: e,
            });
        }

        let mime_type = format::mime_for_extension(&extension);
        if let Err(e) = self.record_restoration(id, &restored, mime_type) {
            self.undo_restoration(&record, &backup, &restored);
            return Err(e);
        }

        if restored != *current && current.exists() {
            if let Err(e) = fs::remove_file(current) {
                warn!(%id, path = %current.display(), error = %e, "could not remove converted file");
            }
        }
        if let Some(dir) = backup.parent() {
            prune_empty_dirs(dir, &self.paths.backup_root);
        }

        info!(%id, path = %restored.display(), "restored");

        Ok(Restored {
            id,
            file_path: restored,
            mime_type,
        })
    }

    /// Refuses a destination that exists on disk or belongs to another asset.
    fn ensure_unclaimed(&self, id: AssetId, path: &Path) -> Result<()> {
        let owned_elsewhere = self
            .registry
            .list_all_assets(None)?
            .iter()
            .any(|r| r.id != id && r.file_path == path);
        if owned_elsewhere || path.exists() {
            return Err(Error::PathTaken {
                id,
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn record_conversion(
        &self,
        id: AssetId,
        target: &Path,
        backup: &Path,
        bytes_saved: i64,
    ) -> Result<()> {
        self.ledger().mark_converted(id, backup, bytes_saved)?;
        self.registry.set_asset_record(id, target, TARGET_MIME)?;
        Ok(())
    }

    /// Puts the original back at its source path after the bookkeeping failed.
    /// If that move fails too, the original stays in the backup tree and the
    /// encoded file is kept so the media path is not left empty.
    fn undo_conversion(&self, id: AssetId, source: &Path, backup: &Path, target: &Path) {
        for key in [BACKUP_PATH_KEY, BYTES_SAVED_KEY] {
            if let Err(e) = self.registry.delete_meta(id, key) {
                warn!(%id, key, error = %e, "could not clear ledger entry");
            }
        }
        match move_file(backup, source) {
            Ok(()) => {
                discard(target);
                if let Some(dir) = backup.parent() {
                    prune_empty_dirs(dir, &self.paths.backup_root);
                }
                warn!(%id, path = %source.display(), "conversion rolled back");
            }
            Err(e) => error!(
                %id,
                backup = %backup.display(),
                error = %e,
                "could not roll back conversion, original left in backup tree"
            ),
        }
    }

    fn record_restoration(&self, id: AssetId, restored: &Path, mime_type: &str) -> Result<()> {
        self.registry.set_asset_record(id, restored, mime_type)?;
        self.ledger().mark_restored(id)?;
        Ok(())
    }

    /// Returns the original to the backup tree and re-points the record and
    /// ledger at the converted file.
    fn undo_restoration(&self, record: &AssetRecord, backup: &Path, restored: &Path) {
        let id = record.id;
        if let Err(e) = move_file(restored, backup) {
            error!(
                %id,
                path = %restored.display(),
                error = %e,
                "could not roll back restoration, original left at media path"
            );
            return;
        }
        if let Err(e) = self
            .registry
            .set_asset_record(id, &record.file_path, &record.mime_type)
        {
            warn!(%id, error = %e, "could not reset asset record");
        }
        let marker = BackupMarker::Path(backup.to_path_buf()).to_meta_value();
        if let Err(e) = self.registry.set_meta(id, BACKUP_PATH_KEY, &marker) {
            warn!(%id, error = %e, "could not reset backup marker");
        }
        warn!(%id, path = %record.file_path.display(), "restoration rolled back");
    }
}

fn detect_format(path: &Path, declared_mime: &str, bytes: &[u8]) -> Result<SourceFormat> {
    let declared = SourceFormat::from_mime(declared_mime);
    match format::sniff(bytes) {
        Sniffed::Source(found) => {
            if declared != Some(found) {
                warn!(
                    path = %path.display(),
                    declared = declared_mime,
                    detected = found.mime(),
                    "declared type differs from file content"
                );
            }
            Ok(found)
        }
        Sniffed::Other(other) => Err(Error::UnsupportedFormat(format!(
            "{} is {other:?}",
            path.display()
        ))),
        Sniffed::Unknown if declared.is_some() => Err(Error::Decode {
            path: path.to_path_buf(),
            reason: format!("content is not a valid {declared_mime} image"),
        }),
        Sniffed::Unknown => Err(Error::UnsupportedFormat(declared_mime.to_string())),
    }
}

fn signed(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed unrecorded output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove unrecorded output"),
    }
}

/// Rename, falling back to copy-then-delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !from.is_file() {
                return Err(rename_err);
            }
            debug!(error = %rename_err, "rename failed, copying instead");
            if let Err(e) = fs::copy(from, to) {
                let _ = fs::remove_file(to);
                return Err(e);
            }
            fs::remove_file(from)
        }
    }
}

/// Removes empty directories from `dir` upwards, stopping at `root`.
fn prune_empty_dirs(dir: &Path, root: &Path) {
    let mut current = dir.to_path_buf();
    while current != root && current.starts_with(root) {
        if fs::remove_dir(&current).is_err() {
            break;
        }
        debug!(path = %current.display(), "pruned empty backup directory");
        if !current.pop() {
            break;
        }
    }
}
