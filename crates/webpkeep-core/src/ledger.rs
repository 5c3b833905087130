use std::path::Path;

use tracing::{debug, warn};

use crate::asset::{derive_status, AssetId, AssetRecord, AssetStatus, AssetSummary, BackupMarker, Listing};
use crate::error::{Error, RegistryError, Result};
use crate::format::{is_target_mime, managed_mime_types};
use crate::registry::AssetRegistry;

pub const BACKUP_PATH_KEY: &str = "backup_path";
pub const BYTES_SAVED_KEY: &str = "bytes_saved";

/// Status and backup bookkeeping layered over the registry's metadata store.
pub struct Ledger<'r, R: ?Sized> {
    registry: &'r R,
}

impl<'r, R: AssetRegistry + ?Sized> Ledger<'r, R> {
    pub const fn new(registry: &'r R) -> Self {
        Self { registry }
    }

    pub fn backup_marker(&self, id: AssetId) -> std::result::Result<Option<BackupMarker>, RegistryError> {
        Ok(self
            .registry
            .get_meta(id, BACKUP_PATH_KEY)?
            .filter(|v| !v.is_empty())
            .map(|v| BackupMarker::parse(&v)))
    }

    pub fn bytes_saved(&self, id: AssetId) -> std::result::Result<Option<i64>, RegistryError> {
        let Some(raw) = self.registry.get_meta(id, BYTES_SAVED_KEY)? else {
            return Ok(None);
        };
        match raw.trim().parse() {
            Ok(n) => Ok(Some(n)),
            Err(_) => {
                warn!(%id, value = %raw, "ignoring malformed savings value");
                Ok(None)
            }
        }
    }

    /// Current status of one asset. Read-only: unlike [`Ledger::list_assets`]
    /// this never records the external sentinel.
    pub fn status(&self, record: &AssetRecord) -> std::result::Result<AssetStatus, RegistryError> {
        let marker = self.backup_marker(record.id)?;
        Ok(derive_status(
            record.file_path.exists(),
            marker.as_ref(),
            is_target_mime(&record.mime_type),
        ))
    }

    pub fn status_of(&self, id: AssetId) -> Result<AssetStatus> {
        let record = self
            .registry
            .get_asset_record(id)?
            .ok_or(Error::UnknownAsset(id))?;
        Ok(self.status(&record)?)
    }

    /// Partitions every managed asset into pending and everything else.
    ///
    /// Target-format assets seen for the first time without a backup marker are
    /// recorded as external so later listings keep classifying them the same way.
    pub fn list_assets(&self) -> std::result::Result<Listing, RegistryError> {
        let mimes = managed_mime_types();
        let records = self.registry.list_all_assets(Some(mimes.as_slice()))?;
        let mut listing = Listing::default();

        for record in records {
            let is_target = is_target_mime(&record.mime_type);
            let mut marker = self.backup_marker(record.id)?;

            if marker.is_none() && is_target {
                self.registry.set_meta(
                    record.id,
                    BACKUP_PATH_KEY,
                    BackupMarker::EXTERNAL_SENTINEL,
                )?;
                debug!(id = %record.id, "classified as external");
                marker = Some(BackupMarker::External);
            }

            let status = derive_status(record.file_path.exists(), marker.as_ref(), is_target);
            let bytes_saved = if status == AssetStatus::Converted {
                self.bytes_saved(record.id)?
            } else {
                None
            };

            let summary = AssetSummary {
                id: record.id,
                filename: record.file_name(),
                status,
                bytes_saved,
            };
            if status == AssetStatus::Pending {
                listing.pending.push(summary);
            } else {
                listing.other.push(summary);
            }
        }

        Ok(listing)
    }

    pub fn mark_converted(&self, id: AssetId, backup_path: &Path, bytes_saved: i64) -> Result<()> {
        if let Some(BackupMarker::Path(existing)) = self.backup_marker(id)? {
            return Err(Error::InconsistentState {
                id,
                reason: format!("already converted, backup at {}", existing.display()),
            });
        }

        let marker = BackupMarker::Path(backup_path.to_path_buf());
        self.registry
            .set_meta(id, BACKUP_PATH_KEY, &marker.to_meta_value())?;
        self.registry
            .set_meta(id, BYTES_SAVED_KEY, &bytes_saved.to_string())?;
        Ok(())
    }

    pub fn mark_restored(&self, id: AssetId) -> Result<()> {
        match self.backup_marker(id)? {
            Some(BackupMarker::Path(_)) => {}
            Some(BackupMarker::External) => {
                return Err(Error::InconsistentState {
                    id,
                    reason: "externally managed asset has no backup".to_string(),
                });
            }
            None => {
                return Err(Error::InconsistentState {
                    id,
                    reason: "no backup recorded".to_string(),
                });
            }
        }

        self.registry.delete_meta(id, BACKUP_PATH_KEY)?;
        self.registry.delete_meta(id, BYTES_SAVED_KEY)?;
        Ok(())
    }
}
