use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Registry-assigned identifier of a managed media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub i64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AssetId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('#').parse().map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub file_path: PathBuf,
    pub mime_type: String,
}

impl AssetRecord {
    pub fn file_name(&self) -> String {
        self.file_path.file_name().map_or_else(
            || self.file_path.display().to_string(),
            |n| n.to_string_lossy().to_string(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// Optimizable: allow-listed format, no backup recorded.
    Pending,
    /// Original lives in the backup tree and can be restored.
    Converted,
    /// Arrived already in the target format; nothing to restore.
    External,
    /// The file is not on disk. Re-derived on every listing.
    Missing,
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Converted => "converted",
            Self::External => "external",
            Self::Missing => "missing",
        };
        f.write_str(s)
    }
}

/// Value stored under the backup-path metadata key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupMarker {
    External,
    Path(PathBuf),
}

impl BackupMarker {
    pub const EXTERNAL_SENTINEL: &'static str = "external";

    pub fn parse(value: &str) -> Self {
        if value == Self::EXTERNAL_SENTINEL {
            Self::External
        } else {
            Self::Path(PathBuf::from(value))
        }
    }

    pub fn to_meta_value(&self) -> String {
        match self {
            Self::External => Self::EXTERNAL_SENTINEL.to_string(),
            Self::Path(p) => p.display().to_string(),
        }
    }

    pub fn backup_path(&self) -> Option<&Path> {
        match self {
            Self::External => None,
            Self::Path(p) => Some(p),
        }
    }
}

pub fn derive_status(
    file_exists: bool,
    marker: Option<&BackupMarker>,
    is_target_format: bool,
) -> AssetStatus {
    if !file_exists {
        return AssetStatus::Missing;
    }
    match marker {
        Some(BackupMarker::Path(_)) => AssetStatus::Converted,
        Some(BackupMarker::External) => AssetStatus::External,
        None if is_target_format => AssetStatus::External,
        None => AssetStatus::Pending,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub id: AssetId,
    pub filename: String,
    pub status: AssetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_saved: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub pending: Vec<AssetSummary>,
    pub other: Vec<AssetSummary>,
}

impl Listing {
    pub fn pending_ids(&self) -> Vec<AssetId> {
        self.pending.iter().map(|s| s.id).collect()
    }

    pub fn restorable_ids(&self) -> Vec<AssetId> {
        self.ids_with_status(AssetStatus::Converted)
    }

    pub fn ids_with_status(&self, status: AssetStatus) -> Vec<AssetId> {
        self.pending
            .iter()
            .chain(&self.other)
            .filter(|s| s.status == status)
            .map(|s| s.id)
            .collect()
    }

    pub fn count(&self, status: AssetStatus) -> usize {
        self.pending
            .iter()
            .chain(&self.other)
            .filter(|s| s.status == status)
            .count()
    }

    pub fn total_bytes_saved(&self) -> i64 {
        self.other.iter().filter_map(|s| s.bytes_saved).sum()
    }
}
