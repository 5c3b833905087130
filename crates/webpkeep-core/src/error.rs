use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::AssetId;

/// Failure reported by an [`AssetRegistry`](crate::AssetRegistry) implementation.
#[derive(Debug, Error)]
#[error("registry error: {source}")]
pub struct RegistryError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl RegistryError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("asset {0} is not registered")]
    UnknownAsset(AssetId),

    #[error("file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid image data in {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("encoder rejected {}: {reason}", .path.display())]
    Encode { path: PathBuf, reason: String },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create backup directory {}: {source}", .path.display())]
    BackupDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    Archive {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("asset {0} has no backup to restore")]
    NoBackup(AssetId),

    #[error("backup file is missing: {}", .0.display())]
    BackupMissing(PathBuf),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("inconsistent state for asset {id}: {reason}")]
    InconsistentState { id: AssetId, reason: String },

    #[error("cannot use {} for asset {id}: path is already taken", .path.display())]
    PathTaken { id: AssetId, path: PathBuf },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl Error {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownAsset(_) | Self::NotFound(_) => ErrorKind::NotFound,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::Decode { .. } => ErrorKind::DecodeError,
            Self::Encode { .. } | Self::Write { .. } => ErrorKind::EncodeError,
            Self::BackupDir { .. } => ErrorKind::BackupDirError,
            Self::Archive { .. } => ErrorKind::ArchiveError,
            Self::NoBackup(_) => ErrorKind::NoBackup,
            Self::BackupMissing(_) => ErrorKind::BackupMissing,
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::InconsistentState { .. } | Self::PathTaken { .. } => ErrorKind::InconsistentState,
            Self::Registry(_) => ErrorKind::RegistryError,
        }
    }

    /// True when the failure came from the storage layer running out of space.
    /// Continuing a batch after this usually compounds the damage.
    pub fn is_resource_exhaustion(&self) -> bool {
        match self {
            Self::Write { source, .. }
            | Self::BackupDir { source, .. }
            | Self::Archive { source, .. } => source.kind() == io::ErrorKind::StorageFull,
            _ => false,
        }
    }
}

/// Closed taxonomy of failures surfaced to driving clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    UnsupportedFormat,
    DecodeError,
    EncodeError,
    BackupDirError,
    ArchiveError,
    NoBackup,
    BackupMissing,
    InvalidParameter,
    InconsistentState,
    RegistryError,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::UnsupportedFormat => "unsupported_format",
            Self::DecodeError => "decode_error",
            Self::EncodeError => "encode_error",
            Self::BackupDirError => "backup_dir_error",
            Self::ArchiveError => "archive_error",
            Self::NoBackup => "no_backup",
            Self::BackupMissing => "backup_missing",
            Self::InvalidParameter => "invalid_parameter",
            Self::InconsistentState => "inconsistent_state",
            Self::RegistryError => "registry_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
