#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod asset;
pub mod batch;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod format;
pub mod ledger;
pub mod registry;

pub use asset::{AssetId, AssetRecord, AssetStatus, AssetSummary, BackupMarker, Listing};
pub use batch::{
    Batch, BatchMode, BatchState, BatchSummary, CancelToken, ItemFailure, ItemOutcome,
    ItemReport, NoProgress, ProgressObserver,
};
pub use encoder::{EncodeFailure, Encoder, WebpEncoder};
pub use engine::{ConversionEngine, Converted, LibraryPaths, OpResponse, Restored};
pub use error::{Error, ErrorKind, RegistryError, Result};
pub use format::SourceFormat;
pub use ledger::{Ledger, BACKUP_PATH_KEY, BYTES_SAVED_KEY};
pub use registry::{AssetRegistry, MemoryRegistry};
