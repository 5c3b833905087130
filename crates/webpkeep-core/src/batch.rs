use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::asset::AssetId;
use crate::encoder::Encoder;
use crate::engine::ConversionEngine;
use crate::error::ErrorKind;
use crate::registry::AssetRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum BatchMode {
    Optimize { quality: u32 },
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Running,
    Completed { with_errors: bool },
    Cancelled,
}

impl BatchState {
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Cancelled)
    }
}

/// Cooperative stop flag. Checked by the batch only between items.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum ItemOutcome {
    Succeeded,
    Failed {
        kind: ErrorKind,
        message: String,
        resource_exhausted: bool,
    },
}

impl ItemOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Emitted after every item, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    pub id: AssetId,
    pub outcome: ItemOutcome,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub id: AssetId,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub state: BatchState,
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<ItemFailure>,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

pub trait ProgressObserver {
    fn on_item(&mut self, report: &ItemReport);

    fn on_finish(&mut self, _summary: &BatchSummary) {}
}

/// Observer that discards everything.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_item(&mut self, _report: &ItemReport) {}
}

/// Drives the engine across an ordered list of ids, strictly one at a time.
///
/// A failed item never stops the run. Cancellation takes effect at the next
/// item boundary, so an item that has started always finishes.
pub struct Batch<'e, R, E> {
    engine: &'e ConversionEngine<R, E>,
    mode: BatchMode,
    cancel: CancelToken,
    state: BatchState,
    ids: Vec<AssetId>,
    cursor: usize,
    succeeded: usize,
    failed: Vec<ItemFailure>,
}

impl<'e, R: AssetRegistry, E: Encoder> Batch<'e, R, E> {
    pub const fn new(engine: &'e ConversionEngine<R, E>, mode: BatchMode, cancel: CancelToken) -> Self {
        Self {
            engine,
            mode,
            cancel,
            state: BatchState::Idle,
            ids: Vec::new(),
            cursor: 0,
            succeeded: 0,
            failed: Vec::new(),
        }
    }

    /// Moves an idle batch to running. An empty id list, or a batch that is
    /// not idle, is left as it was and `false` is returned.
    pub fn start(&mut self, ids: Vec<AssetId>) -> bool {
        if self.state != BatchState::Idle || ids.is_empty() {
            return false;
        }
        info!(total = ids.len(), mode = ?self.mode, "batch started");
        self.ids = ids;
        self.state = BatchState::Running;
        true
    }

    pub const fn state(&self) -> BatchState {
        self.state
    }

    pub fn total(&self) -> usize {
        self.ids.len()
    }

    pub const fn completed(&self) -> usize {
        self.cursor
    }

    /// Processes the next id. Returns `None` once the batch is no longer running.
    pub fn step(&mut self) -> Option<ItemReport> {
        if self.state != BatchState::Running {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.state = BatchState::Cancelled;
            info!(
                processed = self.cursor,
                skipped = self.ids.len() - self.cursor,
                "batch cancelled"
            );
            return None;
        }

        let id = self.ids[self.cursor];
        let result = match self.mode {
            BatchMode::Optimize { quality } => self.engine.convert(id, quality).map(drop),
            BatchMode::Restore => self.engine.restore(id).map(drop),
        };
        self.cursor += 1;

        let outcome = match result {
            Ok(()) => {
                self.succeeded += 1;
                ItemOutcome::Succeeded
            }
            Err(e) => {
                warn!(%id, kind = %e.kind(), error = %e, "item failed");
                self.failed.push(ItemFailure {
                    id,
                    kind: e.kind(),
                    message: e.to_string(),
                });
                ItemOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                    resource_exhausted: e.is_resource_exhaustion(),
                }
            }
        };

        if self.cursor == self.ids.len() {
            self.state = BatchState::Completed {
                with_errors: !self.failed.is_empty(),
            };
            info!(
                succeeded = self.succeeded,
                failed = self.failed.len(),
                "batch completed"
            );
        }

        Some(ItemReport {
            id,
            outcome,
            completed: self.cursor,
            total: self.ids.len(),
        })
    }

    /// Steps until the batch finishes, reporting every item to `observer`.
    pub fn run(&mut self, observer: &mut dyn ProgressObserver) -> BatchSummary {
        while let Some(report) = self.step() {
            observer.on_item(&report);
        }
        let summary = self.summary();
        observer.on_finish(&summary);
        summary
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            state: self.state,
            total: self.ids.len(),
            succeeded: self.succeeded,
            failed: self.failed.clone(),
            skipped: self.ids.len() - self.cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetStatus;
    use crate::encoder::EncodeFailure;
    use crate::engine::LibraryPaths;
    use crate::registry::MemoryRegistry;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct StubEncoder;

    impl Encoder for StubEncoder {
        fn encode(&self, _: &DynamicImage, _: u32) -> Result<Vec<u8>, EncodeFailure> {
            Ok(b"RIFF\0\0\0\0WEBP".to_vec())
        }
    }

    #[derive(Default)]
    struct Recorder {
        reports: Vec<ItemReport>,
        finished: Option<BatchSummary>,
        cancel_after: Option<(usize, CancelToken)>,
    }

    impl ProgressObserver for Recorder {
        fn on_item(&mut self, report: &ItemReport) {
            self.reports.push(report.clone());
            if let Some((n, token)) = &self.cancel_after {
                if report.completed == *n {
                    token.cancel();
                }
            }
        }

        fn on_finish(&mut self, summary: &BatchSummary) {
            self.finished = Some(summary.clone());
        }
    }

    fn setup(count: usize) -> (TempDir, ConversionEngine<MemoryRegistry, StubEncoder>, Vec<PathBuf>) {
        let dir = TempDir::new().unwrap();
        let media = dir.path().join("media");
        fs::create_dir_all(&media).unwrap();
        let engine = ConversionEngine::new(
            MemoryRegistry::new(),
            StubEncoder,
            LibraryPaths::new(&media, dir.path().join("backups")),
        );
        let mut paths = Vec::new();
        for i in 0..count {
            let path = media.join(format!("img{i}.png"));
            DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])))
                .save(&path)
                .unwrap();
            engine.registry().insert(&path, "image/png");
            paths.push(path);
        }
        (dir, engine, paths)
    }

    fn ids(n: i64) -> Vec<AssetId> {
        (1..=n).map(AssetId).collect()
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let (_dir, engine, _) = setup(0);
        let mut batch = Batch::new(&engine, BatchMode::Restore, CancelToken::new());
        assert!(!batch.start(Vec::new()));
        assert_eq!(batch.state(), BatchState::Idle);
        assert!(batch.step().is_none());

        let summary = batch.run(&mut NoProgress);
        assert_eq!(summary.state, BatchState::Idle);
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn failure_does_not_stop_the_batch() {
        let (_dir, engine, paths) = setup(3);
        fs::remove_file(&paths[1]).unwrap();

        let mut batch = Batch::new(&engine, BatchMode::Optimize { quality: 80 }, CancelToken::new());
        assert!(batch.start(ids(3)));
        let mut recorder = Recorder::default();
        let summary = batch.run(&mut recorder);

        let outcomes: Vec<_> = recorder.reports.iter().map(|r| (r.id, r.outcome.is_success())).collect();
        assert_eq!(
            outcomes,
            vec![(AssetId(1), true), (AssetId(2), false), (AssetId(3), true)]
        );
        assert!(matches!(
            recorder.reports[1].outcome,
            ItemOutcome::Failed { kind: ErrorKind::NotFound, .. }
        ));
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].id, AssetId(2));
        assert_eq!(summary.failed[0].kind, ErrorKind::NotFound);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.state, BatchState::Completed { with_errors: true });
        assert_eq!(recorder.finished, Some(summary));
    }

    #[test]
    fn progress_counts_advance_in_order() {
        let (_dir, engine, _) = setup(3);
        let mut batch = Batch::new(&engine, BatchMode::Optimize { quality: 70 }, CancelToken::new());
        batch.start(vec![AssetId(3), AssetId(1), AssetId(2)]);
        let mut recorder = Recorder::default();
        let summary = batch.run(&mut recorder);

        let seen: Vec<_> = recorder.reports.iter().map(|r| (r.id, r.completed, r.total)).collect();
        assert_eq!(
            seen,
            vec![(AssetId(3), 1, 3), (AssetId(1), 2, 3), (AssetId(2), 3, 3)]
        );
        assert_eq!(summary.state, BatchState::Completed { with_errors: false });
    }

    #[test]
    fn cancel_between_items() {
        let (_dir, engine, _) = setup(5);
        let token = CancelToken::new();
        let mut batch = Batch::new(&engine, BatchMode::Optimize { quality: 80 }, token.clone());
        batch.start(ids(5));
        let mut recorder = Recorder {
            cancel_after: Some((2, token)),
            ..Recorder::default()
        };
        let summary = batch.run(&mut recorder);

        assert_eq!(summary.state, BatchState::Cancelled);
        assert_eq!(summary.processed(), 2);
        assert_eq!(summary.skipped, 3);
        assert_eq!(recorder.reports.len(), 2);

        let ledger = engine.ledger();
        for id in ids(5) {
            let expected = if id.0 <= 2 {
                AssetStatus::Converted
            } else {
                AssetStatus::Pending
            };
            assert_eq!(ledger.status_of(id).unwrap(), expected);
        }
    }

    #[test]
    fn cancel_after_last_item_still_completes() {
        let (_dir, engine, _) = setup(2);
        let token = CancelToken::new();
        let mut batch = Batch::new(&engine, BatchMode::Optimize { quality: 80 }, token.clone());
        batch.start(ids(2));
        let mut recorder = Recorder {
            cancel_after: Some((2, token)),
            ..Recorder::default()
        };
        let summary = batch.run(&mut recorder);
        assert_eq!(summary.state, BatchState::Completed { with_errors: false });
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn restore_batch_reverses_optimize_batch() {
        let (_dir, engine, paths) = setup(3);
        let mut optimize = Batch::new(&engine, BatchMode::Optimize { quality: 80 }, CancelToken::new());
        optimize.start(ids(3));
        assert_eq!(optimize.run(&mut NoProgress).succeeded, 3);

        let restorable = engine.ledger().list_assets().unwrap().restorable_ids();
        assert_eq!(restorable, ids(3));

        let mut restore = Batch::new(&engine, BatchMode::Restore, CancelToken::new());
        restore.start(restorable);
        let summary = restore.run(&mut NoProgress);
        assert_eq!(summary.succeeded, 3);
        for path in &paths {
            assert!(path.is_file());
        }
        assert_eq!(engine.ledger().list_assets().unwrap().pending_ids(), ids(3));
    }

    #[test]
    fn restore_batch_reports_no_backup_per_item() {
        let (_dir, engine, _) = setup(2);
        let mut batch = Batch::new(&engine, BatchMode::Restore, CancelToken::new());
        batch.start(ids(2));
        let summary = batch.run(&mut NoProgress);
        assert_eq!(summary.succeeded, 0);
        assert!(summary.failed.iter().all(|f| f.kind == ErrorKind::NoBackup));
        assert_eq!(summary.state, BatchState::Completed { with_errors: true });
    }

    #[test]
    fn started_batch_cannot_be_restarted() {
        let (_dir, engine, _) = setup(1);
        let mut batch = Batch::new(&engine, BatchMode::Optimize { quality: 80 }, CancelToken::new());
        assert!(batch.start(ids(1)));
        assert!(!batch.start(ids(1)));
        assert_eq!(batch.total(), 1);
        assert!(batch.step().is_some());
        assert!(batch.state().is_finished());
        assert!(batch.step().is_none());
        assert_eq!(batch.completed(), 1);
    }

    #[test]
    fn report_serializes_for_clients() {
        let report = ItemReport {
            id: AssetId(4),
            outcome: ItemOutcome::Failed {
                kind: ErrorKind::BackupMissing,
                message: "gone".to_string(),
                resource_exhausted: false,
            },
            completed: 1,
            total: 2,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["id"], 4);
        assert_eq!(json["outcome"]["result"], "failed");
        assert_eq!(json["outcome"]["kind"], "backup_missing");
    }
}
