use std::io::{self, IsTerminal};
use std::thread;

use anyhow::{bail, Result};
use console::style;
use dialoguer::Confirm;
use serde::Serialize;
use tracing::warn;
use webpkeep_core::{
    AssetId, AssetRegistry, Batch, BatchMode, BatchState, BatchSummary, CancelToken,
    ConversionEngine, Encoder, ItemOutcome, ItemReport, OpResponse, ProgressObserver,
};

use crate::db::LibraryDb;
use crate::util::whoami;

/// Runs one batch to completion with console (or JSON) progress and audit rows.
///
/// Fails after the batch when any item failed so the exit status reflects it.
pub fn run_batch<R: AssetRegistry, E: Encoder>(
    engine: &ConversionEngine<R, E>,
    db: &LibraryDb,
    mode: BatchMode,
    ids: Vec<AssetId>,
    json: bool,
) -> Result<()> {
    let cancel = CancelToken::new();
    cancel_on_interrupt(cancel.clone());

    let mut batch = Batch::new(engine, mode, cancel.clone());
    if !batch.start(ids) {
        eprintln!("Nothing to do");
        return Ok(());
    }

    let mut observer = CliProgress {
        db,
        operation: operation_name(mode),
        user: whoami(),
        json,
        interactive: !json && io::stdin().is_terminal(),
        cancel,
    };
    let summary = batch.run(&mut observer);

    if !summary.failed.is_empty() {
        bail!("{} of {} item(s) failed", summary.failed.len(), summary.total);
    }
    Ok(())
}

pub const fn operation_name(mode: BatchMode) -> &'static str {
    match mode {
        BatchMode::Optimize { .. } => "optimize",
        BatchMode::Restore => "restore",
    }
}

struct CliProgress<'a> {
    db: &'a LibraryDb,
    operation: &'static str,
    user: String,
    json: bool,
    interactive: bool,
    cancel: CancelToken,
}

#[derive(Serialize)]
struct JsonItem<'a> {
    id: AssetId,
    completed: usize,
    total: usize,
    response: &'a OpResponse,
}

impl CliProgress<'_> {
    fn audit(&self, report: &ItemReport) {
        let detail = match &report.outcome {
            ItemOutcome::Succeeded => "ok".to_string(),
            ItemOutcome::Failed { kind, message, .. } => format!("{kind}: {message}"),
        };
        if let Err(e) = self.db.insert_audit(
            self.operation,
            Some(report.id),
            Some(&self.user),
            Some(&detail),
        ) {
            warn!(id = %report.id, error = %e, "failed to write audit entry");
        }
    }

    fn display_name(&self, id: AssetId) -> String {
        match self.db.get_asset(id) {
            Ok(Some(record)) => record.file_name(),
            _ => "?".to_string(),
        }
    }

    fn ask_to_stop(&self) {
        let stop = Confirm::new()
            .with_prompt("The disk looks full. Stop the batch?")
            .default(true)
            .interact_opt();
        match stop {
            Ok(Some(true)) => self.cancel.cancel(),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "prompt failed, stopping the batch");
                self.cancel.cancel();
            }
        }
    }
}

impl ProgressObserver for CliProgress<'_> {
    fn on_item(&mut self, report: &ItemReport) {
        self.audit(report);

        if self.json {
            let response = match &report.outcome {
                ItemOutcome::Succeeded => OpResponse::Success,
                ItemOutcome::Failed { kind, message, .. } => OpResponse::Error {
                    kind: *kind,
                    message: message.clone(),
                },
            };
            let item = JsonItem {
                id: report.id,
                completed: report.completed,
                total: report.total,
                response: &response,
            };
            match serde_json::to_string(&item) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to serialize progress"),
            }
            return;
        }

        let counter = style(format!("[{}/{}]", report.completed, report.total)).dim();
        let name = self.display_name(report.id);
        match &report.outcome {
            ItemOutcome::Succeeded => {
                eprintln!("{counter} #{} {name}: {}", report.id, style("ok").green());
            }
            ItemOutcome::Failed {
                kind,
                message,
                resource_exhausted,
            } => {
                eprintln!(
                    "{counter} #{} {name}: {}",
                    report.id,
                    style(format!("{kind}: {message}")).red()
                );
                if *resource_exhausted && self.interactive && report.completed < report.total {
                    self.ask_to_stop();
                }
            }
        }
    }

    fn on_finish(&mut self, summary: &BatchSummary) {
        if self.json {
            match serde_json::to_string(summary) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to serialize summary"),
            }
            return;
        }

        let headline = match summary.state {
            BatchState::Cancelled => style("Cancelled".to_string()).yellow(),
            BatchState::Completed { with_errors: true } => {
                style("Completed with errors".to_string()).red()
            }
            _ => style("Completed".to_string()).green(),
        };
        eprintln!(
            "{headline}: {} succeeded, {} failed, {} skipped",
            summary.succeeded,
            summary.failed.len(),
            summary.skipped
        );
        for failure in &summary.failed {
            eprintln!("  #{} {}: {}", failure.id, failure.kind, failure.message);
        }
    }
}

const INTERRUPT_NOTICE: &str = "Stopping after the current item. Pressing Ctrl-C again aborts \
immediately and is unsafe: the item in progress may be left half-moved between the media and \
backup trees.";

/// Cancels `token` on the first Ctrl-C; a second one exits immediately, even
/// in the middle of an item.
pub fn cancel_on_interrupt(token: CancelToken) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!(error = %e, "interrupt handling unavailable");
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            eprintln!("{} {INTERRUPT_NOTICE}", style("!").yellow());
            token.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("aborted during an item, its files may need manual cleanup");
                std::process::exit(130);
            }
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_notice_warns_that_second_abort_is_unsafe() {
        assert!(INTERRUPT_NOTICE.contains("after the current item"));
        assert!(INTERRUPT_NOTICE.contains("unsafe"));
    }

    #[test]
    fn operation_names() {
        assert_eq!(operation_name(BatchMode::Optimize { quality: 80 }), "optimize");
        assert_eq!(operation_name(BatchMode::Restore), "restore");
    }
}
