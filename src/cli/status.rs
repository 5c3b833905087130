use std::path::Path;

use anyhow::Result;
use console::style;
use webpkeep_core::{AssetStatus, Ledger};

use crate::context::require;
use crate::db::AuditRow;
use crate::util::format_size;

const RECENT_ACTIVITY: usize = 5;

pub fn run(cwd: &Path) -> Result<()> {
    let library = require(cwd)?;
    let listing = Ledger::new(&library.db).list_assets()?;
    let config = &library.config;

    eprintln!(
        "{} Library: {}",
        style("●").green(),
        style(library.root.display()).bold()
    );
    eprintln!("  Media:   {}", config.media_root.display());
    eprintln!("  Backups: {}", config.backup_root.display());
    eprintln!("  Quality: {}", config.quality);
    eprintln!("  Registered: {}", library.db.asset_count()?);

    for status in [
        AssetStatus::Pending,
        AssetStatus::Converted,
        AssetStatus::External,
        AssetStatus::Missing,
    ] {
        eprintln!("  {:<10} {}", format!("{status}:"), listing.count(status));
    }
    eprintln!(
        "  Saved:   {}",
        style(format_size(listing.total_bytes_saved())).bold()
    );

    if let Some(last) = library.db.last_audit_time("optimize")? {
        eprintln!("  Last optimized: {last}");
    }

    let audit = library.db.list_audit(None)?;
    if !audit.is_empty() {
        eprintln!("  Recent activity:");
        for row in audit.iter().rev().take(RECENT_ACTIVITY) {
            eprintln!("    {}", activity_line(row));
        }
    }

    Ok(())
}

fn activity_line(row: &AuditRow) -> String {
    let mut line = format!("{} {}", row.timestamp, row.operation);
    if let Some(id) = row.asset_id {
        line.push_str(&format!(" #{id}"));
    }
    if let Some(user) = &row.user {
        line.push_str(&format!(" ({user})"));
    }
    if let Some(detail) = &row.detail {
        line.push_str(&format!(": {detail}"));
    }
    line
}
