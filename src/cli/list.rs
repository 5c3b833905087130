use std::path::Path;

use anyhow::Result;
use console::style;
use webpkeep_core::{AssetStatus, AssetSummary, Ledger, Listing};

use crate::context::require;
use crate::util::format_size;

pub fn run(cwd: &Path, json: bool) -> Result<()> {
    let library = require(cwd)?;
    let listing = Ledger::new(&library.db).list_assets()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        print_listing(&listing);
    }
    Ok(())
}

fn print_listing(listing: &Listing) {
    if listing.pending.is_empty() && listing.other.is_empty() {
        eprintln!("No images registered. Run 'wpk scan' to add some.");
        return;
    }

    println!("{}", style(format!("Pending ({})", listing.pending.len())).bold());
    for item in &listing.pending {
        println!("  {}", row(item));
    }

    println!("{}", style(format!("Managed ({})", listing.other.len())).bold());
    for item in &listing.other {
        println!("  {}", row(item));
    }
}

fn row(item: &AssetSummary) -> String {
    let id = format!("#{}", item.id);
    let note = match item.status {
        AssetStatus::Pending => String::new(),
        AssetStatus::Converted => {
            let saved = item.bytes_saved.map_or_else(
                || "savings unknown".to_string(),
                |b| format!("saved {}", format_size(b)),
            );
            format!("{saved}, restorable")
        }
        AssetStatus::External => "optimized".to_string(),
        AssetStatus::Missing => "file missing".to_string(),
    };
    let status = match item.status {
        AssetStatus::Pending => style(item.status.to_string()).yellow(),
        AssetStatus::Converted => style(item.status.to_string()).green(),
        AssetStatus::External => style(item.status.to_string()).cyan(),
        AssetStatus::Missing => style(item.status.to_string()).red(),
    };
    format!(
        "{:<6} {:<40} {:<10} {}",
        style(id).dim(),
        item.filename,
        status,
        note
    )
    .trim_end()
    .to_string()
}
