pub mod init;
pub mod list;
pub mod optimize;
pub mod progress;
pub mod restore;
pub mod scan;
pub mod status;

use clap::{Parser, Subcommand};
use webpkeep_core::AssetId;

#[derive(Parser)]
#[command(
    name = "wpk",
    about = "Lossy WebP optimization for media libraries, with reversible backups",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new library in the current directory
    Init {
        /// Directory holding the managed media (defaults to the current directory)
        #[arg(long)]
        media_root: Option<String>,
        /// Directory receiving original files (defaults to <media-root>/webp-backups)
        #[arg(long)]
        backup_root: Option<String>,
        /// Default encoding quality, 0-100
        #[arg(short, long)]
        quality: Option<u32>,
    },
    /// Register image files found under the media root
    Scan {
        /// Files or directories to scan (the whole media root if omitted)
        paths: Vec<String>,
    },
    /// List pending and managed assets
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Convert assets to WebP, archiving the originals
    Optimize {
        /// Asset ids (all pending assets if omitted)
        ids: Vec<AssetId>,
        /// Encoding quality, 0-100 (library default if omitted)
        #[arg(short, long)]
        quality: Option<u32>,
        /// Emit one JSON response per item and a JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Put archived originals back in place of their WebP versions
    Restore {
        /// Asset ids to restore
        ids: Vec<AssetId>,
        /// Restore every converted asset
        #[arg(long, conflicts_with = "ids")]
        all: bool,
        /// Skip the confirmation prompt for --all
        #[arg(short, long)]
        yes: bool,
        /// Emit one JSON response per item and a JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Show library settings and conversion totals
    Status,
}
