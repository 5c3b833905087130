use std::env;

use anyhow::Result;
use clap::Parser;

use webpkeep::cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cwd = env::current_dir()?;

    dispatch(cli.command, &cwd)
}

fn dispatch(command: Commands, cwd: &std::path::Path) -> Result<()> {
    match command {
        Commands::Init {
            media_root,
            backup_root,
            quality,
        } => webpkeep::cli::init::run(cwd, media_root.as_deref(), backup_root.as_deref(), quality),
        Commands::Scan { paths } => webpkeep::cli::scan::run(cwd, &paths),
        Commands::List { json } => webpkeep::cli::list::run(cwd, json),
        Commands::Optimize { ids, quality, json } => {
            webpkeep::cli::optimize::run(cwd, &ids, quality, json)
        }
        Commands::Restore {
            ids,
            all,
            yes,
            json,
        } => webpkeep::cli::restore::run(cwd, &ids, all, yes, json),
        Commands::Status => webpkeep::cli::status::run(cwd),
    }
}
