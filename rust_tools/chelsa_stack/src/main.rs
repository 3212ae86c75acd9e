use chelsa_stack::catalog;
use chelsa_stack::cli::{Cli, Command, ListArgs, StackArgs};
use chelsa_stack::error::{Result, StackError};
use chelsa_stack::{fetch, pipeline};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use std::fs::File;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Command::Stack(args) => stack(args),
        Command::List(args) => list(args),
    }
}

fn stack(args: StackArgs) -> Result<()> {
    info!("=== CHELSA TraCE21k stack ===");

    let config = args.to_config()?;
    let output = args.output_path(chrono::Local::now().naive_local());

    info!(
        "Bounding box: ({}, {}, {}, {})",
        config.bbox.min_lon, config.bbox.min_lat, config.bbox.max_lon, config.bbox.max_lat
    );
    info!("Using {} fetch workers ({:?})", config.concurrency, config.source_mode);

    let rows = catalog::read_catalog(&args.catalog)?;

    match pipeline::run(&config, &rows, &output) {
        Ok(summary) => {
            info!(
                "Wrote {} bands ({}x{}) to {}",
                summary.band_labels.len(),
                summary.width,
                summary.height,
                summary.path.display()
            );
            info!("=== Done! ===");
            Ok(())
        }
        Err(StackError::NoBandsToWrite) => {
            warn!("No bands to write, no output file created");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn list(args: ListArgs) -> Result<()> {
    let client = fetch::http_client()?;
    let rows = catalog::fetch_listing(&client, catalog::LISTING_BASE_URL, &args.variable, args.limit)?;

    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            catalog::write_catalog(&rows, File::create(path)?)?;
            info!("Wrote {} catalog rows to {}", rows.len(), path.display());
        }
        None => catalog::write_catalog(&rows, std::io::stdout().lock())?,
    }
    Ok(())
}
