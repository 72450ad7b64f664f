mod commands;
mod logging;
mod progress;

use std::io;
use std::process;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use lotfinder_core::storage::Database;
use lotfinder_core::{
    AppConfig, IndexStore, JobController, JobEvent, PathValidator, SearchService,
};
use tracing::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match lotfinder_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Index) => {
            if let Err(err) = run_reindex(&config, true) {
                error!("Error: {}", err);
            }
        }
        Some(Commands::Incremental) => {
            if let Err(err) = run_reindex(&config, false) {
                error!("Error: {}", err);
            }
        }
        Some(Commands::Validate) => {
            if let Err(err) = run_validate(&config) {
                error!("Error: {}", err);
            }
        }
        Some(Commands::Search { lot_number, live }) => {
            if let Err(err) = run_search(&config, &lot_number, live) {
                error!("Error: {}", err);
            }
        }
        Some(Commands::Serve { file_path }) => run_serve(&config, &file_path),
        Some(Commands::Stats) => {
            if let Err(err) = run_stats(&config) {
                error!("Error: {}", err);
            }
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn open_store(config: &AppConfig) -> Result<Arc<IndexStore>, Box<dyn std::error::Error>> {
    let db = Database::open(&config.database_path)?;
    Ok(Arc::new(IndexStore::open(db)?))
}

fn run_reindex(config: &AppConfig, full: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let controller = JobController::new(store, Arc::new(config.clone()))?;
    let events = controller.subscribe();

    let ack = if full {
        controller.trigger_full()
    } else {
        controller.trigger_incremental()
    };
    match ack {
        Ok(ack) => info!("{}", ack.message),
        Err(err) => {
            println!(
                "{}",
                serde_json::json!({ "accepted": false, "message": err.to_string() })
            );
            return Ok(());
        }
    }

    match progress::render_job(&events) {
        Some(JobEvent::Completed { records, .. }) => {
            println!();
            info!("{} records indexed", format!("{}", records).green());
        }
        Some(JobEvent::Failed { message }) => {
            error!("Indexing failed: {}", message.red());
        }
        Some(JobEvent::Cancelled { .. }) => {
            info!("Indexing cancelled");
        }
        _ => {}
    }

    Ok(())
}

fn run_validate(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let controller = JobController::new(store, Arc::new(config.clone()))?;

    match controller.run_validation() {
        Ok(report) => {
            println!(
                "{}",
                serde_json::json!({
                    "status": "ok",
                    "removed_count": report.removed_count,
                    "message": report.message,
                })
            );
        }
        Err(err) => {
            println!(
                "{}",
                serde_json::json!({ "status": "error", "message": err.to_string() })
            );
        }
    }

    Ok(())
}

fn run_search(
    config: &AppConfig,
    lot_number: &str,
    live: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let service = SearchService::new(store, Arc::new(config.clone()));

    let timeout = service.default_timeout();
    let result = service.search_all_files(lot_number, !live, timeout);

    if !result.has_results {
        info!("No files found for lot {}", lot_number.yellow());
    }
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

/// Streams the authorized file to stdout, or prints a structured error
/// envelope. All access goes through the path validator.
fn run_serve(config: &AppConfig, file_path: &str) {
    let validator = PathValidator::new(config);
    match validator.open(file_path) {
        Ok((mut file, resolved)) => {
            if let Err(err) = io::copy(&mut file, &mut io::stdout()) {
                error!("Error streaming {}: {}", resolved.path.display(), err);
                process::exit(1);
            }
        }
        Err(err) => {
            println!(
                "{}",
                serde_json::json!({ "status": "error", "message": err.to_string() })
            );
            process::exit(1);
        }
    }
}

fn run_stats(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let stats = store.stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
