use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "lotfinder")]
#[command(about = "Lot-file index and secure lookup service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rebuild the whole index from every allowed root
    Index,
    /// Re-scan only subtrees changed since the last index
    Incremental,
    /// Prune index entries whose files no longer exist on disk
    Validate,
    /// Look up every indexed file for a lot number
    Search {
        lot_number: String,
        /// Bypass the index and probe the shares live
        #[arg(long)]
        live: bool,
    },
    /// Authorize a path and stream the file to stdout
    Serve { file_path: String },
    /// Print aggregate index statistics
    Stats,
    /// Print configuration values
    PrintConfig,
}
