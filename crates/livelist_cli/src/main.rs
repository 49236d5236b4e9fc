//! livelist CLI
//!
//! Command-line tools for exercising the synchronization engine.
//!
//! # Commands
//!
//! - `replay` - Run a JSON scenario through a synced list
//! - `diff` - Print the edits between two document arrays
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// livelist command-line tools.
#[derive(Parser)]
#[command(name = "livelist")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario script through a synced list
    Replay {
        /// Path to the scenario script (JSON)
        script: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Only run the event loop on explicit tick/settle steps
        #[arg(short, long)]
        manual: bool,
    },

    /// Print the edits that turn one document array into another
    Diff {
        /// Old document array (JSON)
        old: PathBuf,

        /// New document array (JSON)
        new: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            script,
            format,
            manual,
        } => {
            commands::replay::run(&script, &format, manual)?;
        }
        Commands::Diff { old, new, format } => {
            commands::diff::run(&old, &new, &format)?;
        }
        Commands::Version => {
            println!("livelist CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("livelist core v{}", livelist_core::VERSION);
        }
    }

    Ok(())
}
