use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands;

#[derive(Parser)]
#[command(name = "pickstream")]
#[command(about = "Stock-pick aggregation cache server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Path to the SQLite mention database
        #[arg(short, long, default_value = "database.db")]
        database: PathBuf,
    },
    /// Show the current top-mentioned instruments
    Status {
        /// Path to the SQLite mention database
        #[arg(short, long, default_value = "database.db")]
        database: PathBuf,
    },
}

pub async fn run() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, database } => {
            commands::serve::run(database, port).await;
        }
        Commands::Status { database } => {
            commands::status::run(database).await;
        }
    }
}
