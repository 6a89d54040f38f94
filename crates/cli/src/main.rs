//! Wishbox CLI - database migrations and development seeding.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! wishbox-cli migrate
//!
//! # Seed the database with demo data
//! wishbox-cli seed
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "wishbox-cli")]
#[command(author, version, about = "Wishbox CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed the database with demo users, lists, and wishes
    Seed,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let outcome: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Migrate => commands::migrate::run().await,
        Commands::Seed => commands::seed::run().await,
    };

    if let Err(err) = outcome {
        tracing::error!("command failed: {err}");
        std::process::exit(1);
    }
}
