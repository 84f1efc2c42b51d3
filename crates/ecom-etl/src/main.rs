//! ecom-etl CLI - Main entry point

use clap::Parser;
use ecom_common::logging::{init_logging, LogConfig};
use ecom_etl::commands::run::RunOptions;
use ecom_etl::{Cli, Commands};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // Target URLs may come from .env; load it before clap reads the environment
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();

    // Environment variables take precedence over the verbose flag
    let log_config = LogConfig::for_cli(cli.verbose)
        .apply_env()
        .unwrap_or_else(|e| {
            eprintln!("Warning: ignoring invalid logging environment: {}", e);
            LogConfig::for_cli(cli.verbose)
        });

    // Keep the guard alive so file logs are flushed on exit
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    if let Err(e) = execute_command(cli.command, cli.verbose).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(command: Commands, verbose: bool) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            files,
            mysql_url,
            postgres_url,
            connect_timeout,
            dry_run,
            json,
        } => {
            ecom_etl::commands::run::run(RunOptions {
                files,
                mysql_url,
                postgres_url,
                connect_timeout,
                dry_run,
                json,
                verbose,
            })
            .await
        },

        Commands::Validate {
            files,
            contract,
            source,
        } => ecom_etl::commands::validate::run(&files, contract.contract(), source),

        Commands::Schema { dialect } => ecom_etl::commands::schema::run(dialect),
    }
}
