use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use sidecar_sdk::SdkError;
use tracing::Level;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match commands::run_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let not_initialized = err
                .downcast_ref::<SdkError>()
                .is_some_and(SdkError::is_not_initialized);
            if not_initialized {
                eprintln!("Could not load {:?}", sidecar_sdk::MANIFEST_FILE);
                eprintln!("Use \"sidecar init\" if you have not yet done so.");
            } else {
                eprintln!("{} {err:#}", "error:".red().bold());
            }
            ExitCode::FAILURE
        }
    }
}
