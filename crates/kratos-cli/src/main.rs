mod bootstrap;
mod cli_args;
mod commands;
mod shell;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap::{build_bridge, init_tracing};
use crate::cli_args::{Cli, CliCommand};
use crate::commands::run_command;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref());

    let command = cli.command.clone().unwrap_or(CliCommand::Shell);
    if command == CliCommand::Catalog {
        return run_command_without_cluster(command, cli.json).await;
    }

    let bridge = build_bridge(&cli).await?;
    let outcome = run_command(&bridge, command, cli.json).await;
    bridge.shutdown();
    outcome
}

/// The catalog is static, so it is printed without touching a kubeconfig.
async fn run_command_without_cluster(command: CliCommand, json: bool) -> Result<()> {
    let bridge = kratos_bridge::OperationBridge::new(kratos_bridge::BridgeConfig::default());
    run_command(&bridge, command, json).await
}
