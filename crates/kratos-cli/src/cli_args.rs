use std::path::PathBuf;

use clap::{Parser, Subcommand};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "kratos",
    about = "Multi-cluster Kubernetes operations from the command line",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "KRATOS_KUBECONFIG",
        global = true,
        help = "Kubeconfig path; defaults to KUBECONFIG or ~/.kube/config"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long = "request-timeout-ms",
        env = "KRATOS_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        global = true,
        help = "Upper bound for every cluster API call"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "system-namespace",
        env = "KRATOS_SYSTEM_NAMESPACE",
        default_value = "kube-system",
        global = true,
        help = "Namespace whose pods feed the health score"
    )]
    pub system_namespace: String,

    #[arg(
        long = "audit-log",
        env = "KRATOS_AUDIT_LOG",
        global = true,
        help = "Optional NDJSON file mirroring every dispatched operation"
    )]
    pub audit_log: Option<PathBuf>,

    #[arg(
        long = "log-filter",
        env = "RUST_LOG",
        global = true,
        help = "tracing filter directives, e.g. 'info' or 'kratos_ops=debug'"
    )]
    pub log_filter: Option<String>,

    #[arg(long, global = true, help = "Print structured JSON instead of text summaries")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum CliCommand {
    /// Print the operation catalog
    Catalog,
    /// Print bridge status and registered clusters
    Status,
    /// Run a single operation
    Invoke {
        /// Operation name, e.g. listPods or get_pods
        operation: String,
        #[arg(long, default_value = "{}", help = "Operation parameters as a JSON object")]
        params: String,
    },
    /// Start the interactive shell (default)
    Shell,
}
