use anyhow::{bail, Context, Result};
use kratos_bridge::{
    function_definitions, BridgeStatus, HistoryEntry, OperationBridge, RenderedResult,
    OPERATION_SPECS,
};
use serde::Serialize;
use serde_json::Value;

use crate::cli_args::CliCommand;
use crate::shell::run_shell;

pub(crate) async fn run_command(bridge: &OperationBridge, command: CliCommand, json: bool) -> Result<()> {
    match command {
        CliCommand::Catalog => println!("{}", render_catalog(json)),
        CliCommand::Status => println!("{}", render_status(&bridge.status().await, json)),
        CliCommand::Invoke { operation, params } => {
            let parameters: Value = serde_json::from_str(&params)
                .with_context(|| format!("--params must be a JSON object, got '{params}'"))?;
            let input_message = format!("invoke {operation} --params {params}");
            let rendered = bridge
                .dispatch_text_for(&input_message, &operation, parameters)
                .await;
            println!("{}", render_result(&rendered, json));
            if !rendered.result.is_success() {
                bail!("operation '{}' failed", rendered.result.operation);
            }
        }
        CliCommand::Shell => run_shell(bridge, json).await?,
    }
    Ok(())
}

pub(crate) fn render_catalog(json: bool) -> String {
    if json {
        return pretty(&function_definitions());
    }
    let width = OPERATION_SPECS
        .iter()
        .map(|spec| spec.name.len())
        .max()
        .unwrap_or_default();
    OPERATION_SPECS
        .iter()
        .map(|spec| {
            let parameters = spec
                .parameters
                .iter()
                .map(|parameter| {
                    if parameter.required {
                        parameter.name.to_string()
                    } else {
                        format!("[{}]", parameter.name)
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            format!("{:width$}  {}\n{:width$}  args: {}", spec.name, spec.description, "", parameters)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn render_status(status: &BridgeStatus, json: bool) -> String {
    if json {
        return pretty(status);
    }
    format!(
        "initialized: {}\nactive cluster: {}\nclusters: {}\nrunning tasks: {}\nhistory entries: {}",
        status.initialized,
        if status.active_cluster.is_empty() {
            "-"
        } else {
            status.active_cluster.as_str()
        },
        status.available_clusters.join(", "),
        status.running_task_count,
        status.history_count
    )
}

pub(crate) fn render_result(rendered: &RenderedResult, json: bool) -> String {
    if json {
        pretty(&rendered.result)
    } else {
        rendered.summary.clone()
    }
}

pub(crate) fn render_history(entries: &[HistoryEntry], json: bool) -> String {
    if json {
        return pretty(&entries);
    }
    if entries.is_empty() {
        return "no operations yet".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            format!(
                "{} {} [{}] {}",
                entry.timestamp,
                entry.operation_name,
                entry.result.cluster_context,
                if entry.result.is_success() {
                    "success".to_string()
                } else {
                    format!("error: {}", entry.result.message.as_deref().unwrap_or_default())
                }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"))
}
