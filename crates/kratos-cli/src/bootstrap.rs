use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kratos_bridge::{BridgeConfig, OperationBridge};
use kratos_cluster::{load_kubeconfig, ClusterRegistry, ClusterRouter, KubeBackend, RouterConfig};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::Cli;

pub(crate) fn init_tracing(directives: Option<&str>) {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::WARN.into());
    let env_filter = match directives.map(str::trim).filter(|value| !value.is_empty()) {
        Some(directives) => builder.parse_lossy(directives),
        None => builder.from_env_lossy(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

pub(crate) fn router_config(cli: &Cli) -> RouterConfig {
    RouterConfig {
        request_timeout: Duration::from_millis(cli.request_timeout_ms),
        system_namespace: cli.system_namespace.clone(),
    }
}

pub(crate) fn bridge_config(cli: &Cli) -> BridgeConfig {
    BridgeConfig {
        audit_log: cli.audit_log.clone(),
        ..BridgeConfig::default()
    }
}

/// Discovers cluster contexts and connects a kube-backed bridge.
pub(crate) async fn build_bridge(cli: &Cli) -> Result<OperationBridge> {
    let kubeconfig =
        load_kubeconfig(cli.kubeconfig.as_deref()).context("failed to load kubeconfig")?;
    let registry =
        ClusterRegistry::from_kubeconfig(&kubeconfig).context("failed to discover cluster contexts")?;
    info!(clusters = registry.len(), active = registry.initial_active(), "discovered cluster contexts");

    let backend = Arc::new(KubeBackend::new(kubeconfig));
    let router = ClusterRouter::connect(registry, backend, router_config(cli))
        .await
        .context("failed to connect to the active cluster")?;
    Ok(OperationBridge::with_router(router, bridge_config(cli)))
}
