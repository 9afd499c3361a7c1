use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use uptime_operator::config::OperatorConfig;
use uptime_operator::controller::{run_controller, ControllerState};
use uptime_operator::rest_api::run_server;
use uptime_operator::service::UptimeCheckService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OperatorConfig::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    info!(
        "Starting uptime-operator v{} (provider: {:?}, deletes enabled: {})",
        env!("CARGO_PKG_VERSION"),
        config.uptime_provider,
        config.enable_deletes
    );

    let cancel = CancellationToken::new();
    let provider = config.provider_config().build()?;
    let notifier = config.notifier(cancel.clone())?;
    let service = UptimeCheckService::new(provider)
        .with_notifier(notifier)
        .with_deletes(config.enable_deletes);

    let client = Client::try_default().await?;
    let state = Arc::new(ControllerState::new(client, service));

    let ready = Arc::new(AtomicBool::new(false));
    let server = run_server(
        config.metrics_bind_address,
        config.health_probe_bind_address,
        ready.clone(),
    );

    let result = tokio::select! {
        res = run_controller(state, config.namespaces.clone(), ready) => res,
        res = server => res,
    };

    // abort pending notification waits
    cancel.cancel();
    if let Err(e) = &result {
        error!("uptime-operator stopped: {}", e);
    }
    info!("uptime-operator stopped");
    Ok(result?)
}
