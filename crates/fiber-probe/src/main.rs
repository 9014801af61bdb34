use envconfig::Envconfig;
use fiber_core::config::{ProbeConfig, TelemetryConfig};
use fiber_probe::ProbeAgent;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let telemetry = TelemetryConfig::init_from_env().expect("invalid telemetry configuration");
    fiber_core::telemetry::init(&telemetry);

    let config = ProbeConfig::init_from_env().expect("invalid probe configuration (NODE_ID/REGION/COUNTRY/API_ENDPOINT required)");
    let agent = ProbeAgent::new(config);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    agent.run(cancel).await;
}
