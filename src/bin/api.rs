use reconciliation_gateway::{
    api::start_server,
    audit::JsonlAuditSink,
    downstream::HttpDownstream,
    ActionGateway, GatewayConfig,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;

    info!(
        writes_enabled = config.writes_enabled,
        downstream = %config.downstream_base_url,
        timeout_ms = config.downstream_timeout.as_millis() as u64,
        audit_log = %config.audit_log_path.display(),
        "Reconciliation Action Gateway - API Server"
    );

    let downstream = HttpDownstream::new(&config.downstream_base_url, config.downstream_timeout)?;
    let audit_sink = JsonlAuditSink::new(&config.audit_log_path);

    let gateway = ActionGateway::new(&config, Arc::new(downstream), Arc::new(audit_sink));

    start_server(gateway, config.port).await?;

    Ok(())
}
