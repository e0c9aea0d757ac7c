//! One-shot CLI: `gateway reconcile session 1`

use reconciliation_gateway::{
    audit::JsonlAuditSink,
    downstream::HttpDownstream,
    ActionGateway, GatewayConfig,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let text = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if text.trim().is_empty() {
        eprintln!("usage: gateway <request text>, e.g. gateway reconcile session 1");
        return Ok(ExitCode::from(2));
    }

    let config = GatewayConfig::from_env()?;
    let downstream = HttpDownstream::new(&config.downstream_base_url, config.downstream_timeout)?;
    let gateway = ActionGateway::new(
        &config,
        Arc::new(downstream),
        Arc::new(JsonlAuditSink::new(&config.audit_log_path)),
    );

    let response = gateway.handle_text(text).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
