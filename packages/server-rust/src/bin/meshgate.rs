//! meshgate binary: flag parsing, logging setup, server lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use meshgate_server::network::GatewayServer;
use meshgate_server::registry::discovery::{spawn_watcher, StaticDiscovery};
use meshgate_server::trace::LogSink;
use meshgate_server::{GatewayConfig, NetworkConfig};

#[derive(Debug, Parser)]
#[command(name = "meshgate", about = "Service-mesh gateway", version)]
struct Args {
    /// Bind address.
    #[arg(long, env = "MESHGATE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port (0 for OS-assigned).
    #[arg(long, env = "MESHGATE_PORT", default_value_t = 8080)]
    port: u16,

    /// Project label stamped onto trace events.
    #[arg(long, env = "MESHGATE_PROJECT", default_value = "meshgate")]
    project_name: String,

    /// This gateway's service name in traces.
    #[arg(long, env = "MESHGATE_SERVICE", default_value = "gateway")]
    service_name: String,

    /// Shared secret required in the Call-Service-Key header.
    /// Omit to disable the auth check.
    #[arg(long, env = "MESHGATE_CALL_SERVICE_KEY")]
    call_service_key: Option<String>,

    /// Per-request budget in seconds for outbound calls.
    #[arg(long, env = "MESHGATE_REQUEST_BUDGET_SECS", default_value_t = 10)]
    request_budget_secs: u64,

    /// Seed endpoint as `service=host:port`. Repeatable.
    #[arg(long = "endpoint", value_name = "SERVICE=HOST:PORT")]
    endpoints: Vec<String>,

    /// Allowed CORS origin. Repeatable; defaults to any origin.
    #[arg(long = "cors-origin", default_value = "*")]
    cors_origins: Vec<String>,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, env = "MESHGATE_JSON_LOGS")]
    json_logs: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Parses a `service=host:port` seed flag.
fn parse_endpoint(raw: &str) -> anyhow::Result<(String, String, u16)> {
    let (service, location) = raw
        .split_once('=')
        .with_context(|| format!("endpoint `{raw}` is missing `=`"))?;
    let (host, port) = location
        .rsplit_once(':')
        .with_context(|| format!("endpoint `{raw}` is missing `:port`"))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("endpoint `{raw}` has an invalid port"))?;
    if service.is_empty() || host.is_empty() {
        anyhow::bail!("endpoint `{raw}` has an empty service or host");
    }
    Ok((service.to_string(), host.to_string(), port))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    let seeds = args
        .endpoints
        .iter()
        .map(|raw| parse_endpoint(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let gateway = GatewayConfig {
        project_name: args.project_name,
        service_name: args.service_name,
        call_service_key: args.call_service_key,
        request_budget: Duration::from_secs(args.request_budget_secs),
        ..GatewayConfig::default()
    };
    let network = NetworkConfig {
        host: args.host,
        port: args.port,
        cors_origins: args.cors_origins,
        ..NetworkConfig::default()
    };

    let mut server = GatewayServer::new(&gateway, network, Arc::new(LogSink));

    if !seeds.is_empty() {
        info!(count = seeds.len(), "seeding registry from flags");
        spawn_watcher(StaticDiscovery::new(seeds), server.registry());
    }

    let port = server.start().await?;
    info!(port, "meshgate started");

    server
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
