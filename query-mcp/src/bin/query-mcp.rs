use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use query_mcp::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "query-mcp", version, about = "JSON-RPC tool server over WebSocket or stdio")]
struct Cli {
    /// JSON file with server settings; flags below override it
    #[arg(long, env = "QUERY_MCP_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "QUERY_MCP_HOST")]
    host: Option<String>,
    #[arg(long, env = "PORT")]
    port: Option<u16>,
    #[arg(long, value_enum, default_value_t = Transport::Ws)]
    transport: Transport,
    /// Per-call deadline in milliseconds
    #[arg(long, env = "QUERY_MCP_CALL_TIMEOUT_MS")]
    call_timeout_ms: Option<u64>,
    /// Simulated backend latency in milliseconds
    #[arg(long, env = "QUERY_MCP_LATENCY_MS")]
    latency_ms: Option<u64>,
    #[arg(long, env = "QUERY_MCP_BATCH_SIZE")]
    batch_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transport {
    Ws,
    Stdio,
}

impl Cli {
    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
            }
            None => ServerConfig::default(),
        };
        if let Some(host) = &self.host {
            cfg.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(ms) = self.call_timeout_ms {
            cfg.call_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.latency_ms {
            cfg.query_latency = Duration::from_millis(ms);
        }
        if let Some(n) = self.batch_size {
            cfg.batch_size = n;
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.server_config()?;
    debug!(?config, "configuration loaded");

    let registry = Arc::new(default_registry()?);
    info!(tools = ?registry.names(), "tool registry ready");
    let executor = Arc::new(ToolExecutor::from_config(
        registry,
        Arc::new(MockSource::new(config.query_latency)),
        Arc::new(Metrics::new()),
        &config,
    ));

    match cli.transport {
        Transport::Stdio => {
            info!("serving on stdio");
            query_mcp::stdio::run_stdio(executor, config.call_timeout).await
        }
        Transport::Ws => serve_ws(executor, &config).await,
    }
}

async fn serve_ws(executor: Arc<ToolExecutor>, config: &ServerConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let layer = McpLayer::new(executor, McpLayerConfig::from(config)).with_shutdown(shutdown.clone());
    let app = query_mcp::http::router(layer);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %listener.local_addr()?, path = %config.path, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutting down");
            shutdown.cancel();
        })
        .await?;
    info!("server exited");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
