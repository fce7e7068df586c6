//! Walks a running query-mcp server: lists tools, calls each catalogue tool
//! once, runs a streaming query and finishes with a deliberate error.

use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Parser, Debug)]
#[command(name = "simple-client", about = "Example client for the query-mcp server")]
struct Args {
    #[arg(long, env = "QUERY_MCP_URL", default_value = "ws://localhost:9000/mcp")]
    url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
    let args = Args::parse();

    let (mut ws, _) = tokio_tungstenite::connect_async(args.url.as_str())
        .await
        .with_context(|| format!("connecting to {}", args.url))?;
    info!(url = %args.url, "connected");

    let identity = read_json(&mut ws).await?;
    info!(server = %identity["result"]["serverInfo"], "server identity");

    let tools = request(&mut ws, "tools/list", None).await?;
    let tools = tools["result"]["tools"].as_array().cloned().unwrap_or_default();
    info!(count = tools.len(), "available tools");
    for tool in &tools {
        info!("  - {}: {}", tool["name"].as_str().unwrap_or("?"), tool["description"].as_str().unwrap_or(""));
    }

    for (tool, arguments) in [
        ("list_tables", json!({})),
        ("query_albums", json!({})),
        ("query_songs", json!({"album_id": "ALB005", "min_streams": 1000})),
        ("analyze_tours", json!({})),
        ("streaming_query", json!({"table": "songs"})),
    ] {
        let start = Instant::now();
        let reply = call(&mut ws, tool, arguments).await?;
        if let Some(err) = reply.get("error") {
            bail!("{tool} failed: {err}");
        }
        info!(tool, elapsed = ?start.elapsed(), result = %reply["result"], "call completed");
    }

    let reply = call(&mut ws, "streaming_query", json!({"table": "merch"})).await?;
    info!(error = %reply["error"], "expected error");

    ws.close(None).await?;
    Ok(())
}

async fn call(ws: &mut Socket, tool: &str, arguments: Value) -> anyhow::Result<Value> {
    request(ws, "tools/call", Some(json!({"name": tool, "arguments": arguments}))).await
}

async fn request(ws: &mut Socket, method: &str, params: Option<Value>) -> anyhow::Result<Value> {
    let id = uuid::Uuid::new_v4().to_string();
    let mut envelope = json!({"jsonrpc": "2.0", "id": id, "method": method});
    if let Some(params) = params {
        envelope["params"] = params;
    }
    ws.send(Message::Text(envelope.to_string())).await?;
    // requests are sent one at a time, but skip anything not addressed to us
    loop {
        let reply = read_json(ws).await?;
        if reply["id"] == id.as_str() {
            return Ok(reply);
        }
    }
}

async fn read_json(ws: &mut Socket) -> anyhow::Result<Value> {
    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => return Ok(serde_json::from_str(&text)?),
            Message::Close(_) => break,
            _ => {}
        }
    }
    bail!("server closed the connection")
}
