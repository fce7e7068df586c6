//! A JSON-RPC tool server that answers `tools/list` and `tools/call` over
//! WebSocket or stdio, backed by a pluggable [`source::QuerySource`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use query_mcp::prelude::*;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ServerConfig::default();
//! let executor = ToolExecutor::from_config(
//!     Arc::new(default_registry()?),
//!     Arc::new(MockSource::new(config.query_latency)),
//!     Arc::new(Metrics::new()),
//!     &config,
//! );
//! let app = query_mcp::http::router(McpLayer::new(Arc::new(executor), McpLayerConfig::from(&config)));
//! let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod metrics;
pub mod prelude;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod session;
pub mod source;
pub mod tool;
pub mod tools;
#[cfg(feature = "http")] pub mod layer;
#[cfg(feature = "http")] pub mod http;
#[cfg(feature = "stdio")] pub mod stdio;

pub use config::ServerConfig;
pub use executor::{ToolExecutor, ToolInvocation, ToolOutcome};
pub use metrics::{Metrics, MetricsSnapshot};
pub use registry::ToolRegistry;
pub use session::{Session, SessionError};
#[cfg(feature = "http")] pub use layer::{McpLayer, McpLayerConfig};
