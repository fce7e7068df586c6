use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::registry::ToolRegistry;
use crate::source::{QueryError, QuerySource, StreamOptions};
use crate::tool::{ToolCtx, ToolError};

/// A tool name plus its raw arguments, as carried by `tools/call` params.
///
/// Arguments stay untyped here; each tool decodes them against its own
/// argument type, where absent or `null` means no arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug)]
pub struct ToolOutcome {
    pub tool: String,
    pub elapsed: Duration,
    pub result: Result<Value, ToolError>,
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }
}

/// Resolves invocations against the registry and runs them on a query source.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    source: Arc<dyn QuerySource>,
    metrics: Arc<Metrics>,
    tool_timeout: Duration,
    stream: StreamOptions,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        source: Arc<dyn QuerySource>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            source,
            metrics,
            tool_timeout: Duration::from_secs(30),
            stream: StreamOptions::default(),
        }
    }

    pub fn from_config(
        registry: Arc<ToolRegistry>,
        source: Arc<dyn QuerySource>,
        metrics: Arc<Metrics>,
        config: &ServerConfig,
    ) -> Self {
        Self::new(registry, source, metrics)
            .with_tool_timeout(config.tool_timeout)
            .with_stream_options(config.stream_options())
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_stream_options(mut self, options: StreamOptions) -> Self {
        self.stream = options;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Runs one invocation to an outcome. Never fails: every problem is
    /// reported through [`ToolOutcome::result`].
    ///
    /// Exactly one completion is recorded in [`Metrics`], including when the
    /// returned future is dropped before it resolves.
    pub async fn invoke(&self, invocation: ToolInvocation, cancel: CancellationToken) -> ToolOutcome {
        let completion = Completion {
            metrics: &self.metrics,
            start: Instant::now(),
        };
        let ToolInvocation { name, arguments } = invocation;
        tracing::info!(tool = %name, "tool invocation");
        tracing::debug!(tool = %name, ?arguments, "tool arguments");

        let result = match self.registry.get(&name) {
            None => Err(ToolError::NotFound(name.clone())),
            Some(tool) => {
                // cancels anything the handler spawned once this call is over
                let token = cancel.child_token();
                let _stop = token.clone().drop_guard();
                let ctx = ToolCtx {
                    source: self.source.clone(),
                    cancel: token,
                    stream: self.stream,
                };
                let call = tokio::time::timeout(
                    self.tool_timeout,
                    tool.handler.call(&ctx, arguments),
                );
                tokio::select! {
                    res = call => res.unwrap_or(Err(ToolError::TimedOut(self.tool_timeout))),
                    _ = cancel.cancelled() => Err(ToolError::Query(QueryError::Cancelled)),
                }
            }
        };

        let elapsed = completion.start.elapsed();
        match &result {
            Ok(_) => tracing::info!(tool = %name, ?elapsed, "tool completed"),
            Err(e) if e.is_cancellation() => tracing::warn!(tool = %name, ?elapsed, "tool cancelled"),
            Err(e) => tracing::info!(tool = %name, ?elapsed, error = %e, "tool failed"),
        }
        ToolOutcome {
            tool: name,
            elapsed,
            result,
        }
    }

    /// Runs `invocations` concurrently, each under the per-tool timeout, and
    /// returns their outcomes in input order once all have finished.
    pub async fn invoke_all(
        &self,
        invocations: Vec<ToolInvocation>,
        cancel: CancellationToken,
    ) -> Vec<ToolOutcome> {
        let calls = invocations
            .into_iter()
            .map(|inv| self.invoke(inv, cancel.clone()));
        futures::future::join_all(calls).await
    }
}

struct Completion<'a> {
    metrics: &'a Metrics,
    start: Instant,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.metrics.record_completion(self.start.elapsed());
    }
}
