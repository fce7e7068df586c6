use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};

use crate::config::ServerConfig;
use crate::executor::ToolExecutor;
use crate::http::{handle_health, handle_metrics, handle_upgrade};

#[derive(Clone, Debug)]
pub struct McpLayerConfig {
    /// WebSocket endpoint.
    pub path: String,
    pub metrics_path: String,
    pub health_path: String,
    pub call_timeout: Duration,
}

impl Default for McpLayerConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for McpLayerConfig {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            path: cfg.path.clone(),
            metrics_path: cfg.metrics_path.clone(),
            health_path: cfg.health_path.clone(),
            call_timeout: cfg.call_timeout,
        }
    }
}

/// State shared by every connection accepted through the layer.
#[derive(Clone)]
pub struct McpState {
    pub executor: Arc<ToolExecutor>,
    pub call_timeout: Duration,
    /// Cancelled on server shutdown; every session derives its calls from it.
    pub shutdown: CancellationToken,
}

/// Serves the WebSocket endpoint plus `/metrics` and `/health` in front of
/// an inner service; every other request passes through untouched.
#[derive(Clone)]
pub struct McpLayer {
    state: McpState,
    config: Arc<McpLayerConfig>,
}

impl McpLayer {
    pub fn new(executor: Arc<ToolExecutor>, config: McpLayerConfig) -> Self {
        let state = McpState {
            executor,
            call_timeout: config.call_timeout,
            shutdown: CancellationToken::new(),
        };
        Self {
            state,
            config: Arc::new(config),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.state.shutdown = shutdown;
        self
    }
}

impl<S> Layer<S> for McpLayer {
    type Service = McpService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        McpService {
            inner,
            state: self.state.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct McpService<S> {
    inner: S,
    state: McpState,
    config: Arc<McpLayerConfig>,
}

enum Route {
    Socket,
    Metrics,
    Health,
}

impl<S> McpService<S> {
    fn route(&self, req: &Request<Body>) -> Option<Route> {
        if req.method() != Method::GET {
            return None;
        }
        let path = req.uri().path();
        if path == self.config.path {
            Some(Route::Socket)
        } else if path == self.config.metrics_path {
            Some(Route::Metrics)
        } else if path == self.config.health_path {
            Some(Route::Health)
        } else {
            None
        }
    }
}

impl<S> Service<Request<Body>> for McpService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let route = self.route(&req);
        let mut inner = self.inner.clone();
        let state = self.state.clone();
        Box::pin(async move {
            match route {
                Some(Route::Socket) => Ok(handle_upgrade(req, state).await),
                Some(Route::Metrics) => Ok(handle_metrics(&state)),
                Some(Route::Health) => Ok(handle_health()),
                None => inner.call(req).await,
            }
        })
    }
}
