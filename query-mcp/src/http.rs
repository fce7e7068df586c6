use std::future::ready;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::json;

use crate::layer::{McpLayer, McpState};
use crate::session::Session;

/// A router whose only behaviour is the MCP surface; unknown paths get 404.
pub fn router(layer: McpLayer) -> Router {
    Router::new()
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(layer)
}

pub async fn handle_upgrade(req: Request<Body>, state: McpState) -> Response {
    let (mut parts, _body) = req.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws.on_upgrade(move |socket| serve_socket(socket, state)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Runs one session over an upgraded socket.
///
/// Text frames carry envelopes. Binary frames are read as UTF-8 text,
/// ping/pong are left to the socket, and a close frame ends the session.
pub async fn serve_socket(socket: WebSocket, state: McpState) {
    let (sink, stream) = socket.split();
    let incoming = stream
        .take_while(|msg| ready(!matches!(msg, Ok(Message::Close(_)))))
        .filter_map(|msg| {
            ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });
    let outgoing = sink.with(|text: String| ready(Ok::<_, axum::Error>(Message::Text(text))));

    let session = Session::new(state.executor.clone())
        .with_call_timeout(state.call_timeout)
        .with_cancellation(state.shutdown.child_token());
    // the session logs its own close reason
    let _ = session.run(incoming, outgoing).await;
}

pub fn handle_metrics(state: &McpState) -> Response {
    Json(state.executor.metrics().snapshot()).into_response()
}

pub fn handle_health() -> Response {
    Json(json!({"status": "healthy"})).into_response()
}
