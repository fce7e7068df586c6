//! Per-connection request loop.
//!
//! A session sends the server identity, then reads one envelope per frame and
//! answers each on its own task. Responses are funneled through a single
//! writer task, so they leave in completion order rather than request order.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::executor::{ToolExecutor, ToolInvocation};
use crate::protocol::{server_identity, Envelope, ErrorCode, Response};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

pub struct Session {
    id: Uuid,
    executor: Arc<ToolExecutor>,
    call_timeout: Duration,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Session {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self {
            id: Uuid::new_v4(),
            executor,
            call_timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Ties in-flight calls to an outer token, e.g. server shutdown.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Serves the connection until the peer goes away or sends a frame that
    /// is not an envelope.
    ///
    /// Returns as soon as reading stops. Calls still running keep going in
    /// the background and their responses are written if the peer is still
    /// listening; use [`Session::drain`] to wait for them.
    pub async fn run<I, E, O>(&self, incoming: I, outgoing: O) -> Result<(), SessionError>
    where
        I: Stream<Item = Result<String, E>>,
        E: Display,
        O: Sink<String> + Send + 'static,
        O::Error: Display,
    {
        let session = self.id;
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        self.tasks.spawn(write_loop(session, rx, outgoing));

        tracing::info!(%session, "session opened");
        send(session, &tx, &server_identity());

        let mut incoming = std::pin::pin!(incoming);
        let outcome = loop {
            let frame = match incoming.next().await {
                None => break Ok(()),
                Some(Err(e)) => break Err(SessionError::Transport(e.to_string())),
                Some(Ok(frame)) => frame,
            };
            let envelope: Envelope = match serde_json::from_str(&frame) {
                Ok(envelope) => envelope,
                Err(e) => break Err(SessionError::Malformed(e)),
            };
            tracing::debug!(%session, id = %envelope.id, method = %envelope.method, "dispatch");

            let executor = self.executor.clone();
            let cancel = self.cancel.child_token();
            let call_timeout = self.call_timeout;
            let tx = tx.clone();
            self.tasks.spawn(async move {
                let metrics = executor.metrics().clone();
                let _task = metrics.track_task();
                let response = dispatch(&executor, envelope, call_timeout, cancel).await;
                send(session, &tx, &response);
            });
        };

        match &outcome {
            Ok(()) => tracing::info!(%session, "session closed by peer"),
            Err(e) => tracing::warn!(%session, error = %e, "session closed"),
        }
        outcome
    }

    /// Waits until every call and the writer spawned by [`Session::run`] have
    /// finished.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}

async fn dispatch(
    executor: &ToolExecutor,
    envelope: Envelope,
    call_timeout: Duration,
    cancel: CancellationToken,
) -> Response {
    let Envelope {
        id, method, params, ..
    } = envelope;
    match method.as_str() {
        "tools/list" => Response::success(id, executor.registry().to_json()),
        "tools/call" => {
            let invocation = match params.map(serde_json::from_value::<ToolInvocation>) {
                Some(Ok(invocation)) => invocation,
                Some(Err(e)) => {
                    return Response::error(id, ErrorCode::InvalidParams, format!("invalid params: {e}"))
                }
                None => return Response::error(id, ErrorCode::InvalidParams, "missing params"),
            };
            match tokio::time::timeout(call_timeout, executor.invoke(invocation, cancel.clone())).await {
                Ok(outcome) => match outcome.result {
                    Ok(value) => Response::success(id, value),
                    Err(e) => Response::error(id, e.code(), e.to_string()),
                },
                Err(_) => {
                    cancel.cancel();
                    tracing::warn!(%id, ?call_timeout, "call timed out");
                    Response::error(
                        id,
                        ErrorCode::ToolFailure,
                        format!("call timed out after {call_timeout:?}"),
                    )
                }
            }
        }
        other => Response::method_not_found(id, other),
    }
}

fn send(session: Uuid, tx: &mpsc::UnboundedSender<String>, response: &Response) {
    match serde_json::to_string(response) {
        Ok(text) => {
            // the writer is gone once the peer stopped listening
            if tx.send(text).is_err() {
                tracing::debug!(%session, id = %response.id, "response dropped after close");
            }
        }
        Err(e) => tracing::error!(%session, error = %e, "response serialization failed"),
    }
}

async fn write_loop<O>(session: Uuid, mut rx: mpsc::UnboundedReceiver<String>, outgoing: O)
where
    O: Sink<String>,
    O::Error: Display,
{
    let mut outgoing = std::pin::pin!(outgoing);
    while let Some(text) = rx.recv().await {
        if let Err(e) = outgoing.send(text).await {
            tracing::debug!(%session, error = %e, "write failed; discarding further responses");
            return;
        }
    }
    let _ = outgoing.close().await;
}
