use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use query_mcp::prelude::*;
use query_mcp::source::StreamOptions;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Stall;
#[async_trait]
impl ToolHandler for Stall {
    async fn call(&self, _ctx: &ToolCtx, _args: Value) -> Result<Value, ToolError> {
        futures::future::pending().await
    }
}

fn executor(stream: StreamOptions) -> Arc<ToolExecutor> {
    let mut registry = default_registry().unwrap();
    registry
        .insert(ToolDescriptor {
            name: "stall",
            description: "never returns",
            input_schema: schemars::schema_for!(serde_json::Value),
            handler: Arc::new(Stall),
        })
        .unwrap();
    Arc::new(
        ToolExecutor::new(
            Arc::new(registry),
            Arc::new(MockSource::new(Duration::from_millis(2))),
            Arc::new(Metrics::new()),
        )
        .with_stream_options(stream),
    )
}

fn fast() -> StreamOptions {
    StreamOptions {
        batch_size: 5,
        pacing: Duration::from_millis(1),
        capacity: 4,
    }
}

struct Client {
    tx: UnboundedSender<String>,
    rx: UnboundedReceiver<String>,
    done: JoinHandle<Result<(), SessionError>>,
}

impl Client {
    fn connect(session: Session) -> Self {
        let (tx, in_rx) = mpsc::unbounded::<String>();
        let (out_tx, rx) = mpsc::unbounded::<String>();
        let done = tokio::spawn(async move {
            let res = session.run(in_rx.map(Ok::<_, Infallible>), out_tx).await;
            session.drain().await;
            res
        });
        Self { tx, rx, done }
    }

    fn send(&self, frame: Value) {
        self.tx.unbounded_send(frame.to_string()).unwrap();
    }

    fn call(&self, id: &str, tool: &str, arguments: Value) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": tool, "arguments": arguments},
        }));
    }

    async fn recv(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.rx.next())
            .await
            .expect("response in time")
            .expect("session still writing");
        serde_json::from_str(&frame).unwrap()
    }

    async fn handshake(&mut self) -> Value {
        let identity = self.recv().await;
        assert_eq!(identity["result"]["capabilities"]["tools"], json!({}));
        identity
    }
}

#[tokio::test]
async fn concurrent_calls_each_get_exactly_one_response() {
    let ex = executor(fast());
    let mut client = Client::connect(Session::new(ex.clone()));
    client.handshake().await;

    const N: usize = 25;
    for i in 0..N {
        let tool = ["query_albums", "query_songs", "analyze_tours", "list_tables"][i % 4];
        client.call(&format!("c{i}"), tool, json!({}));
    }
    let mut seen = HashSet::new();
    for _ in 0..N {
        let reply = client.recv().await;
        assert!(reply.get("error").is_none(), "{reply}");
        assert!(seen.insert(reply["id"].as_str().unwrap().to_string()));
    }
    let expected: HashSet<_> = (0..N).map(|i| format!("c{i}")).collect();
    assert_eq!(seen, expected);

    drop(client.tx);
    assert!(client.done.await.unwrap().is_ok());
    let snap = ex.metrics().snapshot();
    assert_eq!(snap.queries_executed, N as u64);
    assert_eq!(snap.active_tasks, 0);
}

#[tokio::test]
async fn failures_count_toward_completions() {
    let ex = executor(fast());
    let mut client = Client::connect(Session::new(ex.clone()));
    client.handshake().await;

    for i in 0..3 {
        client.call(&format!("ok{i}"), "list_tables", json!({}));
    }
    client.call("e0", "no_such_tool", json!({}));
    client.call("e1", "streaming_query", json!({"table": "setlists"}));
    for _ in 0..5 {
        client.recv().await;
    }
    assert_eq!(ex.metrics().snapshot().queries_executed, 5);
}

#[tokio::test]
async fn faster_calls_overtake_slower_ones() {
    let ex = executor(StreamOptions {
        batch_size: 2,
        pacing: Duration::from_millis(60),
        capacity: 1,
    });
    let mut client = Client::connect(Session::new(ex));
    client.handshake().await;

    client.call("slow", "streaming_query", json!({"table": "songs"}));
    client.call("quick", "list_tables", json!({}));

    let first = client.recv().await;
    assert_eq!(first["id"], "quick");
    let second = client.recv().await;
    assert_eq!(second["id"], "slow");
    assert_eq!(second["result"]["batches"], 10);
    assert_eq!(second["result"]["total_rows"], 20);
}

#[tokio::test]
async fn error_responses_name_the_cause() {
    let mut client = Client::connect(Session::new(executor(fast())));
    client.handshake().await;

    client.call("unknown", "setlist_lookup", json!({}));
    let reply = client.recv().await;
    assert_eq!(reply["id"], "unknown");
    assert_eq!(reply["error"]["code"], -32000);
    assert!(reply["error"]["message"].as_str().unwrap().contains("setlist_lookup"));
    assert!(reply.get("result").is_none());

    client.call("args", "query_songs", json!({"min_streams": "lots"}));
    let reply = client.recv().await;
    assert_eq!(reply["error"]["code"], -32602);

    client.call("table", "streaming_query", json!({"table": "setlists"}));
    let reply = client.recv().await;
    assert_eq!(reply["error"]["code"], -32000);
    assert!(reply["error"]["message"].as_str().unwrap().contains("setlists"));
}

#[tokio::test]
async fn slow_call_times_out_and_session_keeps_serving() {
    let session = Session::new(executor(fast())).with_call_timeout(Duration::from_millis(100));
    let mut client = Client::connect(session);
    client.handshake().await;

    client.call("stuck", "stall", json!({}));
    let reply = client.recv().await;
    assert_eq!(reply["id"], "stuck");
    assert_eq!(reply["error"]["code"], -32000);
    assert!(reply["error"]["message"].as_str().unwrap().contains("timed out"));

    client.send(json!({"jsonrpc": "2.0", "id": "after", "method": "tools/list"}));
    let reply = client.recv().await;
    assert_eq!(reply["id"], "after");
    assert_eq!(reply["result"]["tools"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn outer_cancellation_reaches_streaming_calls() {
    let shutdown = CancellationToken::new();
    let ex = executor(StreamOptions {
        batch_size: 1,
        pacing: Duration::from_millis(50),
        capacity: 1,
    });
    let session = Session::new(ex).with_cancellation(shutdown.clone());
    let mut client = Client::connect(session);
    client.handshake().await;

    client.call("long", "streaming_query", json!({"table": "songs"}));
    tokio::time::sleep(Duration::from_millis(120)).await;
    shutdown.cancel();

    let reply = client.recv().await;
    assert_eq!(reply["id"], "long");
    assert_eq!(reply["error"]["message"], "query cancelled");
}

#[tokio::test]
async fn malformed_envelope_closes_only_that_session() {
    let ex = executor(fast());
    let mut broken = Client::connect(Session::new(ex.clone()));
    let mut healthy = Client::connect(Session::new(ex));
    broken.handshake().await;
    healthy.handshake().await;

    broken.tx.unbounded_send("{\"id\": 7".into()).unwrap();
    let res = broken.done.await.unwrap();
    assert!(matches!(res, Err(SessionError::Malformed(_))));

    healthy.call("still", "list_tables", json!({}));
    assert_eq!(healthy.recv().await["id"], "still");
}

#[tokio::test]
async fn envelope_missing_method_is_malformed() {
    let mut client = Client::connect(Session::new(executor(fast())));
    client.handshake().await;
    client.send(json!({"jsonrpc": "2.0", "id": "x"}));
    assert!(matches!(client.done.await.unwrap(), Err(SessionError::Malformed(_))));
}
