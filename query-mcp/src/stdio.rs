use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::executor::ToolExecutor;
use crate::session::Session;

/// Longest accepted request line, in bytes.
pub const MAX_LINE_LENGTH: usize = 1 << 20;

/// Serves one session over newline-delimited JSON on stdin/stdout.
pub async fn run_stdio(executor: Arc<ToolExecutor>, call_timeout: Duration) -> anyhow::Result<()> {
    serve_lines(executor, call_timeout, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Same as [`run_stdio`] over arbitrary byte streams. Waits for every
/// in-flight call to be answered before returning.
pub async fn serve_lines<R, W>(
    executor: Arc<ToolExecutor>,
    call_timeout: Duration,
    reader: R,
    writer: W,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let incoming = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let framed: FramedWrite<W, LinesCodec> = FramedWrite::new(writer, LinesCodec::new());
    let outgoing = SinkExt::<String>::sink_map_err(framed, anyhow::Error::from);

    let session = Session::new(executor).with_call_timeout(call_timeout);
    let result = session.run(incoming, outgoing).await;
    session.drain().await;
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::source::MockSource;
    use serde_json::Value;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn answers_every_line_then_exits_on_eof() {
        let executor = ToolExecutor::new(
            Arc::new(crate::tools::default_registry().unwrap()),
            Arc::new(MockSource::new(Duration::from_millis(1))),
            Arc::new(Metrics::new()),
        );
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":"1","method":"tools/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":"2","method":"tools/call","params":{"name":"analyze_tours","arguments":{}}}"#,
            "\n",
        );
        let (mut client, server_out) = tokio::io::duplex(64 * 1024);
        serve_lines(Arc::new(executor), Duration::from_secs(5), input.as_bytes(), server_out)
            .await
            .unwrap();

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        let lines: Vec<Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0]["result"]["serverInfo"].is_object());
        let tours = lines.iter().find(|l| l["id"] == "2").unwrap();
        assert_eq!(tours["result"]["summary"]["top_tour"], "The Eras Tour");
    }

    #[tokio::test]
    async fn overlong_line_ends_the_session() {
        let executor = ToolExecutor::new(
            Arc::new(crate::tools::default_registry().unwrap()),
            Arc::new(MockSource::new(Duration::from_millis(1))),
            Arc::new(Metrics::new()),
        );
        let input = vec![b'x'; MAX_LINE_LENGTH + 16];
        let (mut client, server_out) = tokio::io::duplex(64 * 1024);
        let res = serve_lines(Arc::new(executor), Duration::from_secs(5), &input[..], server_out).await;
        let err = res.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::session::SessionError>(),
            Some(crate::session::SessionError::Transport(_))
        ));

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        assert_eq!(out.lines().count(), 1);
    }
}
