use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use futures::stream::FusedStream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFutureOwned};

use super::{Query, QueryError, QuerySource, Row};

/// A contiguous slice of a query result. `sequence` starts at zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamBatch {
    pub sequence: usize,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Upper bound on rows per batch; zero is treated as one.
    pub batch_size: usize,
    /// Delay between two consecutive batches.
    pub pacing: Duration,
    /// Number of batches the producer may run ahead of the consumer.
    pub capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            pacing: Duration::from_millis(20),
            capacity: 10,
        }
    }
}

/// Runs `query` on a producer task and returns the batches as a stream.
///
/// The producer materializes the full result once and then emits it in
/// order, at most `options.batch_size` rows at a time. It stops at the next
/// yield point once `cancel` fires or the returned stream is dropped, and its
/// sender is dropped exactly once when the task ends.
pub fn execute_streaming(
    source: Arc<dyn QuerySource>,
    query: Query,
    options: StreamOptions,
    cancel: CancellationToken,
) -> BatchStream {
    let (tx, rx) = mpsc::channel(options.capacity.max(1));
    let token = cancel.child_token();
    tokio::spawn(produce(source, query, options, tx, token.clone()));
    BatchStream {
        rx,
        cancelled: Box::pin(token.clone().cancelled_owned()),
        done: false,
        _stop_producer: token.drop_guard(),
    }
}

async fn produce(
    source: Arc<dyn QuerySource>,
    query: Query,
    options: StreamOptions,
    tx: mpsc::Sender<Result<StreamBatch, QueryError>>,
    cancel: CancellationToken,
) {
    let result = match source.execute(&query, &cancel).await {
        Ok(result) => result,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            return;
        }
    };

    let batch_size = options.batch_size.max(1);
    let total = result.rows.len().div_ceil(batch_size);
    for (sequence, chunk) in result.rows.chunks(batch_size).enumerate() {
        let batch = StreamBatch {
            sequence,
            rows: chunk.to_vec(),
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = tx.try_send(Err(QueryError::Cancelled));
                return;
            }
            sent = tx.send(Ok(batch)) => {
                if sent.is_err() {
                    // receiver gone
                    return;
                }
            }
        }
        if sequence + 1 < total {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = tx.try_send(Err(QueryError::Cancelled));
                    return;
                }
                _ = tokio::time::sleep(options.pacing) => {}
            }
        }
    }
}

/// Consumer side of a streaming query.
///
/// Yields batches in sequence order. A failure (including cancellation) is
/// yielded at most once and ends the stream; nothing buffered behind a
/// cancellation is observed.
pub struct BatchStream {
    rx: mpsc::Receiver<Result<StreamBatch, QueryError>>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    done: bool,
    _stop_producer: DropGuard,
}

impl BatchStream {
    fn finish(&mut self) {
        self.done = true;
        self.rx.close();
    }
}

impl Stream for BatchStream {
    type Item = Result<StreamBatch, QueryError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.finish();
            return Poll::Ready(Some(Err(QueryError::Cancelled)));
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(batch))) => Poll::Ready(Some(Ok(batch))),
            Poll::Ready(Some(Err(e))) => {
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for BatchStream {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockSource;
    use futures::StreamExt;

    fn source() -> Arc<dyn QuerySource> {
        Arc::new(MockSource::new(Duration::ZERO))
    }

    fn options(batch_size: usize) -> StreamOptions {
        StreamOptions {
            batch_size,
            pacing: Duration::from_millis(1),
            capacity: 2,
        }
    }

    #[tokio::test]
    async fn batches_partition_result_in_order() {
        let full = source()
            .execute(&Query::select("songs"), &CancellationToken::new())
            .await
            .unwrap();

        for batch_size in [1, 3, 5, 7, 20, 64] {
            let batches: Vec<_> = execute_streaming(
                source(),
                Query::select("songs"),
                options(batch_size),
                CancellationToken::new(),
            )
            .map(|b| b.unwrap())
            .collect()
            .await;

            assert_eq!(batches.len(), full.row_count.div_ceil(batch_size));
            assert!(batches.iter().all(|b| b.rows.len() <= batch_size));
            let seqs: Vec<_> = batches.iter().map(|b| b.sequence).collect();
            assert_eq!(seqs, (0..batches.len()).collect::<Vec<_>>());
            let rows: Vec<Row> = batches.into_iter().flat_map(|b| b.rows).collect();
            assert_eq!(rows, full.rows);
        }
    }

    #[tokio::test]
    async fn unsupported_query_is_yielded_once() {
        let mut stream = execute_streaming(
            source(),
            Query::select("merch"),
            options(5),
            CancellationToken::new(),
        );
        assert!(matches!(stream.next().await, Some(Err(QueryError::Unsupported(_)))));
        assert!(stream.next().await.is_none());
        assert!(stream.is_terminated());
    }

    #[tokio::test]
    async fn cancellation_after_first_batch_stops_delivery() {
        let cancel = CancellationToken::new();
        let mut stream = execute_streaming(
            source(),
            Query::select("songs"),
            StreamOptions {
                batch_size: 2,
                pacing: Duration::ZERO,
                capacity: 10,
            },
            cancel.clone(),
        );
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.sequence, 0);

        // let the producer run ahead and fill the buffer
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(stream.next().await, Some(Err(QueryError::Cancelled)));
        assert!(stream.next().await.is_none());
    }
}
