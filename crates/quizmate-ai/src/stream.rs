//! Streaming results: one response body, two independent views

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::providers::ChatProvider;
use crate::sse::FrameDecoder;
use crate::transport::ByteStream;

/// A stream of answer text fragments
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Resolves to the whole answer once the response is complete
pub type FullText = Pin<Box<dyn Future<Output = Result<String>> + Send>>;

type ChunkReceiver = UnboundedReceiver<Result<Vec<u8>>>;

/// Result of a streaming chat call.
///
/// `chunks` and `full_text` decode the same response independently: either
/// can be consumed, ignored, or dropped without affecting the other. The
/// network body is read once and released when both views are done with it.
pub struct StreamResult {
    /// Fragments in arrival order; single pass
    pub chunks: FragmentStream,
    /// Concatenation of every fragment `chunks` yields
    pub full_text: FullText,
    /// Cancels both views and releases the response body
    pub cancel: CancellationToken,
}

impl StreamResult {
    /// Start pumping `body` into two decoders. Must be called inside a
    /// tokio runtime.
    pub fn spawn(
        body: ByteStream,
        provider: &'static dyn ChatProvider,
        cancel: CancellationToken,
    ) -> Self {
        let (chunks_rx, full_rx) = tee(body, provider, cancel.clone());

        let chunks = Box::pin(decode(chunks_rx, provider));
        let full_text = Box::pin(async move {
            let mut fragments = Box::pin(decode(full_rx, provider));
            let mut text = String::new();
            while let Some(fragment) = fragments.next().await {
                text.push_str(&fragment?);
            }
            Ok::<_, Error>(text)
        });

        Self {
            chunks,
            full_text,
            cancel,
        }
    }

    /// Stop reading the response; unfinished views fail with `Error::Aborted`
    pub fn abort(&self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for StreamResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResult")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Read `body` once on a background task and replay every chunk to two
/// receivers. Reading stops at the `[DONE]` sentinel, whether or not the
/// views have caught up.
fn tee(
    mut body: ByteStream,
    provider: &'static dyn ChatProvider,
    cancel: CancellationToken,
) -> (ChunkReceiver, ChunkReceiver) {
    let (first_tx, first_rx) = mpsc::unbounded_channel();
    let (second_tx, second_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut sentinel = FrameDecoder::new(provider);
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Stream cancelled, releasing response body");
                    broadcast_error(&first_tx, &second_tx, || Error::Aborted);
                    break;
                }
                _ = both_closed(&first_tx, &second_tx) => {
                    tracing::debug!("Both stream views dropped, releasing response body");
                    break;
                }
                next = body.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    sentinel.feed(&bytes);
                    let first_open = first_tx.send(Ok(bytes.clone())).is_ok();
                    let second_open = second_tx.send(Ok(bytes)).is_ok();
                    if !first_open && !second_open {
                        break;
                    }
                    if sentinel.is_finished() {
                        tracing::debug!("Stream finished, releasing response body");
                        break;
                    }
                }
                Some(Err(e)) => {
                    let message = e.to_string();
                    tracing::error!("Streaming response failed: {}", message);
                    broadcast_error(&first_tx, &second_tx, || Error::Transport(message.clone()));
                    break;
                }
                None => break,
            }
        }
    });

    (first_rx, second_rx)
}

async fn both_closed<T>(first: &UnboundedSender<T>, second: &UnboundedSender<T>) {
    tokio::join!(first.closed(), second.closed());
}

fn broadcast_error(
    first: &UnboundedSender<Result<Vec<u8>>>,
    second: &UnboundedSender<Result<Vec<u8>>>,
    error: impl Fn() -> Error,
) {
    let _ = first.send(Err(error()));
    let _ = second.send(Err(error()));
}

/// Decode one replayed copy of the body into fragments. The receiver is
/// dropped as soon as decoding stops, which lets the pump finish early.
fn decode(
    mut rx: ChunkReceiver,
    provider: &'static dyn ChatProvider,
) -> impl Stream<Item = Result<String>> + Send {
    stream! {
        let mut decoder = FrameDecoder::new(provider);
        while let Some(chunk) = rx.recv().await {
            match chunk {
                Ok(bytes) => {
                    for fragment in decoder.feed(&bytes) {
                        yield Ok(fragment);
                    }
                    if decoder.is_finished() {
                        break;
                    }
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn frame(text: &str) -> Vec<u8> {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
        .into_bytes()
    }

    fn body_of(chunks: Vec<Result<Vec<u8>>>) -> ByteStream {
        Box::pin(futures::stream::iter(chunks))
    }

    /// Body that yields `chunks` and then stays open until dropped
    fn hanging_body(chunks: Vec<Vec<u8>>, dropped: Arc<AtomicBool>) -> ByteStream {
        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let flag = DropFlag(dropped);
        Box::pin(stream! {
            let _flag = flag;
            for chunk in chunks {
                yield Ok::<_, Error>(chunk);
            }
            futures::future::pending::<()>().await;
        })
    }

    fn spawn(body: ByteStream) -> StreamResult {
        StreamResult::spawn(body, Provider::OpenAI.api(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_both_views_see_same_fragments() {
        let result = spawn(body_of(vec![
            Ok(frame("a")),
            Ok(frame("b")),
            Ok(b"data: [DONE]\n".to_vec()),
        ]));

        let chunks: Vec<String> = result
            .chunks
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["a", "b"]);
        assert_eq!(result.full_text.await.unwrap(), "ab");
    }

    #[tokio::test]
    async fn test_full_text_without_reading_chunks() {
        let result = spawn(body_of(vec![Ok(frame("x")), Ok(frame("y"))]));
        drop(result.chunks);
        assert_eq!(result.full_text.await.unwrap(), "xy");
    }

    #[tokio::test]
    async fn test_chunks_without_awaiting_full_text() {
        let StreamResult { chunks, full_text, .. } =
            spawn(body_of(vec![Ok(frame("x")), Ok(b"data: [DONE]\n".to_vec())]));
        let collected: Vec<_> = chunks.collect().await;
        assert_eq!(collected.len(), 1);
        drop(full_text);
    }

    #[tokio::test]
    async fn test_transport_error_fails_each_view() {
        let result = spawn(body_of(vec![
            Ok(frame("partial")),
            Err(Error::Transport("connection reset".into())),
        ]));

        let chunks: Vec<Result<String>> = result.chunks.collect().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_deref().unwrap(), "partial");
        assert!(matches!(chunks[1], Err(Error::Transport(_))));

        assert!(matches!(result.full_text.await, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_cancel_aborts_views_and_releases_body() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut result = spawn(hanging_body(vec![frame("a")], dropped.clone()));

        assert_eq!(result.chunks.next().await.unwrap().unwrap(), "a");
        result.abort();

        assert!(matches!(result.chunks.next().await, Some(Err(Error::Aborted))));
        assert!(matches!(result.full_text.await, Err(Error::Aborted)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropping_both_views_releases_body() {
        let dropped = Arc::new(AtomicBool::new(false));
        let result = spawn(hanging_body(vec![frame("a")], dropped.clone()));
        drop(result.chunks);
        drop(result.full_text);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("body should be dropped once no view is left");
    }

    #[tokio::test]
    async fn test_done_releases_body_even_if_connection_stays_open() {
        let dropped = Arc::new(AtomicBool::new(false));
        let result = spawn(hanging_body(
            vec![frame("a"), b"data: [DONE]\n".to_vec()],
            dropped.clone(),
        ));

        assert_eq!(result.full_text.await.unwrap(), "a");
        let chunks: Vec<_> = result.chunks.collect().await;
        assert_eq!(chunks.len(), 1);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("body should be dropped after both views finished");
    }

    #[tokio::test]
    async fn test_done_releases_body_while_a_view_is_idle() {
        let dropped = Arc::new(AtomicBool::new(false));
        let result = spawn(hanging_body(
            vec![frame("a"), b"data: [DONE]\n".to_vec()],
            dropped.clone(),
        ));
        let StreamResult { chunks, full_text, .. } = result;

        // `chunks` stays alive but is never polled
        assert_eq!(full_text.await.unwrap(), "a");
        tokio::time::timeout(Duration::from_secs(1), async {
            while !dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("body should be dropped once the sentinel is read");

        let late: Vec<String> = chunks.map(|c| c.unwrap()).collect().await;
        assert_eq!(late, vec!["a"]);
    }
}
