// Streaming relay - moves a resolved result to the caller
//
// Stream results are copied chunk by chunk into a bounded sink so memory stays
// flat regardless of media size. Redirect and picker results are never copied;
// the caller gets the locator back. The source is closed on every exit path.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::stream::{ByteSource, ResolutionResult, CHUNK_SIZE};

/// Default amount of media buffered between source and caller
pub const DEFAULT_WINDOW_BYTES: usize = 4 * 1024 * 1024;

/// The consumer went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Sink closed by consumer")]
pub struct SinkClosed;

/// Where relayed bytes go
#[async_trait]
pub trait ByteSink: Send {
    /// Write one chunk, waiting for capacity
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed>;

    /// Report an upstream failure to the consumer
    async fn fail(&mut self, _error: io::Error) {}
}

#[derive(Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Source reached end of stream
    Completed { bytes: u64 },
    /// Caller left or the token fired; no further bytes were written
    Cancelled { bytes: u64 },
    /// Caller should fetch from this URL
    Redirect(String),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Picker result contained no entries")]
    EmptyPicker,

    #[error("Upstream stream failed after {bytes} bytes: {source}")]
    Upstream {
        bytes: u64,
        #[source]
        source: io::Error,
    },
}

/// Relay a resolution result into `sink` until done, cancelled, or failed
pub async fn relay(
    result: ResolutionResult,
    sink: &mut dyn ByteSink,
    cancel: &CancellationToken,
) -> Result<RelayOutcome, RelayError> {
    match result {
        ResolutionResult::Redirect(url) => Ok(RelayOutcome::Redirect(url)),
        ResolutionResult::Picker(urls) => urls
            .into_iter()
            .next()
            .map(RelayOutcome::Redirect)
            .ok_or(RelayError::EmptyPicker),
        ResolutionResult::Stream(mut handle) => {
            let outcome = copy(handle.source.as_mut(), sink, cancel).await;
            handle.source.close().await;

            match &outcome {
                Ok(RelayOutcome::Completed { bytes }) => info!(bytes, "Relay completed"),
                Ok(RelayOutcome::Cancelled { bytes }) => info!(bytes, "Relay cancelled, upstream closed"),
                Ok(RelayOutcome::Redirect(_)) => {}
                Err(e) => warn!("Relay failed: {}", e),
            }
            outcome
        }
    }
}

async fn copy(
    source: &mut dyn ByteSource,
    sink: &mut dyn ByteSink,
    cancel: &CancellationToken,
) -> Result<RelayOutcome, RelayError> {
    let mut bytes: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(RelayOutcome::Cancelled { bytes }),
            next = source.next_chunk() => next,
        };

        let mut chunk = match next {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return Ok(RelayOutcome::Completed { bytes }),
            Err(e) => {
                sink.fail(io::Error::new(e.kind(), e.to_string())).await;
                return Err(RelayError::Upstream { bytes, source: e });
            }
        };

        // Re-chunk so the sink window is measured in bounded pieces
        while !chunk.is_empty() {
            let piece = chunk.split_to(chunk.len().min(CHUNK_SIZE));
            let len = piece.len() as u64;

            let written = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SinkClosed),
                written = sink.write(piece) => written,
            };
            if written.is_err() {
                debug!(bytes, "Consumer gone, stopping relay");
                return Ok(RelayOutcome::Cancelled { bytes });
            }
            bytes += len;
        }
    }
}

/// Sink backed by a bounded channel; the paired [`ChannelBody`] feeds the HTTP response
pub struct ChannelSink {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

#[async_trait]
impl ByteSink for ChannelSink {
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.tx.send(Ok(chunk)).await.map_err(|_| SinkClosed)
    }

    async fn fail(&mut self, error: io::Error) {
        let _ = self.tx.send(Err(error)).await;
    }
}

/// Discards everything. For results that only carry a locator.
pub struct NullSink;

#[async_trait]
impl ByteSink for NullSink {
    async fn write(&mut self, _chunk: Bytes) -> Result<(), SinkClosed> {
        Ok(())
    }
}

/// Receiving half. Dropping it (client disconnect) fires the relay's token.
pub struct ChannelBody {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    _guard: DropGuard,
}

impl Stream for ChannelBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Bounded sink/body pair holding at most `window_bytes` of media in flight
pub fn channel(window_bytes: usize, cancel: CancellationToken) -> (ChannelSink, ChannelBody) {
    let capacity = (window_bytes / CHUNK_SIZE).max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        ChannelSink { tx },
        ChannelBody {
            rx,
            _guard: cancel.drop_guard(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::stream::StreamHandle;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    /// Emits `total` bytes in `chunk`-sized pieces and records close()
    struct FakeSource {
        remaining: u64,
        chunk: usize,
        fail_after: Option<u64>,
        produced: Arc<AtomicU64>,
        closed: Arc<AtomicBool>,
    }

    impl FakeSource {
        fn new(total: u64, chunk: usize) -> (Self, Arc<AtomicU64>, Arc<AtomicBool>) {
            let produced = Arc::new(AtomicU64::new(0));
            let closed = Arc::new(AtomicBool::new(false));
            (
                Self {
                    remaining: total,
                    chunk,
                    fail_after: None,
                    produced: produced.clone(),
                    closed: closed.clone(),
                },
                produced,
                closed,
            )
        }
    }

    #[async_trait]
    impl ByteSource for FakeSource {
        async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
            assert!(!self.closed.load(Ordering::SeqCst), "read after close");
            let produced = self.produced.load(Ordering::SeqCst);
            if self.fail_after.map_or(false, |limit| produced >= limit) {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream reset"));
            }
            if self.remaining == 0 {
                return Ok(None);
            }
            let n = self.remaining.min(self.chunk as u64);
            self.remaining -= n;
            self.produced.fetch_add(n, Ordering::SeqCst);
            Ok(Some(Bytes::from(vec![7u8; n as usize])))
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct VecSink {
        data: Vec<u8>,
        writes: usize,
    }

    #[async_trait]
    impl ByteSink for VecSink {
        async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
            self.writes += 1;
            self.data.extend_from_slice(&chunk);
            Ok(())
        }
    }

    fn stream(source: FakeSource) -> ResolutionResult {
        ResolutionResult::Stream(StreamHandle::new(Box::new(source)))
    }

    #[tokio::test]
    async fn test_stream_completes_and_closes_source() {
        let (source, _, closed) = FakeSource::new(300_000, 100_000);
        let mut sink = VecSink::default();

        let outcome = relay(stream(source), &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, RelayOutcome::Completed { bytes: 300_000 });
        assert_eq!(sink.data.len(), 300_000);
        // 100 KB upstream chunks are split to the relay chunk size
        assert!(sink.writes > 3);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disconnect_after_two_megabytes_of_fifty() {
        const TOTAL: u64 = 50 * 1024 * 1024;
        const READ: usize = 2 * 1024 * 1024;
        const WINDOW: usize = 256 * 1024;

        let (source, produced, closed) = FakeSource::new(TOTAL, CHUNK_SIZE);
        let cancel = CancellationToken::new();
        let (mut sink, mut body) = channel(WINDOW, cancel.clone());

        let relay_task = tokio::spawn(async move {
            let result = stream(source);
            relay(result, &mut sink, &cancel).await
        });

        let mut received = 0usize;
        while received < READ {
            let chunk = body.next().await.unwrap().unwrap();
            received += chunk.len();
        }
        drop(body);

        let outcome = relay_task.await.unwrap().unwrap();
        assert!(matches!(outcome, RelayOutcome::Cancelled { .. }));
        assert!(closed.load(Ordering::SeqCst));

        // Upstream stopped shortly after the client: bounded by the window
        let pulled = produced.load(Ordering::SeqCst);
        assert!(pulled < (READ + WINDOW + 2 * CHUNK_SIZE) as u64, "pulled {}", pulled);
    }

    #[tokio::test]
    async fn test_cancel_token_stops_writes() {
        let (source, _, closed) = FakeSource::new(10 * 1024 * 1024, CHUNK_SIZE);
        let cancel = CancellationToken::new();
        let (mut sink, mut body) = channel(4 * CHUNK_SIZE, cancel.child_token());

        let token = cancel.clone();
        let relay_task = tokio::spawn(async move { relay(stream(source), &mut sink, &token).await });

        body.next().await.unwrap().unwrap();
        cancel.cancel();

        let outcome = relay_task.await.unwrap().unwrap();
        let RelayOutcome::Cancelled { bytes } = outcome else {
            panic!("expected cancellation, got {:?}", outcome);
        };
        assert!(closed.load(Ordering::SeqCst));

        // Nothing beyond what was already queued reaches the consumer
        let mut drained = CHUNK_SIZE as u64;
        while let Some(Ok(chunk)) = body.next().await {
            drained += chunk.len() as u64;
        }
        assert_eq!(drained, bytes);
    }

    #[tokio::test]
    async fn test_upstream_error_is_reported_and_source_closed() {
        let (mut source, _, closed) = FakeSource::new(1024 * 1024, CHUNK_SIZE);
        source.fail_after = Some(2 * CHUNK_SIZE as u64);
        let (mut sink, mut body) = channel(DEFAULT_WINDOW_BYTES, CancellationToken::new());

        let err = relay(stream(source), &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Upstream { bytes, .. } if bytes == 2 * CHUNK_SIZE as u64));
        assert!(closed.load(Ordering::SeqCst));

        drop(sink);
        let mut saw_error = false;
        while let Some(item) = body.next().await {
            saw_error |= item.is_err();
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn test_failed_subprocess_is_not_reported_complete() {
        use crate::downloader::stream::ProcessSource;

        let args = vec![
            "-c".to_string(),
            "printf abc; echo 'ERROR: unable to download video data' >&2; exit 1".to_string(),
        ];
        let mut source = ProcessSource::spawn("sh", &args).unwrap();
        source.prime().await.unwrap();

        let mut sink = VecSink::default();
        let result = relay(
            ResolutionResult::Stream(StreamHandle::new(Box::new(source))),
            &mut sink,
            &CancellationToken::new(),
        )
        .await;

        match result {
            Err(RelayError::Upstream { bytes, source }) => {
                assert_eq!(bytes, 3);
                assert!(source.to_string().contains("unable to download video data"));
            }
            other => panic!("expected upstream failure, got {:?}", other),
        }
        assert_eq!(sink.data, b"abc");
    }

    #[tokio::test]
    async fn test_redirect_and_picker_are_not_copied() {
        let mut sink = VecSink::default();
        let cancel = CancellationToken::new();

        let outcome = relay(ResolutionResult::Redirect("https://cdn/a".into()), &mut sink, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Redirect("https://cdn/a".into()));

        let outcome = relay(
            ResolutionResult::Picker(vec!["https://cdn/1".into(), "https://cdn/2".into()]),
            &mut sink,
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(outcome, RelayOutcome::Redirect("https://cdn/1".into()));
        assert_eq!(sink.writes, 0);

        let err = relay(ResolutionResult::Picker(Vec::new()), &mut sink, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::EmptyPicker));
    }

    #[tokio::test]
    async fn test_dropping_body_fires_token() {
        let cancel = CancellationToken::new();
        let (_sink, body) = channel(DEFAULT_WINDOW_BYTES, cancel.clone());
        assert!(!cancel.is_cancelled());
        drop(body);
        assert!(cancel.is_cancelled());
    }
}
