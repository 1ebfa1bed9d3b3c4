//! Streaming Generator: forwards model deltas to one consumer as they arrive.
//!
//! `start` opens the upstream stream and waits for the first fragment, so failures that
//! happen before any text exists come back as a plain `Err`. After that a pump task moves
//! fragments through a bounded channel. A mid-stream failure is delivered as the final
//! `Err` item; clean completion closes the channel.
//!
//! When the consumer drops the `GenerationStream` the pump sees the closed channel, drops
//! the upstream stream (which closes the HTTP connection) and exits. The upstream is also
//! dropped before a terminal error is queued, so a consumer that stops reading never
//! keeps the connection open.
//! The whole stream shares a single wall-clock deadline.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::generation::error::GenerationError;
use crate::llm_client::{LanguageModel, TextStream};

/// Fragments buffered between the pump and a slow consumer.
pub const FRAGMENT_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Clone)]
pub struct StreamingGenerator {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl StreamingGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn start(&self, prompt: &ComposedPrompt) -> Result<GenerationStream, GenerationError> {
        let deadline = Instant::now() + self.timeout;

        let mut upstream = timeout_at(deadline, self.model.stream(&prompt.user, &prompt.system))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))??;

        let first = match timeout_at(deadline, upstream.next()).await {
            Err(_) => return Err(GenerationError::Timeout(self.timeout)),
            Ok(None) => None,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(Some(Ok(fragment))) => Some(fragment),
        };

        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        if first.is_some() {
            tokio::spawn(pump(upstream, tx, deadline, self.timeout));
        }

        Ok(GenerationStream { first, rx })
    }
}

async fn pump(
    mut upstream: TextStream,
    tx: mpsc::Sender<Result<String, GenerationError>>,
    deadline: Instant,
    timeout: Duration,
) {
    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!("Generation consumer went away; closing upstream");
                return;
            }
            next = timeout_at(deadline, upstream.next()) => next,
        };

        let item = match next {
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Generation stream hit its deadline");
                Err(GenerationError::Timeout(timeout))
            }
            Ok(None) => return,
            Ok(Some(Ok(fragment))) => Ok(fragment),
            Ok(Some(Err(e))) => {
                warn!("Generation stream failed mid-way: {e}");
                Err(GenerationError::from(e))
            }
        };

        if item.is_err() {
            finish(upstream, &tx, item).await;
            return;
        }
        match timeout_at(deadline, tx.send(item)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return,
            // consumer stopped reading; it still learns why the stream ended
            Err(_) => {
                finish(upstream, &tx, Err(GenerationError::Timeout(timeout))).await;
                return;
            }
        }
    }
}

/// Releases the upstream connection, then waits for room to deliver the terminal error.
async fn finish(
    upstream: TextStream,
    tx: &mpsc::Sender<Result<String, GenerationError>>,
    item: Result<String, GenerationError>,
) {
    drop(upstream);
    let _ = tx.send(item).await;
}

/// Ordered fragments of one generation. Ends with `Err` on failure, `None` on success.
pub struct GenerationStream {
    first: Option<String>,
    rx: mpsc::Receiver<Result<String, GenerationError>>,
}

impl Stream for GenerationStream {
    type Item = Result<String, GenerationError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(first) = self.first.take() {
            return Poll::Ready(Some(Ok(first)));
        }
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::LlmError;
    use crate::test_support::{ScriptedModel, ScriptedStream};
    use std::sync::atomic::Ordering;

    fn prompt() -> ComposedPrompt {
        ComposedPrompt {
            system: "sys".to_string(),
            user: "write".to_string(),
        }
    }

    fn generator(model: ScriptedModel) -> StreamingGenerator {
        StreamingGenerator::new(Arc::new(model), Duration::from_secs(30))
    }

    async fn collect(stream: GenerationStream) -> Vec<Result<String, GenerationError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_fragments_arrive_in_order_and_stream_closes() {
        let model = ScriptedModel::new().with_stream(ScriptedStream::fragments(&["Dear ", "team", "."]));

        let items = collect(generator(model).start(&prompt()).await.unwrap()).await;

        assert_eq!(
            items,
            vec![Ok("Dear ".to_string()), Ok("team".to_string()), Ok(".".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failure_before_first_fragment_is_returned_from_start() {
        let model = ScriptedModel::new().with_stream(ScriptedStream::Open(vec![Err(
            LlmError::Stream("overloaded_error: Overloaded".to_string()),
        )]));

        let err = generator(model).start(&prompt()).await.err().unwrap();

        assert!(matches!(err, GenerationError::GenerationFailed(m) if m.contains("Overloaded")));
    }

    #[tokio::test]
    async fn test_open_failure_is_upstream_unavailable() {
        let model = ScriptedModel::new()
            .with_stream(ScriptedStream::FailToOpen(LlmError::RateLimited { retries: 3 }));

        let err = generator(model).start(&prompt()).await.err().unwrap();

        assert!(matches!(err, GenerationError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_is_last_item() {
        let model = ScriptedModel::new().with_stream(ScriptedStream::Open(vec![
            Ok("Hello".to_string()),
            Ok(" there".to_string()),
            Err(LlmError::Stream("connection reset".to_string())),
        ]));

        let items = collect(generator(model).start(&prompt()).await.unwrap()).await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Ok("Hello".to_string()));
        assert_eq!(items[1], Ok(" there".to_string()));
        assert!(matches!(items[2], Err(GenerationError::GenerationFailed(_))));
    }

    #[tokio::test]
    async fn test_empty_upstream_yields_empty_stream() {
        let model = ScriptedModel::new().with_stream(ScriptedStream::Open(vec![]));
        let items = collect(generator(model).start(&prompt()).await.unwrap()).await;
        assert!(items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_stream_times_out_after_partial_output() {
        let model = ScriptedModel::new().with_stream(ScriptedStream::Stall(vec!["partial".to_string()]));

        let items = collect(generator(model).start(&prompt()).await.unwrap()).await;

        assert_eq!(items[0], Ok("partial".to_string()));
        assert_eq!(
            items[1],
            Err(GenerationError::Timeout(Duration::from_secs(30)))
        );
        assert_eq!(items.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_open_times_out_from_start() {
        let model = ScriptedModel::new()
            .with_delay(Duration::from_secs(45))
            .with_stream(ScriptedStream::fragments(&["late"]));

        let err = generator(model).start(&prompt()).await.err().unwrap();

        assert_eq!(err, GenerationError::Timeout(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_upstream_released_before_unread_error_is_delivered() {
        let mut items: Vec<Result<String, LlmError>> =
            (0..=FRAGMENT_BUFFER).map(|n| Ok(format!("part{n} "))).collect();
        items.push(Err(LlmError::Stream("connection reset".to_string())));
        let (scripted, tracker) = ScriptedStream::tracked(items);
        let model = ScriptedModel::new().with_stream(scripted);

        let mut stream = generator(model).start(&prompt()).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());

        // the channel is full and nobody reads it
        for _ in 0..50 {
            if tracker.upstream_dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(tracker.upstream_dropped.load(Ordering::SeqCst));
        assert_eq!(tracker.produced.load(Ordering::SeqCst), FRAGMENT_BUFFER + 2);

        let rest = collect(stream).await;
        assert_eq!(rest.len(), FRAGMENT_BUFFER + 1);
        assert!(matches!(rest.last(), Some(Err(GenerationError::GenerationFailed(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_stream_releases_upstream_at_deadline() {
        let (endless, tracker) = ScriptedStream::endless();
        let model = ScriptedModel::new().with_stream(endless);

        let stream = generator(model).start(&prompt()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(tracker.upstream_dropped.load(Ordering::SeqCst));
        let items = collect(stream).await;
        assert_eq!(items.len(), FRAGMENT_BUFFER + 2);
        assert_eq!(
            items.last(),
            Some(&Err(GenerationError::Timeout(Duration::from_secs(30))))
        );
    }

    #[tokio::test]
    async fn test_consumer_drop_stops_production() {
        let (endless, tracker) = ScriptedStream::endless();
        let model = ScriptedModel::new().with_stream(endless);

        let mut stream = generator(model).start(&prompt()).await.unwrap();
        for _ in 0..3 {
            assert!(stream.next().await.unwrap().is_ok());
        }
        drop(stream);

        // let the pump observe the closed channel
        for _ in 0..50 {
            if tracker.upstream_dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(tracker.upstream_dropped.load(Ordering::SeqCst));
        let produced = tracker.produced.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tracker.produced.load(Ordering::SeqCst), produced);
        assert!(produced <= 3 + FRAGMENT_BUFFER + 2, "produced {produced}");
    }
}
