//! Generic record stream: poll a mutable surface, emit each element once.
//!
//! Setup is abandoned if cancellation arrives first. Every iteration:
//! 1. stop if the cancellation signal is set;
//! 2. wait for the next not-yet-emitted element (the wait is abandoned if
//!    cancellation arrives meanwhile, which is side-effect free);
//! 3. extract the record and retire the element;
//! 4. yield the record;
//! 5. pause briefly so one busy target does not monopolize the scheduler.
//!
//! Transient extraction errors skip the element. Any other error ends the
//! stream as its last item.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tracing::{debug, warn};

use chatscribe_core::{CancellationSignal, ElementRef, Result};

/// Boxed record stream, as consumed by a target processor.
pub type RecordStream<R> = Pin<Box<dyn Stream<Item = Result<R>> + Send>>;

/// A surface that yields atomic elements and turns them into records.
#[async_trait]
pub trait RecordSource: Send {
    type Record: Send + 'static;

    /// Name used in log lines.
    fn label(&self) -> &str;

    /// One-time setup before the first poll (open the page, reveal a panel).
    async fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Wait for the next unemitted element. `Ok(None)` ends a finite source.
    async fn detect_next(&mut self) -> Result<Option<ElementRef>>;

    /// Convert `element` into a record and make sure it is never detected again.
    async fn extract_and_retire(&mut self, element: ElementRef) -> Result<Self::Record>;

    /// Release surface resources once the stream ends by itself or by
    /// cancellation. Not reached when the consumer drops the stream early, so
    /// anything that must be released in that case belongs in a `Drop` impl.
    async fn finish(&mut self) {}
}

/// Drive `source` as a lazy, cancellable stream of records.
pub fn record_stream<S>(
    mut source: S,
    cancel: CancellationSignal,
    pause: Duration,
) -> RecordStream<S::Record>
where
    S: RecordSource + 'static,
{
    Box::pin(async_stream::stream! {
        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            prepared = source.prepare() => Some(prepared),
        };
        match prepared {
            Some(Ok(())) => {}
            None => {
                debug!("{}: cancelled before the surface was ready", source.label());
                source.finish().await;
                return;
            }
            Some(Err(e)) => {
                source.finish().await;
                yield Err(e);
                return;
            }
        }

        let mut emitted = 0u64;
        let mut skipped = 0u64;
        let mut fatal = None;

        loop {
            if cancel.is_cancelled() {
                debug!("{}: cancelled after {} records", source.label(), emitted);
                break;
            }

            let detected = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = source.detect_next() => Some(next),
            };
            let extracted = match detected {
                None => {
                    debug!("{}: cancelled while waiting after {} records", source.label(), emitted);
                    break;
                }
                Some(Ok(Some(element))) => source.extract_and_retire(element).await,
                Some(Ok(None)) => break,
                Some(Err(e)) => Err(e),
            };

            match extracted {
                Ok(record) => {
                    emitted += 1;
                    yield Ok(record);
                }
                Err(e) if e.is_transient() => {
                    skipped += 1;
                    debug!("{}: skipped element ({} so far): {}", source.label(), skipped, e);
                }
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }

            if pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(pause).await;
            }
        }

        source.finish().await;
        if skipped > 0 {
            warn!("{}: {} elements could not be read and were skipped", source.label(), skipped);
        }
        if let Some(e) = fatal {
            yield Err(e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatscribe_core::Error;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Scripted source: each detect pops one step.
    enum Step {
        Element(&'static str),
        DetectError(Error),
        ExtractError(&'static str, Error),
    }

    struct Scripted {
        steps: VecDeque<Step>,
        pending_failure: Option<Error>,
        finished: Arc<Mutex<bool>>,
        /// Set the signal once this many records have been extracted.
        cancel_after: Option<(usize, CancellationSignal)>,
        extracted: usize,
        /// Block forever once the script runs out, like an idle chat.
        block_when_empty: bool,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                pending_failure: None,
                finished: Arc::new(Mutex::new(false)),
                cancel_after: None,
                extracted: 0,
                block_when_empty: false,
            }
        }
    }

    #[async_trait]
    impl RecordSource for Scripted {
        type Record = String;

        fn label(&self) -> &str {
            "scripted"
        }

        async fn detect_next(&mut self) -> Result<Option<ElementRef>> {
            match self.steps.pop_front() {
                Some(Step::Element(id)) => Ok(Some(ElementRef::new(id))),
                Some(Step::DetectError(e)) => Err(e),
                Some(Step::ExtractError(id, e)) => {
                    self.pending_failure = Some(e);
                    Ok(Some(ElementRef::new(id)))
                }
                None if self.block_when_empty => futures::future::pending().await,
                None => Ok(None),
            }
        }

        async fn extract_and_retire(&mut self, element: ElementRef) -> Result<String> {
            if let Some(e) = self.pending_failure.take() {
                return Err(e);
            }
            self.extracted += 1;
            if let Some((after, signal)) = &self.cancel_after {
                if self.extracted >= *after {
                    signal.cancel();
                }
            }
            Ok(element.as_str().to_string())
        }

        async fn finish(&mut self) {
            *self.finished.lock() = true;
        }
    }

    async fn collect(stream: RecordStream<String>) -> Vec<Result<String>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_finite_source_emits_in_order() {
        let source = Scripted::new(vec![Step::Element("a"), Step::Element("b"), Step::Element("c")]);
        let finished = source.finished.clone();
        let items = collect(record_stream(source, CancellationSignal::new(), Duration::ZERO)).await;
        let records: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec!["a", "b", "c"]);
        assert!(*finished.lock());
    }

    #[tokio::test]
    async fn test_transient_errors_are_skipped() {
        let source = Scripted::new(vec![
            Step::Element("a"),
            Step::ExtractError("gone", Error::Extraction("vanished".into())),
            Step::DetectError(Error::Extraction("stale".into())),
            Step::Element("b"),
        ]);
        let items = collect(record_stream(source, CancellationSignal::new(), Duration::ZERO)).await;
        let records: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_detections_still_pause() {
        let source = Scripted::new(vec![
            Step::DetectError(Error::Extraction("stale".into())),
            Step::DetectError(Error::Extraction("stale".into())),
            Step::DetectError(Error::Extraction("stale".into())),
            Step::Element("a"),
        ]);
        let started = std::time::Instant::now();
        let items = collect(record_stream(source, CancellationSignal::new(), Duration::from_millis(10))).await;
        assert_eq!(items.len(), 1);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_fatal_error_ends_stream() {
        let source = Scripted::new(vec![
            Step::Element("a"),
            Step::DetectError(Error::Surface("connection lost".into())),
            Step::Element("never"),
        ]);
        let finished = source.finished.clone();
        let items = collect(record_stream(source, CancellationSignal::new(), Duration::ZERO)).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(matches!(items[1], Err(Error::Surface(_))));
        assert!(*finished.lock());
    }

    #[tokio::test]
    async fn test_prepare_failure_is_reported() {
        struct Broken;

        #[async_trait]
        impl RecordSource for Broken {
            type Record = String;
            fn label(&self) -> &str {
                "broken"
            }
            async fn prepare(&mut self) -> Result<()> {
                Err(Error::Surface("navigation failed".into()))
            }
            async fn detect_next(&mut self) -> Result<Option<ElementRef>> {
                unreachable!("detect after failed prepare")
            }
            async fn extract_and_retire(&mut self, _: ElementRef) -> Result<String> {
                unreachable!("extract after failed prepare")
            }
        }

        let items = collect(record_stream(Broken, CancellationSignal::new(), Duration::ZERO)).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Surface(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_emits_nothing() {
        let cancel = CancellationSignal::new();
        cancel.cancel();
        let source = Scripted::new(vec![Step::Element("a")]);
        let items = collect(record_stream(source, cancel, Duration::ZERO)).await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_after_current_step() {
        let cancel = CancellationSignal::new();
        let mut source = Scripted::new(vec![
            Step::Element("a"),
            Step::Element("b"),
            Step::Element("c"),
        ]);
        // Cancellation lands inside the extract of "b"; that step still completes.
        source.cancel_after = Some((2, cancel.clone()));
        let items = collect(record_stream(source, cancel, Duration::ZERO)).await;
        let records: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_idle_wait() {
        let cancel = CancellationSignal::new();
        let mut source = Scripted::new(vec![Step::Element("a")]);
        source.block_when_empty = true;
        let finished = source.finished.clone();

        let stream = record_stream(source, cancel.clone(), Duration::ZERO);
        let consumer = tokio::spawn(collect(stream));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        cancel.cancel();
        let items = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("stream should stop on cancel")
            .unwrap();
        assert_eq!(items.len(), 1);
        assert!(*finished.lock());
    }
}
