//! Generation stream plumbing
//!
//! An mpsc-backed event stream with a shared abort flag. The producer
//! side stops the moment the consumer aborts; events already queued are
//! dropped by the consumer loop, not re-ordered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use voice_gateway_core::StreamEvent;

/// Shared cancellation flag for one generation.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Do two handles control the same generation?
    pub fn same_as(&self, other: &AbortHandle) -> bool {
        Arc::ptr_eq(&self.aborted, &other.aborted)
    }
}

/// Producer side of a generation stream.
pub struct GenerationSink {
    tx: mpsc::Sender<StreamEvent>,
    abort: AbortHandle,
}

impl GenerationSink {
    /// Send one event. Returns false once the consumer aborted or went
    /// away; producers should stop generating at that point.
    pub async fn send(&self, event: StreamEvent) -> bool {
        if self.abort.is_aborted() {
            return false;
        }
        self.tx.send(event).await.is_ok()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }
}

/// Consumer side of a generation stream.
pub struct GenerationStream {
    rx: mpsc::Receiver<StreamEvent>,
    abort: AbortHandle,
}

impl GenerationStream {
    /// Create a connected sink/stream pair.
    pub fn channel(buffer: usize) -> (GenerationSink, GenerationStream) {
        let (tx, rx) = mpsc::channel(buffer);
        let abort = AbortHandle::new();
        (
            GenerationSink {
                tx,
                abort: abort.clone(),
            },
            GenerationStream { rx, abort },
        )
    }

    /// Handle that cancels this generation from anywhere.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Next event in emission order; `None` after abort or when the
    /// producer is done.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.abort.is_aborted() {
            return None;
        }
        match self.rx.recv().await {
            Some(event) if !self.abort.is_aborted() => Some(event),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sink, mut stream) = GenerationStream::channel(8);
        assert!(sink.send(StreamEvent::TextDelta("a".into())).await);
        assert!(sink.send(StreamEvent::TextDelta("b".into())).await);
        assert!(sink.send(StreamEvent::Finish).await);
        drop(sink);

        assert_eq!(
            stream.next_event().await,
            Some(StreamEvent::TextDelta("a".into()))
        );
        assert_eq!(
            stream.next_event().await,
            Some(StreamEvent::TextDelta("b".into()))
        );
        assert_eq!(stream.next_event().await, Some(StreamEvent::Finish));
        assert_eq!(stream.next_event().await, None);
    }

    #[tokio::test]
    async fn test_abort_stops_consumer_and_producer() {
        let (sink, mut stream) = GenerationStream::channel(8);
        let abort = stream.abort_handle();

        assert!(sink.send(StreamEvent::TextDelta("queued".into())).await);
        abort.abort();

        // Consumer sees nothing after the abort point.
        assert_eq!(stream.next_event().await, None);
        // Producer observes the abort and stops.
        assert!(!sink.send(StreamEvent::TextDelta("late".into())).await);
    }
}
