//! Scripted generation backend
//!
//! Replays canned event sequences. Used by the test suite and by the
//! offline conversation loop when no hosted model is wired in.

use async_trait::async_trait;
use parking_lot::Mutex;
use voice_gateway_core::{StreamEvent, Turn};

use crate::streaming::{GenerationSink, GenerationStream};
use crate::{GenerationBackend, LlmError};

/// Backend that replays one scripted event sequence per `generate` call,
/// cycling when more calls arrive than scripts exist.
pub struct ScriptedBackend {
    scripts: Vec<Vec<StreamEvent>>,
    next: Mutex<usize>,
}

impl ScriptedBackend {
    /// Create a backend from explicit scripts. Each script should end
    /// with `StreamEvent::Finish`; one is appended when missing.
    pub fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
        let scripts = scripts
            .into_iter()
            .map(|mut script| {
                if !script.last().map(StreamEvent::is_finish).unwrap_or(false) {
                    script.push(StreamEvent::Finish);
                }
                script
            })
            .collect();
        Self {
            scripts,
            next: Mutex::new(0),
        }
    }

    /// Backend that answers every prompt with a fixed sentence, split
    /// into word deltas the way a hosted model streams them.
    pub fn with_reply(reply: &str) -> Self {
        let mut events: Vec<StreamEvent> = Vec::new();
        let mut first = true;
        for word in reply.split_whitespace() {
            let delta = if first {
                word.to_string()
            } else {
                format!(" {}", word)
            };
            first = false;
            events.push(StreamEvent::TextDelta(delta));
        }
        events.push(StreamEvent::Finish);
        Self::new(vec![events])
    }

    fn take_script(&self) -> Vec<StreamEvent> {
        let mut next = self.next.lock();
        if self.scripts.is_empty() {
            return vec![StreamEvent::Finish];
        }
        let script = self.scripts[*next % self.scripts.len()].clone();
        *next += 1;
        script
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(
        &self,
        user_text: &str,
        _history: &[Turn],
    ) -> Result<GenerationStream, LlmError> {
        tracing::debug!(user_text, "starting scripted generation");
        let script = self.take_script();
        let (sink, stream) = GenerationStream::channel(32);

        tokio::spawn(feed_script(sink, script));

        Ok(stream)
    }
}

async fn feed_script(sink: GenerationSink, script: Vec<StreamEvent>) {
    for event in script {
        if !sink.send(event).await {
            tracing::debug!("scripted generation aborted mid-stream");
            return;
        }
        // Yield between events so consumers interleave the way they do
        // against a network stream.
        tokio::task::yield_now().await;
    }
}
