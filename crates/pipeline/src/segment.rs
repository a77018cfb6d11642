//! Sentence-boundary segmentation for TTS hand-off
//!
//! Accumulates LLM text deltas and decides when the buffer is a
//! speakable unit. Two delimiter tiers exist: flushing on fragments
//! lowers latency but makes speech choppier, flushing on full sentences
//! is smoother but slower. The bundled conversation loop uses
//! sentence-only flushing; the fragment tier is available for
//! lower-latency paths.

/// Outcome of feeding one delta to the segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushDecision {
    /// Text to hand to TTS when `should_flush` is set, trimmed.
    pub text_to_send: String,
    /// Send the text now.
    pub should_flush: bool,
}

impl FlushDecision {
    fn hold() -> Self {
        Self {
            text_to_send: String::new(),
            should_flush: false,
        }
    }

    fn flush(text: String) -> Self {
        Self {
            text_to_send: text,
            should_flush: true,
        }
    }
}

/// Segmenter configuration
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Characters ending a full sentence.
    pub sentence_delimiters: Vec<char>,
    /// Characters ending a fragment (clause-level pause points).
    pub fragment_delimiters: Vec<char>,
    /// Also flush at fragment boundaries, not only sentence boundaries.
    pub fragment_flush: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sentence_delimiters: vec!['.', '?', '!', '…', '。', '\n'],
            fragment_delimiters: vec![',', ';', ':', ')', ']', '}', '-', '—'],
            fragment_flush: false,
        }
    }
}

/// Stateful delta accumulator deciding TTS flush moments.
pub struct TextSegmenter {
    config: SegmenterConfig,
    buffer: String,
}

impl TextSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
        }
    }

    /// Append one delta and decide whether to flush.
    ///
    /// Flushes when the delta's last character sits in the sentence
    /// delimiter set (or either set when fragment flushing is on) and
    /// the accumulated text is actually speakable.
    pub fn push_delta(&mut self, delta: &str) -> FlushDecision {
        self.buffer.push_str(delta);

        let Some(last) = delta.chars().last() else {
            return FlushDecision::hold();
        };

        if !self.is_boundary(last) {
            return FlushDecision::hold();
        }

        self.take_if_speakable()
    }

    /// Stream finished: flush any speakable remainder regardless of
    /// delimiters.
    pub fn finish(&mut self) -> Option<String> {
        let decision = self.take_if_speakable();
        decision.should_flush.then_some(decision.text_to_send)
    }

    /// Accumulated, unflushed text (trimmed view).
    pub fn pending(&self) -> &str {
        self.buffer.trim()
    }

    /// Drop any accumulated text.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn is_boundary(&self, c: char) -> bool {
        if self.config.sentence_delimiters.contains(&c) {
            return true;
        }
        self.config.fragment_flush && self.config.fragment_delimiters.contains(&c)
    }

    fn take_if_speakable(&mut self) -> FlushDecision {
        let text = self.buffer.trim();
        if !is_speakable(text) {
            // Punctuation-only or whitespace buffers are dropped, not
            // sent: empty synthesis requests waste provider calls and
            // produce audible glitches.
            self.buffer.clear();
            return FlushDecision::hold();
        }
        let text = text.to_string();
        self.buffer.clear();
        FlushDecision::flush(text)
    }
}

/// Is this text worth sending to a TTS provider?
///
/// Rejects empty, whitespace-only, and punctuation-only strings.
pub fn is_speakable(text: &str) -> bool {
    text.chars().any(|c| c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> TextSegmenter {
        TextSegmenter::new(SegmenterConfig::default())
    }

    #[test]
    fn test_sentence_flush() {
        let mut seg = segmenter();
        assert!(!seg.push_delta("Hello").should_flush);
        assert!(!seg.push_delta(" world").should_flush);

        let decision = seg.push_delta(".");
        assert!(decision.should_flush);
        assert_eq!(decision.text_to_send, "Hello world.");
        assert_eq!(seg.pending(), "");
    }

    #[test]
    fn test_no_flush_without_delimiter_until_finish() {
        let mut seg = segmenter();
        assert!(!seg.push_delta("Hello").should_flush);
        assert!(!seg.push_delta(" world").should_flush);

        assert_eq!(seg.finish(), Some("Hello world".to_string()));
        assert_eq!(seg.finish(), None);
    }

    #[test]
    fn test_question_and_exclamation_flush() {
        let mut seg = segmenter();
        let decision = seg.push_delta("Really?");
        assert!(decision.should_flush);
        assert_eq!(decision.text_to_send, "Really?");

        let decision = seg.push_delta("Yes!");
        assert!(decision.should_flush);
        assert_eq!(decision.text_to_send, "Yes!");
    }

    #[test]
    fn test_fragment_tier_off_by_default() {
        let mut seg = segmenter();
        assert!(!seg.push_delta("First clause,").should_flush);
        let decision = seg.push_delta(" then the rest.");
        assert!(decision.should_flush);
        assert_eq!(decision.text_to_send, "First clause, then the rest.");
    }

    #[test]
    fn test_fragment_tier_flushes_on_comma() {
        let mut seg = TextSegmenter::new(SegmenterConfig {
            fragment_flush: true,
            ..SegmenterConfig::default()
        });
        let decision = seg.push_delta("First clause,");
        assert!(decision.should_flush);
        assert_eq!(decision.text_to_send, "First clause,");
    }

    #[test]
    fn test_punctuation_only_is_dropped() {
        let mut seg = segmenter();
        assert!(!seg.push_delta(".").should_flush);
        assert_eq!(seg.pending(), "");
        assert_eq!(seg.finish(), None);
    }

    #[test]
    fn test_whitespace_only_finish_is_dropped() {
        let mut seg = segmenter();
        seg.push_delta("   ");
        assert_eq!(seg.finish(), None);
    }

    #[test]
    fn test_mid_word_delimiter_char_does_not_flush() {
        // The boundary check looks at the delta's last character only;
        // a sentence ending mid-delta waits for the next boundary.
        let mut seg = segmenter();
        assert!(!seg.push_delta("End. And").should_flush);
        let decision = seg.push_delta(" more.");
        assert!(decision.should_flush);
        assert_eq!(decision.text_to_send, "End. And more.");
    }

    #[test]
    fn test_newline_is_a_sentence_boundary() {
        let mut seg = segmenter();
        let decision = seg.push_delta("Line one\n");
        assert!(decision.should_flush);
        assert_eq!(decision.text_to_send, "Line one");
    }

    #[test]
    fn test_is_speakable() {
        assert!(is_speakable("hello"));
        assert!(is_speakable("item 1"));
        assert!(!is_speakable(""));
        assert!(!is_speakable("   "));
        assert!(!is_speakable("."));
        assert!(!is_speakable("?!,"));
    }
}
