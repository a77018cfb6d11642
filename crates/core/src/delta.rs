//! LLM stream event types
//!
//! The LLM is an external collaborator; the gateway only sees an ordered
//! stream of these events. Events must be consumed in emission order.

/// One event from an in-flight LLM generation
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental text fragment
    TextDelta(String),
    /// The model requested a tool invocation
    ToolCall {
        name: String,
        arguments: String,
    },
    /// Result of a tool invocation fed back into the stream
    ToolResult {
        name: String,
        output: String,
    },
    /// The generation is complete
    Finish,
}

impl StreamEvent {
    /// Text carried by this event, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            StreamEvent::TextDelta(text) => Some(text),
            _ => None,
        }
    }

    /// Is this the terminal event of a generation?
    pub fn is_finish(&self) -> bool {
        matches!(self, StreamEvent::Finish)
    }
}
