use serde::Deserialize;
use serde::Serialize;

/// Prefix that marks a line on the response stream as a frame.
pub const FRAME_PREFIX: &str = "data:";

/// Payload that terminates the stream without carrying a record.
pub const DONE_SENTINEL: &str = "[DONE]";

/// JSON record carried by a `data:` line.
///
/// Every field is optional on the wire. The server sets `finished` on the
/// last record of a reply and also on records that carry `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl FramePayload {
    /// Expand a record into the frames it signals, in delivery order.
    ///
    /// An error short-circuits: nothing else in the record is delivered.
    /// Empty `content` and empty `error` are treated as absent.
    pub fn into_frames(self) -> Vec<StreamFrame> {
        if let Some(error) = self.error.filter(|error| !error.is_empty()) {
            return vec![StreamFrame::Error(error)];
        }

        let mut frames = Vec::with_capacity(2);
        if let Some(content) = self.content.filter(|content| !content.is_empty()) {
            frames.push(StreamFrame::ContentDelta(content));
        }
        if self.finished == Some(true) {
            frames.push(StreamFrame::EndOfStream);
        }
        frames
    }
}

/// One decoded unit of the response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    ContentDelta(String),
    Error(String),
    EndOfStream,
}

impl StreamFrame {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Error(_) | StreamFrame::EndOfStream)
    }
}
