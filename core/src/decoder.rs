//! Line framing for the chat response stream.
//!
//! Chunks arrive with no alignment to lines or even to UTF-8 sequences. The
//! decoder carries incomplete bytes and the last partial line across chunks
//! and turns each complete `data:` line into zero or more [`StreamFrame`]s.

use chatline_protocol::DONE_SENTINEL;
use chatline_protocol::FRAME_PREFIX;
use chatline_protocol::FramePayload;
use chatline_protocol::StreamFrame;
use tracing::trace;
use tracing::warn;

#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Trailing bytes of a UTF-8 sequence split across chunks.
    pending_bytes: Vec<u8>,
    /// Text after the last newline seen so far.
    carry: String,
    frames_decoded: u64,
    lines_dropped: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw chunk. Invalid UTF-8 is replaced with U+FFFD.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.pending_bytes.extend_from_slice(chunk);
        let text = self.decode_pending();
        self.push_str(&text)
    }

    /// Feed already-decoded text.
    pub fn push_str(&mut self, chunk: &str) -> Vec<StreamFrame> {
        self.carry.push_str(chunk);
        let Some(last_newline) = self.carry.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);
        let mut frames = Vec::new();
        for line in complete.split_terminator('\n') {
            self.parse_line(line, &mut frames);
        }
        frames
    }

    /// Flush at end of input: the carried partial line is parsed as if it
    /// had been newline-terminated.
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.pending_bytes.clear();
            self.carry.push_str(&tail);
        }
        let line = std::mem::take(&mut self.carry);
        let mut frames = Vec::new();
        if !line.is_empty() {
            self.parse_line(&line, &mut frames);
        }
        frames
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn lines_dropped(&self) -> u64 {
        self.lines_dropped
    }

    fn decode_pending(&mut self) -> String {
        let mut out = String::new();
        let mut consumed = 0;
        loop {
            let rest = &self.pending_bytes[consumed..];
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    consumed = self.pending_bytes.len();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid_up_to]));
                    match err.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid_up_to + invalid_len;
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            consumed += valid_up_to;
                            break;
                        }
                    }
                }
            }
        }
        self.pending_bytes.drain(..consumed);
        out
    }

    fn parse_line(&mut self, line: &str, frames: &mut Vec<StreamFrame>) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
            if !line.trim().is_empty() {
                trace!("ignoring non-frame line: {line}");
            }
            return;
        };

        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        if payload == DONE_SENTINEL {
            self.frames_decoded += 1;
            frames.push(StreamFrame::EndOfStream);
            return;
        }

        match serde_json::from_str::<FramePayload>(payload) {
            Ok(record) => {
                let decoded = record.into_frames();
                self.frames_decoded += decoded.len() as u64;
                frames.extend(decoded);
            }
            Err(err) => {
                self.lines_dropped += 1;
                warn!("dropping undecodable frame: {err}; payload: {payload}");
            }
        }
    }
}
