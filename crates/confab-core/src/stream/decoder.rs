use tracing::{debug, warn};

use super::event::StreamEvent;

/// Terminator frame sent by the endpoint after the last event.
const DONE_MARKER: &str = "[DONE]";

/// Incremental decoder for the newline-delimited event stream.
///
/// Chunks are buffered until a complete line is available, so a chunk
/// boundary falling inside a frame never desynchronizes parsing. Frames are
/// `data: <json>` lines (the bare-JSON form is accepted too); blank lines and
/// `:`-prefixed comment lines are skipped.
///
/// The produced sequence is finite and non-restartable: after a malformed
/// frame the decoder emits a single [`StreamEvent::Error`] and ignores all
/// further input. It never panics or returns an error past its boundary.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: Vec<u8>,
    terminated: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the decoder has seen a terminator or a malformed frame.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Feed one transport chunk, returning the events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.terminated {
            return events;
        }

        self.buf.extend_from_slice(chunk);

        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=newline).collect();
            self.process_line(&line[..line.len() - 1], &mut events);
            if self.terminated {
                self.buf.clear();
                break;
            }
        }

        events
    }

    /// Flush the trailing partial line at end of input.
    ///
    /// Servers are not required to newline-terminate the final frame.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.terminated || self.buf.is_empty() {
            return events;
        }
        let line = std::mem::take(&mut self.buf);
        self.process_line(&line, &mut events);
        events
    }

    fn process_line(&mut self, raw: &[u8], events: &mut Vec<StreamEvent>) {
        let line = match String::from_utf8(raw.to_vec()) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "stream chunk is not valid UTF-8");
                events.push(StreamEvent::Error {
                    message: err.to_string(),
                });
                self.terminated = true;
                return;
            }
        };

        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return;
        }
        if line.starts_with(':') {
            // SSE comment / keep-alive line.
            return;
        }

        let payload = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
        if payload == DONE_MARKER {
            debug!("stream terminator received");
            self.terminated = true;
            return;
        }

        match StreamEvent::parse_frame(payload) {
            Ok(Some(event)) => {
                if matches!(event, StreamEvent::Error { .. }) {
                    self.terminated = true;
                }
                events.push(event);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "malformed stream frame");
                events.push(StreamEvent::Error {
                    message: err.to_string(),
                });
                self.terminated = true;
            }
        }
    }
}
