use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::event::{FinishReason, StreamEvent};
use crate::models::{Message, Part};

/// The live message list for an in-flight turn, folded incrementally from
/// stream events.
///
/// `apply` is a pure reducer: it consumes the current state and returns the
/// next one, so any clone handed to a consumer is never mutated underneath
/// it. Part lookup is O(1) amortized per delta via an id index; no event
/// re-scans prior parts.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    /// Number of seed messages that precede this turn's output.
    history_len: usize,
    /// Index of the open assistant message, if any.
    current: Option<usize>,
    /// Part id -> (message index, part index).
    part_index: HashMap<String, (usize, usize)>,
    /// Part ids frozen by a `*-end` event (or superseded). Later deltas for
    /// these ids are reported and ignored.
    closed: HashSet<String>,
    /// The one in-progress text part allowed per message.
    open_text: Option<String>,
    finish: Option<FinishReason>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the transcript with the prior message history; subsequent events
    /// append after it.
    pub fn with_history(messages: Vec<Message>) -> Self {
        let history_len = messages.len();
        Self {
            messages,
            history_len,
            ..Self::default()
        }
    }

    /// The full ordered message list: history plus this turn's output.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages produced by this turn (everything after the seed history).
    pub fn turn_messages(&self) -> &[Message] {
        &self.messages[self.history_len..]
    }

    /// Id of the in-progress text part, if one is open.
    pub fn open_text_part(&self) -> Option<&str> {
        self.open_text.as_deref()
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish
    }

    /// Whether the given part is the last part of the last message — the
    /// "live" position a streaming UI renders expanded.
    pub fn is_last_part(&self, message_idx: usize, part_idx: usize) -> bool {
        message_idx + 1 == self.messages.len()
            && self
                .messages
                .last()
                .is_some_and(|m| part_idx + 1 == m.parts.len())
    }

    /// Fold one event into the transcript.
    pub fn apply(mut self, event: &StreamEvent) -> Self {
        match event {
            StreamEvent::Start { message_id } => {
                if self.current.is_some() {
                    debug!("start event while a message is already open; ignoring");
                } else {
                    self.open_message(message_id.clone());
                }
            }
            StreamEvent::TextStart { id } => self.open_part(id, Part::text("")),
            StreamEvent::TextDelta { id, delta } => self.append_delta(id, delta, false),
            StreamEvent::TextEnd { id } => self.close_part(id),
            StreamEvent::ReasoningStart { id } => self.open_part(
                id,
                Part::Reasoning {
                    text: String::new(),
                },
            ),
            StreamEvent::ReasoningDelta { id, delta } => self.append_delta(id, delta, true),
            StreamEvent::ReasoningEnd { id } => self.close_part(id),
            StreamEvent::Source { url, title } => self.push_part(Part::Source {
                url: url.clone(),
                title: title.clone(),
            }),
            StreamEvent::File {
                filename,
                url,
                media_type,
            } => self.push_part(Part::File {
                filename: filename
                    .clone()
                    .unwrap_or_else(|| "attachment".to_string()),
                url: url.clone(),
                media_type: media_type.clone(),
            }),
            StreamEvent::Finish { reason } => {
                // Finish never alters message content; the reason surfaces to
                // the orchestrator.
                self.finish = Some(*reason);
            }
            StreamEvent::Error { .. } => {
                // Error handling is the orchestrator's job; the transcript
                // content is left as-is for it to discard.
            }
        }
        self
    }

    fn open_message(&mut self, id: Option<String>) -> usize {
        match self.current {
            Some(idx) => idx,
            None => {
                self.messages.push(Message::assistant(id));
                let idx = self.messages.len() - 1;
                self.current = Some(idx);
                self.open_text = None;
                idx
            }
        }
    }

    fn open_part(&mut self, id: &str, part: Part) {
        if self.part_index.contains_key(id) {
            warn!(part_id = %id, "duplicate part-start event; ignoring");
            return;
        }

        // Only one text part may be streaming at a time per message.
        if matches!(part, Part::Text { .. })
            && let Some(prev) = self.open_text.take()
        {
            warn!(part_id = %prev, "text part superseded before its end event");
            self.closed.insert(prev);
        }

        let message_idx = self.open_message(None);
        let message = &mut self.messages[message_idx];
        message.parts.push(part);
        self.part_index
            .insert(id.to_string(), (message_idx, message.parts.len() - 1));
        if matches!(self.messages[message_idx].parts.last(), Some(Part::Text { .. })) {
            self.open_text = Some(id.to_string());
        }
    }

    fn append_delta(&mut self, id: &str, delta: &str, reasoning: bool) {
        if self.closed.contains(id) {
            warn!(part_id = %id, "delta after part end; ignoring");
            return;
        }

        if !self.part_index.contains_key(id) {
            debug!(part_id = %id, "delta for unopened part; opening implicitly");
            let part = if reasoning {
                Part::Reasoning {
                    text: String::new(),
                }
            } else {
                Part::text("")
            };
            self.open_part(id, part);
        }

        let Some(&(message_idx, part_idx)) = self.part_index.get(id) else {
            return;
        };
        match &mut self.messages[message_idx].parts[part_idx] {
            Part::Text { text } | Part::Reasoning { text } => text.push_str(delta),
            _ => warn!(part_id = %id, "delta for a non-streaming part kind; ignoring"),
        }
    }

    fn close_part(&mut self, id: &str) {
        if !self.part_index.contains_key(id) {
            debug!(part_id = %id, "end event for unknown part; ignoring");
            return;
        }
        self.closed.insert(id.to_string());
        if self.open_text.as_deref() == Some(id) {
            self.open_text = None;
        }
    }

    fn push_part(&mut self, part: Part) {
        let message_idx = self.open_message(None);
        self.messages[message_idx].parts.push(part);
    }
}
