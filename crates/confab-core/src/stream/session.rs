/// Lifecycle status of the chat view's in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatStatus {
    #[default]
    Idle,
    Submitted,
    Streaming,
    Error,
}

impl ChatStatus {
    /// Whether a request is currently in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, ChatStatus::Submitted | ChatStatus::Streaming)
    }
}

/// Ephemeral per-request state: created on submit, `Streaming` on the first
/// event, closed on finish/error, discarded once the UI reflects the
/// terminal state.
#[derive(Debug, Clone, Default)]
pub struct StreamSession {
    pub status: ChatStatus,
    pub open_part_id: Option<String>,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return to idle, dropping any open-part tracking.
    pub fn reset(&mut self) {
        self.status = ChatStatus::Idle;
        self.open_part_id = None;
    }
}
