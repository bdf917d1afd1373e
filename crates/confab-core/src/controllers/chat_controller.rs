use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::cache::{CacheKey, CacheValue, ConversationCache, MutationError};
use crate::models::{Conversation, Message, Role, derive_title};
use crate::repositories::{RepositoryError, SessionData};
use crate::stream::{ChatStatus, FinishReason, StreamEvent, StreamSession, Transcript};
use crate::transport::{ChatTransport, TransportError};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Everything the transport needs to issue one turn: the full prior history
/// including the just-written user message, the model selector, and the
/// cancellation flag the driver checks between events.
pub struct TurnRequest {
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub model: String,
    pub cancel: Arc<AtomicBool>,
}

/// The in-flight turn: live transcript plus its cancellation flag. Owned by
/// the controller and discarded on finish, error, or abandon.
struct LiveTurn {
    conversation_id: String,
    transcript: Transcript,
    cancel: Arc<AtomicBool>,
}

/// The chat orchestrator.
///
/// Owns the conversation cache (sole writer) and the per-request stream
/// session, and folds decoded events into the live transcript. State
/// machine: `Idle → Submitted → Streaming → {Idle | Error}`. Only committed
/// messages are ever written to the cache — an erroring or abandoned stream
/// leaves it untouched.
pub struct ChatController {
    cache: ConversationCache,
    auth: Arc<dyn AuthProvider>,
    session: StreamSession,
    live: Option<LiveTurn>,
    active_conversation: Option<String>,
    model_id: String,
    last_error: Option<String>,
    last_finish: Option<FinishReason>,
}

impl ChatController {
    pub fn new(cache: ConversationCache, auth: Arc<dyn AuthProvider>, model_id: String) -> Self {
        Self {
            cache,
            auth,
            session: StreamSession::new(),
            live: None,
            active_conversation: None,
            model_id,
            last_error: None,
            last_finish: None,
        }
    }

    // ---- views ----

    pub fn status(&self) -> ChatStatus {
        self.session.status
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn cache(&self) -> &ConversationCache {
        &self.cache
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.active_conversation.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.model_id
    }

    pub fn set_model(&mut self, model_id: String) {
        self.model_id = model_id;
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_finish(&self) -> Option<FinishReason> {
        self.last_finish
    }

    /// The message list the UI renders: the live transcript while a turn is
    /// in flight, the cache otherwise.
    pub fn visible_messages(&self) -> Vec<Message> {
        if let Some(turn) = &self.live {
            return turn.transcript.messages().to_vec();
        }
        self.active_conversation
            .as_deref()
            .and_then(|id| self.cache.messages(id))
            .map(<[Message]>::to_vec)
            .unwrap_or_default()
    }

    pub fn live_transcript(&self) -> Option<&Transcript> {
        self.live.as_ref().map(|turn| &turn.transcript)
    }

    // ---- state machine ----

    /// Submit user input. Empty or whitespace-only input never triggers a
    /// transition or a cache write.
    ///
    /// On the first message of a new chat the conversation record is created
    /// (title derived from the message) before the user message is written,
    /// so no message is ever attributed to a non-existent conversation.
    pub fn submit(&mut self, text: &str) -> Result<Option<TurnRequest>, ChatError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        if self.session.status.is_busy() {
            debug!("submit while a turn is in flight; abandoning previous turn");
            self.abandon();
        }

        let conversation_id = match self
            .active_conversation
            .as_deref()
            .filter(|id| self.cache.conversation(id).is_some())
        {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                let record = Conversation::new(id.clone(), derive_title(text));
                let mutation = self.cache.create_conversation(record);
                self.cache.commit(mutation)?;
                info!(conv_id = %id, "created conversation");
                self.active_conversation = Some(id.clone());
                id
            }
        };

        let mutation = self
            .cache
            .append_message(&conversation_id, Message::user(text));
        self.cache.commit(mutation)?;

        Ok(Some(self.begin_turn(conversation_id)))
    }

    /// Re-issue the last user message as a new request. The previous
    /// assistant response is dropped from the live view and from the cached
    /// turn, so completion leaves exactly one assistant message for the
    /// turn; the user message is not duplicated.
    pub fn regenerate(&mut self) -> Result<Option<TurnRequest>, ChatError> {
        if self.session.status.is_busy() {
            debug!("regenerate while a turn is in flight; ignoring");
            return Ok(None);
        }
        let Some(conversation_id) = self.active_conversation.clone() else {
            return Ok(None);
        };
        let messages = self.cache.messages(&conversation_id).unwrap_or(&[]);
        let Some(last_user) = messages.iter().rposition(|m| m.role == Role::User) else {
            return Ok(None);
        };

        if last_user + 1 < messages.len() {
            let keep = last_user + 1;
            let mutation = self.cache.optimistic_write(
                CacheKey::messages(&conversation_id),
                |value| {
                    let mut messages = match value {
                        Some(CacheValue::Messages(messages)) => messages,
                        _ => Vec::new(),
                    };
                    messages.truncate(keep);
                    CacheValue::Messages(messages)
                },
            )?;
            self.cache.commit(mutation)?;
        }

        Ok(Some(self.begin_turn(conversation_id)))
    }

    fn begin_turn(&mut self, conversation_id: String) -> TurnRequest {
        let messages = self
            .cache
            .messages(&conversation_id)
            .map(<[Message]>::to_vec)
            .unwrap_or_default();
        let cancel = Arc::new(AtomicBool::new(false));

        self.live = Some(LiveTurn {
            conversation_id: conversation_id.clone(),
            transcript: Transcript::with_history(messages.clone()),
            cancel: cancel.clone(),
        });
        self.session = StreamSession {
            status: ChatStatus::Submitted,
            open_part_id: None,
        };
        self.last_error = None;
        self.last_finish = None;

        TurnRequest {
            conversation_id,
            messages,
            model: self.model_id.clone(),
            cancel,
        }
    }

    /// Fold one decoded event into the turn.
    pub fn on_event(&mut self, event: &StreamEvent) {
        let Some(cancelled) = self
            .live
            .as_ref()
            .map(|turn| turn.cancel.load(Ordering::Relaxed))
        else {
            debug!("stream event with no live turn; ignoring");
            return;
        };
        if cancelled {
            return;
        }

        if self.session.status == ChatStatus::Submitted {
            self.session.status = ChatStatus::Streaming;
        }

        match event {
            StreamEvent::Error { message } => {
                warn!(error = %message, "stream error");
                self.last_error = Some(message.clone());
                self.live = None;
                self.session.status = ChatStatus::Error;
                self.session.open_part_id = None;
            }
            StreamEvent::Finish { reason } => {
                self.last_finish = Some(*reason);
                if let Some(turn) = self.live.take() {
                    let transcript = turn.transcript.apply(event);
                    self.commit_turn(&turn.conversation_id, &transcript);
                }
                self.session.reset();
            }
            _ => {
                if let Some(turn) = self.live.as_mut() {
                    let transcript = std::mem::take(&mut turn.transcript);
                    turn.transcript = transcript.apply(event);
                    self.session.open_part_id =
                        turn.transcript.open_text_part().map(str::to_string);
                }
            }
        }
    }

    /// The stream ended without a terminal event: close out the turn as if
    /// a `finish` with an unknown reason had arrived.
    pub fn on_stream_closed(&mut self) {
        if self.session.status.is_busy() && self.live.is_some() {
            debug!("stream closed without a finish event");
            self.on_event(&StreamEvent::Finish {
                reason: FinishReason::Unknown,
            });
        }
    }

    /// A transport failure before or during the exchange. The in-progress
    /// assistant message is discarded; the cache is untouched. Unauthorized
    /// failures additionally end the external auth session.
    pub fn on_transport_error(&mut self, err: &TransportError) {
        warn!(error = %err, "transport error");
        self.last_error = Some(err.to_string());
        self.live = None;
        self.session.status = ChatStatus::Error;
        self.session.open_part_id = None;

        if err.is_unauthorized() {
            self.auth.logout();
        }
    }

    /// Abandon the in-flight turn (view unmount, navigation). Partially
    /// streamed content is never committed.
    pub fn abandon(&mut self) {
        if let Some(turn) = self.live.take() {
            turn.cancel.store(true, Ordering::Relaxed);
            debug!(conv_id = %turn.conversation_id, "turn abandoned");
        }
        self.session.reset();
    }

    fn commit_turn(&mut self, conversation_id: &str, transcript: &Transcript) {
        let mut committed = 0usize;
        for message in transcript.turn_messages() {
            if message.role != Role::Assistant || message.parts.is_empty() {
                continue;
            }
            let mutation = self.cache.append_message(conversation_id, message.clone());
            if let Err(err) = self.cache.commit(mutation) {
                error!(error = %err, "failed to commit assistant message");
            } else {
                committed += 1;
            }
        }

        if committed > 0
            && let Ok(mutation) = self.cache.touch(conversation_id)
        {
            let _ = self.cache.commit(mutation);
        }
        debug!(conv_id = %conversation_id, committed, "turn committed");
    }

    // ---- conversation selection ----

    /// Switch the view to an existing conversation, abandoning any in-flight
    /// turn. Returns false when the conversation is unknown.
    pub fn select_conversation(&mut self, conversation_id: &str) -> bool {
        if self.cache.conversation(conversation_id).is_none() {
            return false;
        }
        self.abandon();
        self.active_conversation = Some(conversation_id.to_string());
        self.last_error = None;
        true
    }

    /// Switch to a fresh, not-yet-created conversation. The record is
    /// created when the first message is submitted.
    pub fn start_new_conversation(&mut self) {
        self.abandon();
        self.active_conversation = None;
        self.last_error = None;
    }

    // ---- hydration (server catalogue / session restore) ----

    /// Epoch to capture before fetching the conversation list.
    pub fn conversations_epoch(&self) -> u64 {
        self.cache.epoch(&CacheKey::Conversations)
    }

    /// Epoch to capture before fetching one conversation's messages.
    pub fn messages_epoch(&self, conversation_id: &str) -> u64 {
        self.cache.epoch(&CacheKey::messages(conversation_id))
    }

    /// Apply a fetched conversation list, unless a mutation touched the key
    /// since `epoch` was captured (the fetch is then stale and dropped).
    pub fn apply_fetched_conversations(
        &mut self,
        epoch: u64,
        conversations: Vec<Conversation>,
    ) -> bool {
        if self.cache.epoch(&CacheKey::Conversations) != epoch {
            debug!("fetched conversations are stale; dropping");
            return false;
        }
        self.cache.replace_conversations(conversations);
        true
    }

    /// Apply fetched messages for one conversation, with the same staleness
    /// check.
    pub fn apply_fetched_messages(
        &mut self,
        epoch: u64,
        conversation_id: &str,
        messages: Vec<Message>,
    ) -> bool {
        if self.cache.epoch(&CacheKey::messages(conversation_id)) != epoch {
            debug!(conv_id = %conversation_id, "fetched messages are stale; dropping");
            return false;
        }
        self.cache.replace_messages(conversation_id, messages);
        true
    }

    /// Restore cache contents from a persisted session.
    pub fn restore(&mut self, data: SessionData) -> Result<(), ChatError> {
        let (conversations, messages) = data.into_cache_contents()?;
        self.cache.replace_all(conversations, messages);
        Ok(())
    }

    // ---- drivers ----

    /// Issue a turn and fold its whole event stream. Convenience driver for
    /// callers that do not multiplex the stream with other input sources.
    pub async fn run_turn(
        &mut self,
        transport: &dyn ChatTransport,
        request: TurnRequest,
    ) -> Result<(), ChatError> {
        let TurnRequest {
            messages,
            model,
            cancel,
            ..
        } = request;

        match transport.send(messages, model).await {
            Ok(mut events) => {
                while let Some(event) = events.next().await {
                    if cancel.load(Ordering::Relaxed) {
                        self.abandon();
                        return Ok(());
                    }
                    self.on_event(&event);
                    if !self.session.status.is_busy() {
                        return Ok(());
                    }
                }
                self.on_stream_closed();
                Ok(())
            }
            Err(err) => {
                self.on_transport_error(&err);
                Err(ChatError::Transport(err))
            }
        }
    }
}
