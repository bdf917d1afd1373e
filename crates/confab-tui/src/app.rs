use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use ratatui::widgets::{Block, Borders};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tui_textarea::TextArea;

use confab_core::config::{MODELS, model_name};
use confab_core::controllers::{ChatController, TurnRequest};
use confab_core::models::Message;
use confab_core::repositories::{SessionData, SessionRepository};
use confab_core::stream::StreamEvent;
use confab_core::transport::{ChatApi, ChatTransport, TransportError};

use crate::ui;

/// Events delivered to the main loop by background tasks.
enum AppEvent {
    Stream(StreamEvent),
    StreamClosed,
    TransportFailed(TransportError),
    MessagesFetched {
        conversation_id: String,
        epoch: u64,
        messages: Vec<Message>,
    },
}

enum Incoming {
    Terminal(Event),
    App(AppEvent),
    Closed,
}

/// The terminal front-end: owns the controller and drives it from a single
/// select loop over terminal input and background-task events.
pub struct App {
    pub(crate) controller: ChatController,
    transport: Arc<dyn ChatTransport>,
    api: Arc<ChatApi>,
    repository: Arc<dyn SessionRepository>,
    pub(crate) input: TextArea<'static>,
    /// Lines scrolled up from the bottom of the message pane.
    pub(crate) scroll_from_bottom: u16,
    /// Whether the restored session is past its staleness window and the
    /// catalogue should be refetched on startup.
    refresh_on_start: bool,
    events_tx: Option<mpsc::Sender<AppEvent>>,
    should_quit: bool,
}

impl App {
    pub fn new(
        controller: ChatController,
        transport: Arc<dyn ChatTransport>,
        api: Arc<ChatApi>,
        repository: Arc<dyn SessionRepository>,
        refresh_on_start: bool,
    ) -> Self {
        let mut app = Self {
            controller,
            transport,
            api,
            repository,
            input: TextArea::default(),
            scroll_from_bottom: 0,
            refresh_on_start,
            events_tx: None,
            should_quit: false,
        };
        app.style_input();
        app
    }

    fn style_input(&mut self) {
        self.input.set_cursor_line_style(ratatui::style::Style::default());
        self.input.set_block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", model_name(self.controller.model()))),
        );
    }

    pub async fn run(mut self, mut terminal: DefaultTerminal) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<AppEvent>(64);
        self.events_tx = Some(tx);
        let mut terminal_events = EventStream::new();

        if self.refresh_on_start {
            self.hydrate_conversations().await;
        }

        loop {
            terminal.draw(|frame| ui::draw(frame, &self))?;

            let incoming = tokio::select! {
                maybe = terminal_events.next() => match maybe {
                    Some(Ok(event)) => Incoming::Terminal(event),
                    Some(Err(err)) => {
                        warn!(error = %err, "terminal event error");
                        continue;
                    }
                    None => Incoming::Closed,
                },
                maybe = rx.recv() => match maybe {
                    Some(event) => Incoming::App(event),
                    None => Incoming::Closed,
                },
            };

            match incoming {
                Incoming::Terminal(event) => self.handle_terminal_event(event),
                Incoming::App(event) => self.handle_app_event(event).await,
                Incoming::Closed => break,
            }

            if self.should_quit {
                break;
            }
        }

        self.controller.abandon();
        self.save_session().await;
        Ok(())
    }

    // ---- terminal input ----

    fn handle_terminal_event(&mut self, event: Event) {
        let Event::Key(key) = event else { return };
        if key.kind != KeyEventKind::Press {
            return;
        }
        self.handle_key(key);
    }

    fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match (key.code, ctrl) {
            (KeyCode::Char('c'), true) => self.should_quit = true,
            (KeyCode::Esc, _) => self.controller.abandon(),
            (KeyCode::Char('r'), true) => self.regenerate(),
            (KeyCode::Char('t'), true) => {
                self.controller.start_new_conversation();
                self.scroll_from_bottom = 0;
            }
            (KeyCode::Char('p'), true) => self.select_adjacent(-1),
            (KeyCode::Char('n'), true) => self.select_adjacent(1),
            (KeyCode::Char('g'), true) => self.cycle_model(),
            (KeyCode::PageUp, _) => {
                self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(10);
            }
            (KeyCode::PageDown, _) => {
                self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(10);
            }
            (KeyCode::Enter, false) if !key.modifiers.contains(KeyModifiers::SHIFT) => {
                self.submit();
            }
            _ => {
                self.input.input(key);
            }
        }
    }

    fn submit(&mut self) {
        if self.controller.status().is_busy() {
            return;
        }
        let text = self.input.lines().join("\n");
        match self.controller.submit(&text) {
            Ok(Some(request)) => {
                self.input = TextArea::default();
                self.style_input();
                self.scroll_from_bottom = 0;
                self.spawn_turn(request);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "submit failed"),
        }
    }

    fn regenerate(&mut self) {
        match self.controller.regenerate() {
            Ok(Some(request)) => {
                self.scroll_from_bottom = 0;
                self.spawn_turn(request);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "regenerate failed"),
        }
    }

    fn select_adjacent(&mut self, offset: i64) {
        let order: Vec<String> = self
            .controller
            .cache()
            .list_recent()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        if order.is_empty() {
            return;
        }

        let current = self
            .controller
            .active_conversation()
            .and_then(|id| order.iter().position(|o| o == id));
        let next = match current {
            Some(index) => {
                (index as i64 + offset).rem_euclid(order.len() as i64) as usize
            }
            None => 0,
        };

        let id = order[next].clone();
        if self.controller.select_conversation(&id) {
            self.scroll_from_bottom = 0;
            self.maybe_fetch_messages(id);
        }
    }

    fn cycle_model(&mut self) {
        let current = MODELS
            .iter()
            .position(|m| m.value == self.controller.model())
            .unwrap_or(0);
        let next = MODELS[(current + 1) % MODELS.len()];
        self.controller.set_model(next.value.to_string());
        self.style_input();
    }

    // ---- background tasks ----

    async fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Stream(event) => {
                let terminal = matches!(
                    event,
                    StreamEvent::Finish { .. } | StreamEvent::Error { .. }
                );
                self.controller.on_event(&event);
                if terminal {
                    self.save_session().await;
                }
            }
            AppEvent::StreamClosed => {
                self.controller.on_stream_closed();
                self.save_session().await;
            }
            AppEvent::TransportFailed(err) => self.controller.on_transport_error(&err),
            AppEvent::MessagesFetched {
                conversation_id,
                epoch,
                messages,
            } => {
                self.controller
                    .apply_fetched_messages(epoch, &conversation_id, messages);
            }
        }
    }

    fn spawn_turn(&mut self, request: TurnRequest) {
        let Some(tx) = self.events_tx.clone() else { return };
        let transport = self.transport.clone();
        let TurnRequest {
            messages,
            model,
            cancel,
            ..
        } = request;

        tokio::spawn(async move {
            match transport.send(messages, model).await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        if cancel.load(Ordering::Relaxed) {
                            return;
                        }
                        if tx.send(AppEvent::Stream(event)).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(AppEvent::StreamClosed).await;
                }
                Err(err) => {
                    let _ = tx.send(AppEvent::TransportFailed(err)).await;
                }
            }
        });
    }

    /// Seed the sidebar from the server catalogue when one is reachable;
    /// otherwise keep the restored local session.
    async fn hydrate_conversations(&mut self) {
        let epoch = self.controller.conversations_epoch();
        match self.api.get_chats().await {
            Ok(chats) => {
                let conversations = chats
                    .into_iter()
                    .map(|summary| summary.into_conversation())
                    .collect();
                self.controller
                    .apply_fetched_conversations(epoch, conversations);
            }
            Err(err) => {
                debug!(error = %err, "catalogue unavailable; using local session only");
            }
        }
    }

    fn maybe_fetch_messages(&mut self, conversation_id: String) {
        let cached = self
            .controller
            .cache()
            .messages(&conversation_id)
            .is_some_and(|m| !m.is_empty());
        if cached {
            return;
        }

        let Some(tx) = self.events_tx.clone() else { return };
        let epoch = self.controller.messages_epoch(&conversation_id);
        let api = self.api.clone();

        tokio::spawn(async move {
            match api.get_chat(&conversation_id).await {
                Ok(stored) => {
                    let messages = stored.into_iter().map(|m| m.into_message()).collect();
                    let _ = tx
                        .send(AppEvent::MessagesFetched {
                            conversation_id,
                            epoch,
                            messages,
                        })
                        .await;
                }
                Err(err) => debug!(error = %err, "message fetch failed"),
            }
        });
    }

    async fn save_session(&self) {
        let data = match SessionData::capture(self.controller.cache()) {
            Ok(data) => data,
            Err(err) => {
                warn!(error = %err, "failed to capture session");
                return;
            }
        };
        if let Err(err) = self.repository.save(data).await {
            warn!(error = %err, "failed to persist session");
        }
    }
}
