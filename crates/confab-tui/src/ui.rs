use chrono::DateTime;
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Wrap};

use confab_core::config::model_name;
use confab_core::models::{Message, Part, Role};
use confab_core::stream::ChatStatus;

use crate::app::App;

pub fn draw(frame: &mut Frame, app: &App) {
    let [sidebar, main] =
        Layout::horizontal([Constraint::Length(28), Constraint::Min(40)]).areas(frame.area());
    let [messages, input, footer] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(4),
        Constraint::Length(1),
    ])
    .areas(main);

    draw_sidebar(frame, app, sidebar);
    draw_messages(frame, app, messages);
    frame.render_widget(&app.input, input);
    draw_footer(frame, app, footer);
}

fn draw_sidebar(frame: &mut Frame, app: &App, area: Rect) {
    let active = app.controller.active_conversation();
    let items: Vec<ListItem> = app
        .controller
        .cache()
        .list_recent()
        .iter()
        .map(|conversation| {
            let is_active = Some(conversation.id()) == active;
            let style = if is_active {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let stamp = format_timestamp(conversation.updated_at_unix());
            ListItem::new(vec![
                Line::styled(conversation.title().to_string(), style),
                Line::styled(format!("  {stamp}"), Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Conversations "),
    );
    frame.render_widget(list, area);
}

fn draw_messages(frame: &mut Frame, app: &App, area: Rect) {
    let messages = app.controller.visible_messages();
    let streaming = app.controller.status() == ChatStatus::Streaming;
    let mut lines: Vec<Line> = Vec::new();

    for (message_idx, message) in messages.iter().enumerate() {
        let is_last_message = message_idx + 1 == messages.len();
        push_message_lines(&mut lines, message, is_last_message, streaming);
        lines.push(Line::default());
    }

    if app.controller.status() == ChatStatus::Submitted {
        lines.push(Line::styled("...", Style::default().fg(Color::DarkGray)));
    }

    let inner_height = area.height.saturating_sub(2);
    let total = lines.len() as u16;
    let bottom = total.saturating_sub(inner_height);
    let scroll = bottom.saturating_sub(app.scroll_from_bottom);

    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0))
        .block(Block::default().borders(Borders::ALL).title(" Chat "));
    frame.render_widget(paragraph, area);
}

fn push_message_lines(
    lines: &mut Vec<Line<'_>>,
    message: &Message,
    is_last_message: bool,
    streaming: bool,
) {
    let (label, style) = match message.role {
        Role::User => ("You", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        Role::Assistant => (
            "Assistant",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Role::System => ("System", Style::default().fg(Color::Yellow)),
    };
    lines.push(Line::styled(label.to_string(), style));

    let part_count = message.parts.len();
    for (part_idx, part) in message.parts.iter().enumerate() {
        let is_live =
            streaming && is_last_message && part_idx + 1 == part_count;
        match part {
            Part::Text { text } => {
                for text_line in text.lines() {
                    lines.push(Line::raw(text_line.to_string()));
                }
                if text.is_empty() {
                    lines.push(Line::default());
                }
            }
            Part::Reasoning { text } => {
                if is_live {
                    lines.push(Line::styled(
                        "reasoning:",
                        Style::default().fg(Color::Magenta),
                    ));
                    for text_line in text.lines() {
                        lines.push(Line::styled(
                            format!("  {text_line}"),
                            Style::default().fg(Color::DarkGray),
                        ));
                    }
                } else {
                    // Collapsed by default once the part is no longer live.
                    lines.push(Line::styled(
                        format!("> reasoning ({} chars)", text.chars().count()),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
            }
            Part::Source { url, title } => {
                let label = title.as_deref().unwrap_or(url);
                lines.push(Line::styled(
                    format!("[source] {label}"),
                    Style::default().fg(Color::Blue),
                ));
            }
            Part::File {
                filename,
                media_type,
                ..
            } => {
                lines.push(Line::styled(
                    format!("[file] {filename} ({media_type})"),
                    Style::default().fg(Color::Blue),
                ));
            }
        }
    }
}

fn draw_footer(frame: &mut Frame, app: &App, area: Rect) {
    let status = match app.controller.status() {
        ChatStatus::Idle => Span::styled("idle", Style::default().fg(Color::DarkGray)),
        ChatStatus::Submitted => Span::styled("submitted", Style::default().fg(Color::Yellow)),
        ChatStatus::Streaming => Span::styled("streaming", Style::default().fg(Color::Green)),
        ChatStatus::Error => Span::styled("error", Style::default().fg(Color::Red)),
    };

    let mut spans = vec![
        status,
        Span::raw("  "),
        Span::styled(
            model_name(app.controller.model()).to_string(),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  "),
    ];

    if let Some(error) = app.controller.last_error() {
        spans.push(Span::styled(
            format!("{error}  "),
            Style::default().fg(Color::Red),
        ));
        spans.push(Span::styled(
            "ctrl-r retry  ",
            Style::default().fg(Color::DarkGray),
        ));
    }

    spans.push(Span::styled(
        "enter send | esc cancel | ctrl-t new | ctrl-p/n switch | ctrl-g model | ctrl-c quit",
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn format_timestamp(unix: i64) -> String {
    DateTime::from_timestamp(unix, 0)
        .map(|stamp| stamp.format("%b %d %H:%M").to_string())
        .unwrap_or_default()
}
