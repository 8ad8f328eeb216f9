//! Conversation history display component

use crate::session::{Conversation, ExchangeFailure, Message, Role};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Renders the messages of one conversation, newest at the bottom
pub struct ConversationHistory<'a> {
    conversation: &'a Conversation,
    awaiting_reply: bool,
    failure: Option<&'a ExchangeFailure>,
    show_timestamps: bool,
    scroll_offset: usize,
}

impl<'a> ConversationHistory<'a> {
    pub fn new(conversation: &'a Conversation) -> Self {
        Self {
            conversation,
            awaiting_reply: false,
            failure: None,
            show_timestamps: true,
            scroll_offset: 0,
        }
    }

    /// Show the thinking indicator below the last message
    pub fn awaiting_reply(mut self, awaiting: bool) -> Self {
        self.awaiting_reply = awaiting;
        self
    }

    /// Show the error banner, only if it belongs to this conversation
    pub fn failure(mut self, failure: Option<&'a ExchangeFailure>) -> Self {
        self.failure = failure.filter(|f| f.conversation_id == self.conversation.id);
        self
    }

    pub fn show_timestamps(mut self, show: bool) -> Self {
        self.show_timestamps = show;
        self
    }

    /// Lines scrolled up from the bottom
    pub fn scroll_offset(mut self, offset: usize) -> Self {
        self.scroll_offset = offset;
        self
    }

    /// Every line the conversation produces at `width`, top to bottom
    pub fn lines(&self, width: u16) -> Vec<Line<'static>> {
        let mut all_lines = Vec::new();
        for message in &self.conversation.messages {
            all_lines.extend(self.render_message(message, width));
            all_lines.push(Line::default());
        }

        if self.awaiting_reply {
            all_lines.push(Line::from(vec![
                Span::styled(
                    format!("{} ", Role::Assistant.display_name()),
                    role_style(Role::Assistant).add_modifier(Modifier::BOLD),
                ),
                Span::styled("is thinking...", Style::default().fg(Color::DarkGray)),
            ]));
        }

        if let Some(failure) = self.failure {
            all_lines.push(Line::from(Span::styled(
                format!("Reply failed: {}", failure.message),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )));
            all_lines.push(Line::from(Span::styled(
                "Press Ctrl+R or type /retry to try again, Esc to dismiss.",
                Style::default().fg(Color::Red),
            )));
        }

        all_lines
    }

    /// Render a single message into lines
    fn render_message(&self, message: &Message, width: u16) -> Vec<Line<'static>> {
        let mut lines = Vec::new();

        let mut header = vec![Span::styled(
            message.role.display_name().to_string(),
            role_style(message.role).add_modifier(Modifier::BOLD),
        )];
        if self.show_timestamps {
            header.push(Span::styled(
                format!(" {}", message.created_at.format("%H:%M:%S")),
                Style::default().fg(Color::DarkGray),
            ));
        }
        lines.push(Line::from(header));

        let content_width = width.saturating_sub(2) as usize;
        for paragraph in message.content.split('\n') {
            if paragraph.trim().is_empty() {
                lines.push(Line::default());
                continue;
            }
            for content_line in wrap_text(paragraph, content_width) {
                lines.push(Line::from(vec![
                    Span::raw("  "),
                    Span::styled(content_line, content_style(message.role)),
                ]));
            }
        }

        lines
    }
}

impl Widget for ConversationHistory<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(flatten_title(&self.conversation.title));

        let inner_area = block.inner(area);
        block.render(area, buf);

        let all_lines = self.lines(inner_area.width);

        // Show the window that ends `scroll_offset` lines above the bottom
        let height = inner_area.height as usize;
        let total = all_lines.len();
        let max_offset = total.saturating_sub(height);
        let end = total - self.scroll_offset.min(max_offset);
        let start = end.saturating_sub(height);

        for (i, line) in all_lines[start..end].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

/// Titles may hold line breaks; the UI shows them on one line
pub fn flatten_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn role_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Gray),
        Role::Assistant => Style::default().fg(Color::Green),
    }
}

fn content_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::White),
        Role::Assistant => Style::default().fg(Color::Green),
    }
}

/// Wrap text to fit within `width` terminal columns, splitting words longer than a line
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_width = 0;

    for word in text.split_whitespace() {
        let word_width = word.width();
        if !current_line.is_empty() && current_width + 1 + word_width <= width {
            current_line.push(' ');
            current_line.push_str(word);
            current_width += 1 + word_width;
            continue;
        }

        if !current_line.is_empty() {
            lines.push(std::mem::take(&mut current_line));
            current_width = 0;
        }

        // Wide characters take two columns; never split one across lines
        for c in word.chars() {
            let char_width = c.width().unwrap_or(0);
            if current_width + char_width > width && !current_line.is_empty() {
                lines.push(std::mem::take(&mut current_line));
                current_width = 0;
            }
            current_line.push(c);
            current_width += char_width;
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}
