//! Conversation list shown to the left of the history

use crate::session::SessionSnapshot;
use crate::ui::conversation::history::flatten_title;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use unicode_width::UnicodeWidthChar;

pub struct ConversationSidebar<'a> {
    snapshot: &'a SessionSnapshot,
}

impl<'a> ConversationSidebar<'a> {
    pub fn new(snapshot: &'a SessionSnapshot) -> Self {
        Self { snapshot }
    }

    fn entry_line(&self, index: usize, width: usize) -> Line<'static> {
        let conversation = &self.snapshot.conversations[index];
        let is_active = conversation.id == self.snapshot.active_id;
        let is_waiting = self.snapshot.pending_conversation == Some(conversation.id);

        let marker = if is_waiting { "… " } else { "  " };
        let mut room = width.saturating_sub(2);
        let title: String = flatten_title(&conversation.title)
            .chars()
            .take_while(|c| {
                let Some(fits) = room.checked_sub(c.width().unwrap_or(0)) else {
                    return false;
                };
                room = fits;
                true
            })
            .collect();

        let style = if is_active {
            Style::default().fg(Color::Black).bg(Color::Gray).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };

        Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Yellow)),
            Span::styled(title, style),
        ])
    }
}

impl Widget for ConversationSidebar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("Chats ({})", self.snapshot.conversations.len()));
        let inner = block.inner(area);
        block.render(area, buf);

        let height = inner.height as usize;
        if height == 0 {
            return;
        }

        // Keep the active entry in view
        let active = self.snapshot.active_index();
        let first = (active + 1).saturating_sub(height);

        for (row, index) in (first..self.snapshot.conversations.len()).take(height).enumerate() {
            let line = self.entry_line(index, inner.width as usize);
            buf.set_line(inner.x, inner.y + row as u16, &line, inner.width);
        }
    }
}
