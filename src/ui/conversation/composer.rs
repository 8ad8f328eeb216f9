use crate::ui::conversation::commands::{command_entries, parse_slash_command, CommandEntry, SlashCommand};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    Command(SlashCommand),
    None,
}

/// Text being edited; `cursor` counts characters, not bytes
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    pub cursor: usize,
}

impl TextAreaState {
    fn byte_index(&self) -> usize {
        self.content
            .char_indices()
            .nth(self.cursor)
            .map(|(index, _)| index)
            .unwrap_or(self.content.len())
    }

    fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    fn insert_char(&mut self, c: char) {
        let index = self.byte_index();
        self.content.insert(index, c);
        self.cursor += 1;
    }

    /// Delete character before cursor
    fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        let index = self.byte_index();
        self.content.remove(index);
        true
    }

    /// Delete character at cursor
    fn delete(&mut self) -> bool {
        if self.cursor >= self.char_len() {
            return false;
        }
        let index = self.byte_index();
        self.content.remove(index);
        true
    }

    fn clear(&mut self) {
        self.content.clear();
        self.cursor = 0;
    }
}

/// Message input at the bottom of the chat view
#[derive(Debug, Clone)]
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    has_focus: bool,
    pending: bool,
    command_entries: Vec<CommandEntry>,
    filtered_commands: Vec<CommandEntry>,
    show_command_palette: bool,
    selected_command: Option<usize>,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            has_focus: true,
            pending: false,
            command_entries: command_entries(),
            filtered_commands: Vec::new(),
            show_command_palette: false,
            selected_command: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter
                if key.modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) =>
            {
                self.state.insert_char('\n');
                self.close_command_palette();
            }
            KeyCode::Enter => return self.submit(),
            KeyCode::Up if self.show_command_palette => self.move_command_selection(-1),
            KeyCode::Down if self.show_command_palette => self.move_command_selection(1),
            KeyCode::Esc if self.show_command_palette => self.close_command_palette(),
            KeyCode::Tab if self.show_command_palette => {
                self.complete_selected_command();
            }
            KeyCode::Char(c) => {
                self.state.insert_char(c);
                self.sync_command_palette();
            }
            KeyCode::Backspace => {
                if self.state.backspace() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Delete => {
                if self.state.delete() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Left => {
                self.state.cursor = self.state.cursor.saturating_sub(1);
            }
            KeyCode::Right => {
                self.state.cursor = (self.state.cursor + 1).min(self.state.char_len());
            }
            KeyCode::Home => {
                self.state.cursor = 0;
            }
            KeyCode::End => {
                self.state.cursor = self.state.char_len();
            }
            _ => {}
        }

        ComposerResult::None
    }

    fn submit(&mut self) -> ComposerResult {
        if self.show_command_palette {
            if let Some(entry) = self.selected_entry() {
                if self.pending && !entry.command.available_while_pending() {
                    return ComposerResult::None;
                }
                self.state.clear();
                self.close_command_palette();
                return ComposerResult::Command(entry.command);
            }
        }

        if self.state.content.trim().is_empty() {
            return ComposerResult::None;
        }

        if let Some(command) = parse_slash_command(&self.state.content) {
            if self.pending && !command.available_while_pending() {
                return ComposerResult::None;
            }
            self.state.clear();
            self.close_command_palette();
            return ComposerResult::Command(command);
        }

        if self.pending {
            return ComposerResult::None;
        }

        let content = std::mem::take(&mut self.state.content);
        self.state.cursor = 0;
        self.close_command_palette();
        ComposerResult::Submitted(content)
    }

    /// Open, refresh or close the palette to match the current text
    fn sync_command_palette(&mut self) {
        let content = &self.state.content;
        let is_command_prefix = content.starts_with('/') && !content.contains(char::is_whitespace);
        if is_command_prefix {
            if !self.show_command_palette {
                self.show_command_palette = true;
                self.selected_command = Some(0);
            }
            self.refresh_command_palette();
        } else {
            self.close_command_palette();
        }
    }

    fn close_command_palette(&mut self) {
        self.show_command_palette = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_command_palette(&mut self) {
        let query = self.state.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = self
            .command_entries
            .iter()
            .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
            .copied()
            .collect();

        if self.filtered_commands.is_empty() {
            self.selected_command = None;
        } else {
            let index = self.selected_command.unwrap_or(0);
            self.selected_command = Some(index.min(self.filtered_commands.len() - 1));
        }
    }

    fn move_command_selection(&mut self, delta: isize) {
        if self.filtered_commands.is_empty() {
            self.selected_command = None;
            return;
        }

        let len = self.filtered_commands.len() as isize;
        let current = self.selected_command.unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len);
        self.selected_command = Some(next as usize);
    }

    fn selected_entry(&self) -> Option<CommandEntry> {
        self.selected_command
            .and_then(|index| self.filtered_commands.get(index))
            .copied()
    }

    fn complete_selected_command(&mut self) -> bool {
        let Some(entry) = self.selected_entry() else {
            return false;
        };

        self.state.content = format!("/{}", entry.keyword);
        self.state.cursor = self.state.char_len();
        self.refresh_command_palette();
        true
    }

    /// Insert pasted text at the cursor
    pub fn paste(&mut self, text: &str) {
        for c in text.replace("\r\n", "\n").chars() {
            let c = if c == '\r' { '\n' } else { c };
            self.state.insert_char(c);
        }
        self.sync_command_palette();
    }

    /// Set focus state
    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    /// Block message submission while a reply is outstanding
    pub fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    #[cfg(test)]
    pub fn content(&self) -> &str {
        &self.state.content
    }

    pub fn is_palette_open(&self) -> bool {
        self.show_command_palette
    }

    /// Rows needed to show the palette, borders included
    pub fn palette_height(&self) -> u16 {
        if self.show_command_palette {
            (self.filtered_commands.len().clamp(1, 6) + 2) as u16
        } else {
            0
        }
    }

    /// Rows needed for the input, borders included
    pub fn input_height(&self) -> u16 {
        let lines = self.state.content.split('\n').count().clamp(1, 6);
        lines as u16 + 2
    }

    /// Render the command palette into `area`
    pub fn render_palette(&self, area: Rect, buf: &mut Buffer) {
        if !self.show_command_palette || area.height == 0 {
            return;
        }

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Commands")
            .style(Style::default().fg(Color::Blue));
        let inner = block.inner(area);
        block.render(area, buf);

        if self.filtered_commands.is_empty() {
            let line = Line::from(Span::styled("no matching command", Style::default().fg(Color::DarkGray)));
            buf.set_line(inner.x, inner.y, &line, inner.width);
            return;
        }

        for (index, entry) in self.filtered_commands.iter().enumerate() {
            if index >= inner.height as usize {
                break;
            }

            let style = if self.selected_command == Some(index) {
                Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };

            let line = Line::from(vec![
                Span::styled(format!("/{}", entry.keyword), style),
                Span::styled(" - ", Style::default().fg(Color::DarkGray)),
                Span::styled(entry.description, Style::default().fg(Color::Gray)),
            ]);

            buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
        }
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let (title, color) = if self.pending {
            ("Waiting for reply...", Color::DarkGray)
        } else if self.has_focus {
            ("Message", Color::Green)
        } else {
            ("Message", Color::Gray)
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(Style::default().fg(color));

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.state.content.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
            return;
        }

        let mut content = self.state.content.clone();
        if self.has_focus && !self.pending {
            content.insert(self.state.byte_index(), '▌');
        }

        let lines: Vec<&str> = content.split('\n').collect();
        let visible = inner_area.height as usize;
        let start = lines.len().saturating_sub(visible);
        for (i, line_text) in lines[start..].iter().enumerate() {
            let line = Line::from(vec![Span::raw(*line_text)]);
            buf.set_line(inner_area.x, inner_area.y + i as u16, &line, inner_area.width);
        }
    }
}
