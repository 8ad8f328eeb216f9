use crate::config::UiConfig;
use crate::events::UiIntent;
use crate::session::SessionSnapshot;
use crate::ui::conversation::{
    get_help_text, ComposerResult, ConversationComposer, ConversationHistory, ConversationSidebar,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};

const SCROLL_STEP: usize = 5;

/// The chat screen: sidebar, history and composer.
///
/// It turns key presses into [`UiIntent`]s and draws whatever snapshot it is
/// given; it never touches the session itself.
pub struct ChatView {
    composer: ConversationComposer,
    ui: UiConfig,
    scroll_offset: usize,
    show_help: bool,
    show_sidebar: bool,
}

impl ChatView {
    pub fn new(ui: UiConfig) -> Self {
        Self {
            composer: ConversationComposer::new("Type a message... (/ for commands)"),
            show_sidebar: ui.show_sidebar,
            ui,
            scroll_offset: 0,
            show_help: false,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent, snapshot: &SessionSnapshot) -> Option<UiIntent> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        self.composer.set_pending(snapshot.pending);

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        match key.code {
            KeyCode::Char('c') if ctrl => return Some(UiIntent::Quit),
            KeyCode::Char('n') if ctrl => return Some(UiIntent::NewConversation),
            KeyCode::Char('b') if ctrl => return Some(UiIntent::ToggleSidebar),
            KeyCode::Char('r') if ctrl => return self.retry_intent(snapshot),
            KeyCode::Char(digit @ '1'..='9') if alt => {
                let index = digit as usize - '1' as usize;
                return snapshot
                    .conversations
                    .get(index)
                    .map(|conversation| UiIntent::Select(conversation.id));
            }
            KeyCode::Up if ctrl || alt => return Some(UiIntent::PreviousConversation),
            KeyCode::Down if ctrl || alt => return Some(UiIntent::NextConversation),
            KeyCode::PageUp => {
                self.scroll_offset += SCROLL_STEP;
                return None;
            }
            KeyCode::PageDown => {
                self.scroll_offset = self.scroll_offset.saturating_sub(SCROLL_STEP);
                return None;
            }
            KeyCode::Esc if !self.composer.is_palette_open() => {
                if self.show_help {
                    self.show_help = false;
                    return None;
                }
                return snapshot.failure.as_ref().map(|_| UiIntent::DismissError);
            }
            _ => {}
        }

        match self.composer.handle_key(key) {
            ComposerResult::Submitted(text) => {
                self.scroll_offset = 0;
                Some(UiIntent::Submit(text))
            }
            ComposerResult::Command(command) => Some(command.intent()),
            ComposerResult::None => None,
        }
    }

    /// Pasted text goes straight into the composer
    pub fn handle_paste(&mut self, text: &str) {
        self.composer.paste(text);
    }

    fn retry_intent(&self, snapshot: &SessionSnapshot) -> Option<UiIntent> {
        (snapshot.failure.is_some() && !snapshot.pending).then_some(UiIntent::Retry)
    }

    pub fn show_help(&mut self) {
        self.show_help = true;
    }

    pub fn is_help_visible(&self) -> bool {
        self.show_help
    }

    pub fn toggle_sidebar(&mut self) {
        self.show_sidebar = !self.show_sidebar;
    }

    pub fn is_sidebar_visible(&self) -> bool {
        self.show_sidebar
    }

    /// Start at the bottom of a conversation after switching to it
    pub fn reset_scroll(&mut self) {
        self.scroll_offset = 0;
    }

    /// Render the conversation UI components
    pub fn render(&mut self, snapshot: &SessionSnapshot, area: Rect, buf: &mut Buffer) {
        self.composer.set_pending(snapshot.pending);
        self.composer.set_focus(!self.show_help);

        let sidebar_width = if self.show_sidebar { self.ui.sidebar_width } else { 0 };
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(sidebar_width), Constraint::Min(20)])
            .split(area);

        if self.show_sidebar {
            ConversationSidebar::new(snapshot).render(columns[0], buf);
        }

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(self.composer.palette_height()),
                Constraint::Length(self.composer.input_height()),
            ])
            .split(columns[1]);

        let conversation = snapshot.active_conversation();
        ConversationHistory::new(conversation)
            .awaiting_reply(snapshot.pending_conversation == Some(conversation.id))
            .failure(snapshot.failure.as_ref())
            .show_timestamps(self.ui.show_timestamps)
            .scroll_offset(self.scroll_offset)
            .render(rows[0], buf);

        self.composer.render_palette(rows[1], buf);
        (&self.composer).render(rows[2], buf);

        if self.show_help {
            render_help(area, buf);
        }
    }
}

fn render_help(area: Rect, buf: &mut Buffer) {
    let width = area.width.saturating_sub(4).min(72);
    let height = area.height.saturating_sub(2).min(16);
    let popup = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };

    Clear.render(popup, buf);
    Paragraph::new(get_help_text())
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help (Esc to close)"),
        )
        .render(popup, buf);
}
