use crate::exchange::ExchangeOutcome;
use crate::session::ConversationId;

/// Intents emitted by the UI, applied to the session by the app loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiIntent {
    /// Send text to the active conversation
    Submit(String),

    /// Show a specific conversation
    Select(ConversationId),

    /// Start a fresh conversation and switch to it
    NewConversation,

    /// Move to the next conversation in the sidebar
    NextConversation,

    /// Move to the previous conversation in the sidebar
    PreviousConversation,

    /// Show or hide the conversation list
    ToggleSidebar,

    /// Ask again for the reply that failed
    Retry,

    /// Hide the reply error banner
    DismissError,

    /// Show the command list
    Help,

    /// Leave the application
    Quit,
}

/// Events consumed by the app loop
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Key press from the terminal
    Key(crossterm::event::KeyEvent),

    /// Pasted text, inserted into the composer
    Paste(String),

    /// Terminal resize
    Resize(u16, u16),

    /// A background exchange finished
    Exchange(ExchangeOutcome),
}
