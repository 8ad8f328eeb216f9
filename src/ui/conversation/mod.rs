//! Conversation UI components for the chat interface

pub mod commands;
pub mod composer;
pub mod history;
pub mod manager;
pub mod sidebar;

pub use commands::get_help_text;
pub use composer::{ComposerResult, ConversationComposer};
pub use history::ConversationHistory;
pub use manager::ChatView;
pub use sidebar::ConversationSidebar;
