use std::str::FromStr;

use crate::events::UiIntent;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Start a new conversation
    New,
    /// Switch to the next conversation
    Next,
    /// Switch to the previous conversation
    Prev,
    /// Show or hide the conversation list
    Sidebar,
    /// Retry the last failed reply
    Retry,
    /// Show help
    Help,
    /// Exit the application
    Quit,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::New => "start a new conversation",
            SlashCommand::Next => "switch to the next conversation",
            SlashCommand::Prev => "switch to the previous conversation",
            SlashCommand::Sidebar => "show or hide the conversation list",
            SlashCommand::Retry => "ask again for a reply that failed",
            SlashCommand::Help => "show available commands",
            SlashCommand::Quit => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }

    /// Whether this command can be run while a reply is pending.
    pub fn available_while_pending(self) -> bool {
        !matches!(self, SlashCommand::Retry)
    }

    pub fn intent(self) -> UiIntent {
        match self {
            SlashCommand::New => UiIntent::NewConversation,
            SlashCommand::Next => UiIntent::NextConversation,
            SlashCommand::Prev => UiIntent::PreviousConversation,
            SlashCommand::Sidebar => UiIntent::ToggleSidebar,
            SlashCommand::Retry => UiIntent::Retry,
            SlashCommand::Help => UiIntent::Help,
            SlashCommand::Quit => UiIntent::Quit,
        }
    }
}

/// Parse a slash command from user input.
///
/// Only a lone command word counts; "/next steps for the plan" is a message.
pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let head = input.trim().strip_prefix('/')?;
    if head.is_empty() || head.contains(char::is_whitespace) {
        return None;
    }

    SlashCommand::from_str(head).ok().or_else(|| match head.to_lowercase().as_str() {
        "q" | "bye" | "exit" => Some(SlashCommand::Quit),
        "n" | "clear" => Some(SlashCommand::New),
        "previous" | "p" => Some(SlashCommand::Prev),
        "r" => Some(SlashCommand::Retry),
        "h" | "?" => Some(SlashCommand::Help),
        "b" => Some(SlashCommand::Sidebar),
        _ => None,
    })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for entry in command_entries() {
        help.push_str(&format!("/{} - {}\n", entry.keyword, entry.description));
    }

    help.push_str("\nKeys: Enter send, Alt+Enter (or Shift+Enter) new line, Ctrl+N new conversation,");
    help.push_str("\nAlt+Up/Alt+Down switch conversation, Ctrl+B toggle list, Ctrl+R retry,");
    help.push_str("\nEsc dismiss, Ctrl+C quit.");

    help
}
