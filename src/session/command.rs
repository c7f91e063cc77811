//! User input commands and tool-raised session commands

/// One line of user input at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Quit,
    SwapThread,
    SwapAssistant,
    Tools,
    Message(String),
}

impl ChatCommand {
    /// Blank input yields `None`
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        let command = match trimmed {
            "" => return None,
            "Q" | "q" => ChatCommand::Quit,
            "swapT" => ChatCommand::SwapThread,
            "swapA" => ChatCommand::SwapAssistant,
            "tool" => ChatCommand::Tools,
            _ => ChatCommand::Message(trimmed.to_string()),
        };
        Some(command)
    }
}

/// A change requested by a tool, applied by the session between turns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    ChangeAssistant { assistant_id: String },
}
