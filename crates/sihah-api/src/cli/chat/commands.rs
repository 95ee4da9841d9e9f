//! Slash command parsing for the chat loop.
//!
//! Commands start with `/` and drive the conversation lifecycle from the
//! terminal.

use console::style;

/// Available slash commands in the chat loop.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    /// Show available commands.
    Help,
    /// Leave the loop without changing the conversation.
    Exit,
    /// Print the transcript so far.
    History,
    /// End the conversation.
    End(Option<String>),
    /// Pause the conversation.
    Pause(Option<String>),
    /// Hand the conversation to a target, with an optional reason.
    Transfer {
        target: String,
        reason: Option<String>,
    },
    /// Unknown command or missing argument.
    Unknown(String),
}

/// Parse user input as a slash command.
///
/// Returns `None` if the input doesn't start with `/`.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let parts: Vec<&str> = trimmed.splitn(2, ' ').collect();
    let cmd = parts[0].to_lowercase();
    let arg = parts
        .get(1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    match cmd.as_str() {
        "/help" | "/h" | "/?" => Some(ChatCommand::Help),
        "/exit" | "/quit" | "/q" => Some(ChatCommand::Exit),
        "/history" => Some(ChatCommand::History),
        "/end" => Some(ChatCommand::End(arg)),
        "/pause" => Some(ChatCommand::Pause(arg)),
        "/transfer" => match arg {
            Some(rest) => {
                let mut split = rest.splitn(2, ' ');
                let target = split.next().unwrap_or_default().to_string();
                let reason = split
                    .next()
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty());
                Some(ChatCommand::Transfer { target, reason })
            }
            None => Some(ChatCommand::Unknown("/transfer requires a target".to_string())),
        },
        other => Some(ChatCommand::Unknown(other.to_string())),
    }
}

/// Print the command list.
pub fn print_help() {
    println!();
    println!("  {}", style("Commands").bold());
    println!("  {}            show this help", style("/help").cyan());
    println!("  {}         print the transcript", style("/history").cyan());
    println!("  {} [reason]    pause the conversation", style("/pause").cyan());
    println!("  {} [reason]      end the conversation", style("/end").cyan());
    println!(
        "  {} <target> [reason]  hand over to a queue or human",
        style("/transfer").cyan()
    );
    println!("  {}            leave without ending", style("/exit").cyan());
    println!();
}
