//! Input line parsing

/// One line of user input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Plain text to send
    Send(String),
    /// Re-send the last message
    Retry,
    /// Stop the reply in progress
    Abort,
    /// Empty the transcript
    Clear,
    /// Empty the transcript and start a new session
    New,
    /// Print the transcript
    History,
    /// Print status and identifiers
    Status,
    /// Print the command list
    Help,
    /// Exit
    Quit,
}

pub const HELP: &str = "\
Commands:
  <text>     send a message (interrupts a reply in progress)
  /retry     re-send the last message
  /abort     stop the reply in progress
  /clear     clear the conversation
  /new       clear the conversation and start a new session
  /history   show the conversation
  /status    show status and session identifiers
  /help      show this list
  /quit      exit
";

/// Parse a line; `None` for blank input
///
/// Unknown slash commands are returned as `Err` with the offending word.
pub fn parse(line: &str) -> Option<Result<Command, String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    // "//text" sends "/text" literally
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(Ok(Command::Send(format!("/{rest}"))));
    }

    let Some(word) = trimmed.strip_prefix('/') else {
        return Some(Ok(Command::Send(line.trim_end_matches(['\r', '\n']).to_string())));
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "retry" | "r" => Command::Retry,
        "abort" | "stop" => Command::Abort,
        "clear" => Command::Clear,
        "new" => Command::New,
        "history" | "h" => Command::History,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => return Some(Err(word.to_string())),
    };
    Some(Ok(command))
}
