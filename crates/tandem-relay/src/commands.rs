//! In-band bridge commands: `.online`, `.topic`, `.reset`, `.msg`, `.help`.
//!
//! A network-A message whose first character is a configured prefix is parsed
//! here instead of being relayed. Replies always go to the invoking user only.

/// Closed set of verbs the bridge understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List who is in the mapped network-B channel, optionally filtered.
    Online { query: Option<String> },
    /// Show the mapped network-B channel's topic.
    Topic,
    /// Tear down and re-establish the caller's shadow connection.
    Reset,
    /// Private message to a network-B nick through the caller's shadow.
    Msg { target: String, text: String },
    Help,
}

/// Result of [`parse_command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    /// No prefix: relay as a normal message.
    NotCommand,
    /// Prefixed, but the verb is not one we know.
    Unknown(String),
    /// Known verb with missing arguments; carries the verb.
    Malformed(&'static str),
    Command(Command),
}

/// Parse `verb [arg] [rest...]` after a prefix character.
pub fn parse_command(text: &str, prefixes: &[char]) -> ParsedCommand {
    let Some(first) = text.chars().next() else {
        return ParsedCommand::NotCommand;
    };
    if !prefixes.contains(&first) {
        return ParsedCommand::NotCommand;
    }

    let body = text[first.len_utf8()..].trim();
    let (verb, rest) = match body.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (body, ""),
    };
    if verb.is_empty() {
        return ParsedCommand::Unknown(String::new());
    }

    match verb.to_ascii_lowercase().as_str() {
        "online" | "who" => ParsedCommand::Command(Command::Online {
            query: rest.split_whitespace().next().map(str::to_string),
        }),
        "topic" => ParsedCommand::Command(Command::Topic),
        "reset" => ParsedCommand::Command(Command::Reset),
        "help" => ParsedCommand::Command(Command::Help),
        "msg" => {
            let Some((target, text)) = rest.split_once(char::is_whitespace) else {
                return ParsedCommand::Malformed("msg");
            };
            let text = text.trim();
            if text.is_empty() {
                return ParsedCommand::Malformed("msg");
            }
            ParsedCommand::Command(Command::Msg {
                target: target.to_string(),
                text: text.to_string(),
            })
        }
        other => ParsedCommand::Unknown(other.to_string()),
    }
}

/// Reply for `help`, using the first configured prefix.
pub fn help_text(prefix: char) -> String {
    format!(
        "Bridge commands:\n\
         {p}online [query] - who is in the linked channel\n\
         {p}topic - show the linked channel's topic\n\
         {p}reset - reconnect your shadow connection\n\
         {p}msg <nick> <text> - private message someone on the other network\n\
         {p}help - show this help",
        p = prefix
    )
}
