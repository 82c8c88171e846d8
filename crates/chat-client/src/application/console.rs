//! Console presentation: what gets printed for each incoming message and
//! what each typed line means.

use chat_core::protocol::messages::ChatMessage;

/// Display name used when stdin ends before a name is typed.
pub const ANONYMOUS_USER: &str = "Anonymous";

/// Printed when the server ends the session.
pub const SERVER_CLOSED: &str = "Server closed the connection.";

/// What the user asked for by typing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    /// Send the line as a chat message.
    Send(String),
    /// Leave the chat.
    Exit,
    /// Nothing to do (empty line).
    Skip,
}

/// Interprets one line read from stdin.
///
/// `exit` in any letter case leaves; empty lines are ignored.  Anything else
/// is sent verbatim, surrounding whitespace included.
pub fn parse_input_line(line: &str) -> InputLine {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    if line.is_empty() {
        InputLine::Skip
    } else if line.eq_ignore_ascii_case("exit") {
        InputLine::Exit
    } else {
        InputLine::Send(line.to_string())
    }
}

/// Formats a message received from the server for printing.
pub fn render_incoming(msg: &ChatMessage) -> String {
    match msg {
        ChatMessage::Chat { text } => text.clone(),
        ChatMessage::System { text } => format!("[System] {text}"),
        other => format!("[{}] {}", other.kind(), other.text()),
    }
}

/// Local echo of a line the user sent.
pub fn render_outgoing(text: &str) -> String {
    format!("You: {text}")
}

/// Picks the display name: the trimmed input, or [`ANONYMOUS_USER`] when
/// there was no input at all.
///
/// A blank line is a (blank) name, not a request for the default.
pub fn resolve_username(input: Option<&str>) -> String {
    input.map_or_else(|| ANONYMOUS_USER.to_string(), |name| name.trim().to_string())
}
