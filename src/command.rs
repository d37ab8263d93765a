//! Bot command recognition for free-text message bodies.
//!
//! A command is a `#` immediately followed by one or more word characters
//! (alphanumeric or `_`). An optional parenthesized parameter list may follow
//! the name directly, e.g. `#say(de) Guten Tag`. Leading and trailing
//! whitespace around the whole text is ignored.

/// A command recognized at the start of a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// Command name without the leading `#`.
    pub command: &'a str,
    /// Raw text between `(` and the next `)`, or empty if no list was given.
    pub params: &'a str,
    /// Everything after the command (and parameter list), trimmed.
    pub remainder: &'a str,
}

/// Split a trimmed text into the command name and whatever follows it.
///
/// Returns `None` for a lone `#`, `#` followed by punctuation, or text that
/// does not start with `#`.
fn split_command(text: &str) -> Option<(&str, &str)> {
    let body = text.trim().strip_prefix('#')?;
    let end = body
        .char_indices()
        .find(|(_, c)| !is_command_char(*c))
        .map_or(body.len(), |(idx, _)| idx);
    if end == 0 {
        return None;
    }
    Some(body.split_at(end))
}

fn is_command_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Extract the command name from a message body, if any.
pub fn extract_command(text: &str) -> Option<&str> {
    split_command(text).map(|(command, _)| command)
}

/// Extract the command name, its parenthesized parameters and the remaining text.
///
/// Returns `None` when the text does not start with a recognized command,
/// which is distinct from a command with empty `params`.
pub fn extract_command_full(text: &str) -> Option<ParsedCommand<'_>> {
    let (command, rest) = split_command(text)?;

    let (params, remainder) = match rest.strip_prefix('(') {
        Some(after_paren) => match after_paren.split_once(')') {
            Some((params, remainder)) => (params, remainder),
            // Unterminated list: everything left is parameters.
            None => (after_paren, ""),
        },
        None => ("", rest),
    };

    Some(ParsedCommand {
        command,
        params,
        remainder: remainder.trim(),
    })
}

/// Returns `true` if the text starts with the given command name.
pub fn is_command(text: &str, name: &str) -> bool {
    extract_command(text).is_some_and(|command| command.eq_ignore_ascii_case(name))
}
