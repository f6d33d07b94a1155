// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plain-text bot commands recognized in controller rooms.
//!
//! Matching is case-insensitive and longest-prefix-first, so `space-id`
//! never shadows `set-admin-token`. Anything unrecognized is ignored
//! without error.

/// Scripted help/greeting message sent on invite-accept and on `help`.
pub const HELP_TEXT: &str = "Hi, I recreate exported rooms on this server.\n\
    Upload a room export archive (.zip) here to start an import.\n\
    Commands:\n\
    - help: show this message\n\
    - space-id <id>: set the space imported rooms are linked under\n\
    - set-admin-token <token>: rotate the admin credential used for room deletion";

/// A recognized bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    SpaceId(String),
    SetAdminToken(String),
}

impl Command {
    /// Parse a message body. Returns `None` for anything unrecognized.
    pub fn parse(body: &str) -> Option<Command> {
        let trimmed = body.trim();

        if let Some(arg) = command_arg(trimmed, "set-admin-token") {
            return Some(Command::SetAdminToken(arg.to_string()));
        }
        if let Some(arg) = command_arg(trimmed, "space-id") {
            return Some(Command::SpaceId(arg.to_string()));
        }
        if trimmed.eq_ignore_ascii_case("help") {
            return Some(Command::Help);
        }
        None
    }
}

/// The argument of `<keyword> <arg>`, if `body` starts with the keyword
/// (case-insensitive) followed by whitespace and a non-empty argument.
fn command_arg<'a>(body: &'a str, keyword: &str) -> Option<&'a str> {
    // `get` keeps a multibyte character at the boundary from panicking.
    let head = body.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &body[keyword.len()..];
    if rest.is_empty() {
        return None;
    }
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let arg = rest.trim();
    if arg.is_empty() { None } else { Some(arg) }
}

/// Whether a confirmation reply counts as affirmative.
pub fn is_affirmative(body: &str) -> bool {
    body.to_lowercase().contains("yes")
}
