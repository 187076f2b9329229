//! Inline command detection
//!
//! A buffer triggers a transform when, after trimming, it ends with
//! `?<command>` or `?<command>-<modifier>` and has some text before it:
//!
//! ```text
//! hello wrold, how r u?fix
//! where is the station?trans-es
//! ```
//!
//! Neither the command nor the modifier may contain `?`, so the token
//! always starts at the last `?` in the buffer.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Fix,
    Polite,
    Casual,
    Summ,
    Expand,
    Short,
    Trans,
    Explain,
    Code,
}

impl Command {
    pub const ALL: [Command; 9] = [
        Command::Fix,
        Command::Polite,
        Command::Casual,
        Command::Summ,
        Command::Expand,
        Command::Short,
        Command::Trans,
        Command::Explain,
        Command::Code,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Fix => "fix",
            Command::Polite => "polite",
            Command::Casual => "casual",
            Command::Summ => "summ",
            Command::Expand => "expand",
            Command::Short => "short",
            Command::Trans => "trans",
            Command::Explain => "explain",
            Command::Code => "code",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub main_text: String,
    pub command: Command,
    pub modifier: Option<String>,
}

impl fmt::Display for ParsedCommand {
    /// Renders the token the user typed, e.g. `?trans-es`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.command)?;
        if let Some(modifier) = &self.modifier {
            write!(f, "-{}", modifier)?;
        }
        Ok(())
    }
}

pub fn parse(text: &str) -> Option<ParsedCommand> {
    let trimmed = text.trim();
    let token_start = trimmed.rfind('?')?;
    let main_text = &trimmed[..token_start];
    if main_text.is_empty() {
        return None;
    }

    let token = &trimmed[token_start + 1..];
    let (name, modifier) = match token.split_once('-') {
        Some((name, modifier)) => (name, Some(modifier)),
        None => (token, None),
    };

    let command = Command::from_name(name)?;
    if let Some(modifier) = modifier {
        if !is_modifier(modifier) {
            return None;
        }
    }

    Some(ParsedCommand {
        main_text: main_text.trim().to_string(),
        command,
        modifier: modifier.map(str::to_string),
    })
}

// One or more word characters: letters, digits, underscore
fn is_modifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}
