//! Keystroke accumulation
//!
//! Key presses are reduced to `KeyInput` as soon as they leave the OS hook.
//! `TextBuffer` holds what was typed since the last finished dispatch.

use rdev::{Event, EventType, Key as RdevKey};

use crate::config::ActivationKey;

/// A key press as the engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInput {
    Space,
    Enter,
    Backspace,
    Char(char),
    /// Anything without a printable character (arrows, modifiers, F-keys)
    Other,
}

impl KeyInput {
    pub fn from_rdev(event: &Event) -> Option<Self> {
        let EventType::KeyPress(key) = &event.event_type else {
            return None;
        };
        let input = match key {
            RdevKey::Space => KeyInput::Space,
            RdevKey::Return | RdevKey::KpReturn => KeyInput::Enter,
            RdevKey::Backspace => KeyInput::Backspace,
            _ => event
                .name
                .as_deref()
                .and_then(printable_char)
                .map(KeyInput::Char)
                .unwrap_or(KeyInput::Other),
        };
        Some(input)
    }

    pub fn is_activation(&self, key: ActivationKey) -> bool {
        matches!(
            (self, key),
            (KeyInput::Space, ActivationKey::Space) | (KeyInput::Enter, ActivationKey::Enter)
        )
    }
}

// rdev reports control keys with names like "\r" or "\u{1b}"
fn printable_char(name: &str) -> Option<char> {
    let mut chars = name.chars();
    let ch = chars.next()?;
    if chars.next().is_some() || ch.is_control() {
        return None;
    }
    Some(ch)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one key press. Keys without a printable effect leave the
    /// buffer alone.
    pub fn apply(&mut self, key: &KeyInput) {
        match key {
            KeyInput::Space => self.text.push(' '),
            KeyInput::Backspace => {
                self.text.pop();
            }
            KeyInput::Char(ch) => self.text.push(*ch),
            KeyInput::Enter | KeyInput::Other => {}
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}
