//! Rewrites the focused field: erase what was typed, type the result.
//!
//! Whatever application holds keyboard focus receives the keystrokes.

use enigo::{Direction, Enigo, Key as EnigoKey, Keyboard, Settings};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to open keyboard output: {0}")]
    Init(String),
    #[error("failed to simulate keyboard input: {0}")]
    Keyboard(String),
}

/// Synthetic keyboard output
pub trait Keystrokes {
    /// One backspace press followed by its release
    fn tap_backspace(&mut self) -> Result<(), ReplayError>;
    fn type_text(&mut self, text: &str) -> Result<(), ReplayError>;
}

/// Opens a fresh output handle for each replay
pub type OutputFactory = Box<dyn Fn() -> Result<Box<dyn Keystrokes>, ReplayError> + Send + Sync>;

pub struct EnigoKeystrokes {
    enigo: Enigo,
}

impl EnigoKeystrokes {
    pub fn new() -> Result<Self, ReplayError> {
        let enigo = Enigo::new(&Settings::default()).map_err(|e| ReplayError::Init(e.to_string()))?;
        Ok(Self { enigo })
    }

    pub fn factory() -> OutputFactory {
        Box::new(|| Ok(Box::new(EnigoKeystrokes::new()?) as Box<dyn Keystrokes>))
    }
}

impl Keystrokes for EnigoKeystrokes {
    fn tap_backspace(&mut self) -> Result<(), ReplayError> {
        self.enigo
            .key(EnigoKey::Backspace, Direction::Press)
            .map_err(|e| ReplayError::Keyboard(e.to_string()))?;
        self.enigo
            .key(EnigoKey::Backspace, Direction::Release)
            .map_err(|e| ReplayError::Keyboard(e.to_string()))
    }

    fn type_text(&mut self, text: &str) -> Result<(), ReplayError> {
        self.enigo
            .text(text)
            .map_err(|e| ReplayError::Keyboard(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub deleted: usize,
    pub typed: usize,
}

/// Erase every character of `original` (command token included), then
/// type `result`.
pub fn replay(
    out: &mut dyn Keystrokes,
    original: &str,
    result: &str,
) -> Result<ReplayReport, ReplayError> {
    let deleted = original.chars().count();
    for _ in 0..deleted {
        out.tap_backspace()?;
    }
    if !result.is_empty() {
        out.type_text(result)?;
    }
    Ok(ReplayReport {
        deleted,
        typed: result.chars().count(),
    })
}
