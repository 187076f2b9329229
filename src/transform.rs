//! Prompt building and dispatch to the generation service

use thiserror::Error;

use crate::config::Model;
use crate::gemini::GenerateError;
use crate::lookups::resolve_target_language;
use crate::parser::{Command, ParsedCommand};

/// Separates the instruction from the user's text in the prompt
pub const TEXT_DELIMITER: &str = "\n\nText:\n";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("No response from AI")]
    EmptyResponse,
    #[error("{0}")]
    Remote(#[from] GenerateError),
}

/// Anything that turns a prompt into generated text
pub trait Generator: Send + Sync {
    fn generate(&self, model: Model, prompt: &str) -> Result<String, GenerateError>;
}

/// Instruction for a command. `?trans` takes the target language name.
pub fn instruction(command: Command, target_language: &str) -> String {
    let template = match command {
        Command::Fix => {
            "Fix grammar, spelling, and punctuation errors. \
             Return ONLY the corrected text, nothing else."
        }
        Command::Polite => {
            "Rewrite this text to be more polite, professional, and respectful. \
             Maintain the core message but improve tone. Return ONLY the rewritten text."
        }
        Command::Casual => {
            "Rewrite this text in a casual, friendly, conversational tone. \
             Make it sound natural and relaxed. Return ONLY the rewritten text."
        }
        Command::Summ => {
            "Summarize this text concisely. \
             Capture the key points in 2-3 sentences. Return ONLY the summary."
        }
        Command::Expand => {
            "Expand and elaborate on this text. \
             Add more detail, examples, and explanation while maintaining the original meaning. \
             Return ONLY the expanded text."
        }
        Command::Short => {
            "Make this text more concise. \
             Remove unnecessary words while keeping the core meaning. \
             Return ONLY the shortened text."
        }
        Command::Trans => {
            return format!(
                "Translate this text to {}. Return ONLY the translation, nothing else.",
                target_language
            );
        }
        Command::Explain => {
            "Explain this concept in simple terms that anyone can understand. \
             Return ONLY the explanation."
        }
        Command::Code => {
            "Convert this description into working code. \
             Be specific and practical. Return ONLY the code."
        }
    };
    template.to_string()
}

/// Full prompt sent for a parsed command
pub fn compose_prompt(parsed: &ParsedCommand) -> String {
    let target_language = match parsed.command {
        Command::Trans => resolve_target_language(parsed.modifier.as_deref()),
        _ => String::new(),
    };
    format!(
        "{}{}{}",
        instruction(parsed.command, &target_language),
        TEXT_DELIMITER,
        parsed.main_text
    )
}

pub struct Dispatcher {
    generator: Box<dyn Generator>,
}

impl Dispatcher {
    pub fn new(generator: Box<dyn Generator>) -> Self {
        Self { generator }
    }

    /// One blocking round trip. Every failure comes back as a
    /// `TransformError`.
    pub fn transform(
        &self,
        model: Model,
        parsed: &ParsedCommand,
    ) -> Result<String, TransformError> {
        let prompt = compose_prompt(parsed);
        let response = self.generator.generate(model, &prompt)?;
        let result = response.trim();
        if result.is_empty() {
            return Err(TransformError::EmptyResponse);
        }
        Ok(result.to_string())
    }
}
