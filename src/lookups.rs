//! Lookup tables for TypiDesk
//!
//! - Language code to display name for `?trans-<code>`
//! - Activation key names accepted in the settings file

use crate::config::ActivationKey;

pub const DEFAULT_LANGUAGE: &str = "English";

/// Language codes listed in the help text
pub const LANGUAGE_CODES: [&str; 12] = [
    "es", "fr", "de", "it", "pt", "ru", "ja", "ko", "zh", "ar", "hi", "bn",
];

pub fn language_name(code: &str) -> Option<&'static str> {
    let name = match code {
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "bn" => "Bengali",
        _ => return None,
    };
    Some(name)
}

/// Resolve a `?trans` modifier to the language named in the prompt.
/// Unknown codes pass through upper-cased; no modifier means English.
pub fn resolve_target_language(modifier: Option<&str>) -> String {
    match modifier {
        None => DEFAULT_LANGUAGE.to_string(),
        Some(code) => language_name(code)
            .map(str::to_string)
            .unwrap_or_else(|| code.to_uppercase()),
    }
}

pub fn parse_activation_key(name: &str) -> Option<ActivationKey> {
    match name.trim().to_lowercase().as_str() {
        "space" => Some(ActivationKey::Space),
        "enter" | "return" => Some(ActivationKey::Enter),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_code_has_a_name() {
        for code in LANGUAGE_CODES {
            assert!(language_name(code).is_some(), "missing name for {}", code);
        }
    }

    #[test]
    fn known_code_resolves_to_name() {
        assert_eq!(resolve_target_language(Some("es")), "Spanish");
        assert_eq!(resolve_target_language(Some("ja")), "Japanese");
    }

    #[test]
    fn unknown_code_passes_through_uppercased() {
        assert_eq!(resolve_target_language(Some("nl")), "NL");
        assert_eq!(resolve_target_language(Some("klingon")), "KLINGON");
    }

    #[test]
    fn missing_modifier_defaults_to_english() {
        assert_eq!(resolve_target_language(None), "English");
    }

    #[test]
    fn codes_are_case_sensitive() {
        assert_eq!(resolve_target_language(Some("ES")), "ES");
    }

    #[test]
    fn activation_key_names() {
        assert_eq!(parse_activation_key("Space"), Some(ActivationKey::Space));
        assert_eq!(parse_activation_key(" ENTER "), Some(ActivationKey::Enter));
        assert_eq!(parse_activation_key("return"), Some(ActivationKey::Enter));
        assert_eq!(parse_activation_key("tab"), None);
    }
}
