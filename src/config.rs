//! Settings, credential and hot reload for TypiDesk
//!
//! The settings file is the only thing the outside world edits at runtime.
//! The engine reads it through an `ArcSwap`, so every dispatch sees one
//! whole snapshot even while the file is being rewritten.

use arc_swap::ArcSwap;
use notify::{recommended_watcher, RecursiveMode, Watcher};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::logging::{emit, Glyph};
use crate::lookups::parse_activation_key;

pub const CREDENTIAL_VAR: &str = "GEMINI_API_KEY";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

pub type SharedSettings = Arc<ArcSwap<Settings>>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Generation models offered in the settings file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Model {
    #[default]
    #[serde(rename = "gemini-1.5-flash")]
    Gemini15Flash,
    #[serde(rename = "gemini-2.5-pro")]
    Gemini25Pro,
}

impl Model {
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Gemini15Flash => "gemini-1.5-flash",
            Model::Gemini25Pro => "gemini-2.5-pro",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key whose press hands the buffer to the command parser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActivationKey {
    #[default]
    Space,
    Enter,
}

impl fmt::Display for ActivationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationKey::Space => f.write_str("Space"),
            ActivationKey::Enter => f.write_str("Enter"),
        }
    }
}

impl<'de> Deserialize<'de> for ActivationKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        parse_activation_key(&name).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "unknown activation key '{}', expected Space or Enter",
                name
            ))
        })
    }
}

/// Runtime-editable settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub model: Model,
    pub activation_key: ActivationKey,
    pub debug: bool,
    pub endpoint: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: Model::default(),
            activation_key: ActivationKey::default(),
            debug: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl Settings {
    fn candidate_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("typidesk").join("config.toml")),
            dirs::home_dir().map(|p| p.join(".typidesk").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Load settings from the first readable candidate, writing a default
    /// file when none exists. Returns the path to watch, if any.
    pub fn load() -> (Self, Option<PathBuf>) {
        let default_path = dirs::config_dir().map(|p| p.join("typidesk").join("config.toml"));
        Self::load_candidates(&Self::candidate_paths(), default_path)
    }

    /// A file that exists but fails to load is never overwritten: defaults
    /// are used for this run and that file is still watched, so fixing it
    /// takes effect without a restart.
    fn load_candidates(
        candidates: &[PathBuf],
        default_path: Option<PathBuf>,
    ) -> (Self, Option<PathBuf>) {
        let mut broken = None;
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from(path) {
                Ok(settings) => {
                    emit(settings.debug, Glyph::Info, format!("Loaded config from: {:?}", path));
                    return (settings, Some(path.clone()));
                }
                Err(e) => {
                    emit(true, Glyph::Warning, e);
                    broken.get_or_insert_with(|| path.clone());
                }
            }
        }

        if let Some(path) = broken {
            emit(
                true,
                Glyph::Warning,
                format!("Using default config until {:?} is fixed", path),
            );
            return (Self::default(), Some(path));
        }

        if let Some(path) = default_path {
            match Self::write_default(&path) {
                Ok(()) => {
                    emit(true, Glyph::Success, format!("Created default config at: {:?}", path));
                    return (Self::default(), Some(path));
                }
                Err(e) => emit(
                    true,
                    Glyph::Warning,
                    format!("Failed to write default config: {}", e),
                ),
            }
        }

        emit(true, Glyph::Warning, "Using default config");
        (Self::default(), None)
    }

    fn write_default(path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, Self::default_config_content())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn default_config_content() -> &'static str {
        r##"# TypiDesk Configuration
# Changes are hot-reloaded - no restart needed!
# The API key is NOT stored here: export GEMINI_API_KEY instead.

# Model to use: "gemini-1.5-flash" or "gemini-2.5-pro"
model = "gemini-1.5-flash"

# Key that triggers command detection: "Space" or "Enter"
# With Space, typing "hello wrold?fix" then Space rewrites the text.
activation_key = "Space"

# Print every log line, not just successes, warnings and errors
debug = true

# Base URL of the generation API (read at startup)
endpoint = "https://generativelanguage.googleapis.com/v1beta"
"##
    }
}

/// Watch the settings file and swap in each successfully parsed revision
pub fn spawn_watcher(settings: SharedSettings, path: PathBuf) {
    std::thread::spawn(move || {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut watcher = match recommended_watcher(tx) {
            Ok(w) => w,
            Err(e) => {
                emit(true, Glyph::Warning, format!("Failed to create config watcher: {}", e));
                return;
            }
        };
        if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
            emit(true, Glyph::Warning, format!("Failed to watch config file: {}", e));
            return;
        }
        emit(
            settings.load().debug,
            Glyph::Info,
            format!("Watching config for changes: {:?}", path),
        );

        for event in rx.into_iter().flatten() {
            if !event.kind.is_modify() {
                continue;
            }
            // Editors write in several steps; let the file settle.
            std::thread::sleep(Duration::from_millis(100));
            match Settings::load_from(&path) {
                Ok(new_settings) => {
                    let debug = new_settings.debug;
                    settings.store(Arc::new(new_settings));
                    emit(debug, Glyph::Reload, "Config reloaded!");
                }
                Err(e) => emit(
                    true,
                    Glyph::Error,
                    format!("Config reload error, keeping previous: {}", e),
                ),
            }
        }
    });
}

/// API key for the generation service
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let key = key.trim();
        if key.is_empty() {
            None
        } else {
            Some(Self(key.to_string()))
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var(CREDENTIAL_VAR).ok().and_then(Self::new)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
