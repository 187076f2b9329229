//! Console logging for TypiDesk
//!
//! Every line reads `[HH:MM:SS] <glyph> message`. Successes, detected
//! commands, warnings and errors always print; everything else only
//! when `debug` is on in the settings.

use std::fmt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    Success,
    Command,
    Warning,
    Error,
    Info,
    Farewell,
    Reload,
}

impl Glyph {
    pub fn symbol(&self) -> &'static str {
        match self {
            Glyph::Success => "✅",
            Glyph::Command => "🤖",
            Glyph::Warning => "⚠️",
            Glyph::Error => "❌",
            Glyph::Info => "ℹ️",
            Glyph::Farewell => "👋",
            Glyph::Reload => "🔄",
        }
    }

    /// Lines that print regardless of the debug flag
    pub fn always_shown(&self) -> bool {
        matches!(self, Glyph::Success | Glyph::Command | Glyph::Warning | Glyph::Error)
    }
}

impl fmt::Display for Glyph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

pub fn init() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("[%H:%M:%S]".to_string()))
        .with_level(false)
        .with_target(false)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))
}

/// Emit one line if the glyph is always shown or debug output is enabled
pub fn emit(debug_enabled: bool, glyph: Glyph, message: impl fmt::Display) {
    if !(debug_enabled || glyph.always_shown()) {
        return;
    }
    match glyph {
        Glyph::Error => error!("{} {}", glyph, message),
        Glyph::Warning => warn!("{} {}", glyph, message),
        Glyph::Success | Glyph::Command | Glyph::Farewell => info!("{} {}", glyph, message),
        Glyph::Info | Glyph::Reload => debug!("{} {}", glyph, message),
    }
}
