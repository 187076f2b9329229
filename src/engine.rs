//! The TypiDesk engine
//!
//! Every key press runs through `Engine::handle_key` on the capture
//! thread: update the buffer, and when the activation key arrives, parse
//! the buffer and run one dispatch cycle (remote call, then replay).
//!
//! Failure policy:
//! - no command at the end of the buffer: nothing happens
//! - remote call fails: logged, buffer kept for the next attempt
//! - replay fails: logged, buffer cleared (the screen no longer matches it)

use chrono::{DateTime, Duration as ChronoDuration, Local};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::buffer::{KeyInput, TextBuffer};
use crate::config::{Settings, SharedSettings};
use crate::logging::{emit, Glyph};
use crate::parser::parse;
use crate::replay::{replay, OutputFactory, ReplayError};
use crate::transform::{Dispatcher, Generator};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("replay failed: {0}")]
    Replay(#[from] ReplayError),
}

/// Single-slot admission gate: at most one dispatch in flight
#[derive(Debug, Default)]
pub struct BusyGate {
    busy: AtomicBool,
}

impl BusyGate {
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard { gate: self })
    }
}

/// Clears the gate when dropped
pub struct BusyGuard<'a> {
    gate: &'a BusyGate,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct Stats {
    transformations: AtomicU64,
    started_at: DateTime<Local>,
}

impl Stats {
    fn new() -> Self {
        Self {
            transformations: AtomicU64::new(0),
            started_at: Local::now(),
        }
    }

    pub fn transformations(&self) -> u64 {
        self.transformations.load(Ordering::SeqCst)
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn uptime(&self) -> ChronoDuration {
        Local::now() - self.started_at
    }

    fn record_transformation(&self) -> u64 {
        self.transformations.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Result of one activation, mostly for callers that want to know
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// Key was not the activation key, or arrived while busy
    Idle,
    /// Activation key, but no command at the end of the buffer
    NoCommand,
    Transformed,
    Failed,
}

pub struct Engine {
    settings: SharedSettings,
    dispatcher: Dispatcher,
    output: OutputFactory,
    buffer: Mutex<TextBuffer>,
    gate: BusyGate,
    stats: Stats,
}

impl Engine {
    pub fn new(
        settings: SharedSettings,
        generator: Box<dyn Generator>,
        output: OutputFactory,
    ) -> Self {
        Self {
            settings,
            dispatcher: Dispatcher::new(generator),
            output,
            buffer: Mutex::new(TextBuffer::new()),
            gate: BusyGate::default(),
            stats: Stats::new(),
        }
    }

    pub fn gate(&self) -> &BusyGate {
        &self.gate
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Current settings snapshot
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn debug_enabled(&self) -> bool {
        self.settings.load().debug
    }

    pub fn log(&self, glyph: Glyph, message: impl std::fmt::Display) {
        emit(self.debug_enabled(), glyph, message);
    }

    // A panic mid-event must not wedge later events
    fn buffer(&self) -> MutexGuard<'_, TextBuffer> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn buffer_snapshot(&self) -> String {
        self.buffer().as_str().to_string()
    }

    /// Handle one key press. Errors are logged here and never reach the
    /// listener.
    pub fn handle_key(&self, key: &KeyInput) -> Cycle {
        match self.try_handle_key(key) {
            Ok(cycle) => cycle,
            Err(e) => {
                self.log(Glyph::Error, format!("Error on key press: {}", e));
                Cycle::Failed
            }
        }
    }

    fn try_handle_key(&self, key: &KeyInput) -> Result<Cycle, EngineError> {
        if self.gate.is_busy() {
            return Ok(Cycle::Idle);
        }

        self.buffer().apply(key);

        let activation = self.settings.load().activation_key;
        if !key.is_activation(activation) {
            return Ok(Cycle::Idle);
        }
        self.process_buffer()
    }

    fn process_buffer(&self) -> Result<Cycle, EngineError> {
        let original = {
            let buffer = self.buffer();
            if buffer.is_empty() {
                return Ok(Cycle::NoCommand);
            }
            buffer.as_str().to_string()
        };
        let Some(parsed) = parse(&original) else {
            return Ok(Cycle::NoCommand);
        };
        let Some(_guard) = self.gate.try_acquire() else {
            return Ok(Cycle::Idle);
        };

        // One snapshot for the whole cycle, even if the file reloads meanwhile
        let settings = self.settings.load_full();
        emit(settings.debug, Glyph::Command, format!("Detected command: {}", parsed));

        let result = match self.dispatcher.transform(settings.model, &parsed) {
            Ok(result) => result,
            Err(e) => {
                emit(settings.debug, Glyph::Error, e);
                return Ok(Cycle::Failed);
            }
        };

        emit(
            settings.debug,
            Glyph::Info,
            format!("Typing result: {}...", result.chars().take(50).collect::<String>()),
        );

        let replayed =
            (self.output)().and_then(|mut out| replay(out.as_mut(), &original, &result));
        self.buffer().clear();
        let report = replayed?;
        emit(
            settings.debug,
            Glyph::Info,
            format!("Deleted {} characters, typed {}", report.deleted, report.typed),
        );

        let total = self.stats.record_transformation();
        emit(settings.debug, Glyph::Success, format!("✨ Transformed! (Total: {})", total));
        Ok(Cycle::Transformed)
    }
}
