//! Start / pause / stop of keystroke capture
//!
//! rdev's hook cannot be torn down once installed, so it is started once
//! and forwards presses to whichever delivery target is attached. Behind
//! it sits a single capture worker, created on the first start and kept
//! until `stop`, so presses reach the engine in arrival order no matter
//! how often capture is paused and resumed. Pausing only detaches the
//! target; a dispatch in flight is never interrupted.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

use crate::buffer::KeyInput;
use crate::engine::Engine;
use crate::logging::{emit, Glyph};

// rdev::listen fails fast when the OS refuses the hook
const HOOK_STARTUP_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("keyboard hook failed: {0}")]
    Hook(String),
}

/// Receives key presses as they arrive from the OS
pub type Deliver = Box<dyn Fn(KeyInput) + Send + Sync>;

/// Where key presses come from
pub trait KeySource: Send + Sync {
    /// Route every future press to `deliver`, replacing any previous target.
    /// On error nothing is attached.
    fn attach(&self, deliver: Deliver) -> Result<(), CaptureError>;
    fn detach(&self);

    /// False once the source has stopped producing presses for good
    fn is_alive(&self) -> bool {
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HookState {
    Idle,
    Running,
    Failed(String),
}

/// Global OS keyboard hook via rdev
pub struct RdevSource {
    target: Arc<Mutex<Option<Deliver>>>,
    state: Arc<Mutex<HookState>>,
}

impl Default for RdevSource {
    fn default() -> Self {
        Self {
            target: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(HookState::Idle)),
        }
    }
}

impl RdevSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the hook thread unless one is already running. A hook that
    /// failed earlier is tried again.
    fn install_hook(&self) -> Result<(), CaptureError> {
        {
            let mut state = lock(&self.state);
            if *state == HookState::Running {
                return Ok(());
            }
            *state = HookState::Running;
        }

        let (failed_tx, failed_rx) = mpsc::channel::<String>();
        let target = self.target.clone();
        let state = self.state.clone();
        let spawned = std::thread::Builder::new()
            .name("typidesk-hook".into())
            .spawn(move || {
                let hook_target = target.clone();
                let result = rdev::listen(move |event| {
                    if let Some(key) = KeyInput::from_rdev(&event) {
                        if let Some(deliver) = lock(&hook_target).as_ref() {
                            deliver(key);
                        }
                    }
                });
                // listen only returns when the hook is gone
                let reason = match result {
                    Err(e) => format!("{:?}", e),
                    Ok(()) => "listener returned".to_string(),
                };
                emit(true, Glyph::Error, format!("Keyboard hook failed: {}", reason));
                *lock(&state) = HookState::Failed(reason.clone());
                lock(&target).take();
                let _ = failed_tx.send(reason);
            });

        if let Err(e) = spawned {
            *lock(&self.state) = HookState::Idle;
            return Err(CaptureError::Spawn(e));
        }

        match failed_rx.recv_timeout(HOOK_STARTUP_WAIT) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Ok(reason) => Err(CaptureError::Hook(reason)),
            Err(RecvTimeoutError::Disconnected) => {
                let reason = "hook thread exited".to_string();
                *lock(&self.state) = HookState::Failed(reason.clone());
                Err(CaptureError::Hook(reason))
            }
        }
    }
}

impl KeySource for RdevSource {
    fn attach(&self, deliver: Deliver) -> Result<(), CaptureError> {
        self.install_hook()?;
        *lock(&self.target) = Some(deliver);
        Ok(())
    }

    fn detach(&self) {
        lock(&self.target).take();
    }

    fn is_alive(&self) -> bool {
        *lock(&self.state) == HookState::Running
    }
}

/// The one worker feeding the engine, and the sending half of its queue
struct Capture {
    tx: Sender<KeyInput>,
    // Dropped, not joined: the worker may still be finishing a dispatch
    _worker: JoinHandle<()>,
}

fn spawn_capture(engine: Arc<Engine>) -> Result<Capture, CaptureError> {
    let (tx, rx) = mpsc::channel();
    let worker = std::thread::Builder::new()
        .name("typidesk-capture".into())
        .spawn(move || run_capture(&engine, rx))?;
    Ok(Capture {
        tx,
        _worker: worker,
    })
}

fn run_capture(engine: &Engine, rx: Receiver<KeyInput>) {
    for key in rx {
        if catch_unwind(AssertUnwindSafe(|| engine.handle_key(&key))).is_err() {
            engine.log(Glyph::Error, "Error on key press: handler panicked");
        }
    }
    engine.log(Glyph::Info, "Capture worker exited");
}

#[derive(Default)]
struct State {
    capture: Option<Capture>,
    attached: bool,
}

pub struct Controller {
    engine: Arc<Engine>,
    source: Arc<dyn KeySource>,
    state: Mutex<State>,
}

impl Controller {
    pub fn new(engine: Arc<Engine>, source: Arc<dyn KeySource>) -> Self {
        Self {
            engine,
            source,
            state: Mutex::new(State::default()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn running(&self, state: &State) -> bool {
        state.attached && self.source.is_alive()
    }

    pub fn is_running(&self) -> bool {
        let state = self.state();
        self.running(&state)
    }

    /// Start capturing. Returns false if capture was already running.
    pub fn start(&self) -> Result<bool, CaptureError> {
        let mut state = self.state();
        if self.running(&state) {
            return Ok(false);
        }
        self.attach(&mut state)?;
        self.engine.log(Glyph::Success, "Starting keyboard listener...");
        Ok(true)
    }

    /// Stop delivering presses. Returns false if already paused.
    pub fn pause(&self) -> bool {
        let mut state = self.state();
        if !state.attached {
            return false;
        }
        self.detach(&mut state);
        self.engine.log(Glyph::Warning, "Pausing keyboard listener...");
        true
    }

    /// Pause when running, start when paused, under one lock.
    /// Returns whether capture is running afterwards.
    pub fn toggle(&self) -> Result<bool, CaptureError> {
        let mut state = self.state();
        if self.running(&state) {
            self.detach(&mut state);
            self.engine.log(Glyph::Warning, "Pausing keyboard listener...");
            return Ok(false);
        }
        self.attach(&mut state)?;
        self.engine.log(Glyph::Success, "Resuming keyboard listener...");
        Ok(true)
    }

    /// Shutdown. Safe to call any number of times. The worker finishes
    /// whatever is already queued and exits.
    pub fn stop(&self) {
        self.engine.log(Glyph::Farewell, "Stopping TypiDesk engine...");
        let mut state = self.state();
        self.detach(&mut state);
        state.capture.take();
    }

    fn attach(&self, state: &mut State) -> Result<(), CaptureError> {
        let capture = match state.capture.take() {
            Some(capture) => capture,
            None => spawn_capture(self.engine.clone())?,
        };
        let tx = capture.tx.clone();
        state.capture = Some(capture);

        // Presses that arrive mid-dispatch (including our own replayed
        // keystrokes) are dropped here, before they can queue up.
        let engine = self.engine.clone();
        self.source.attach(Box::new(move |key| {
            if !engine.gate().is_busy() {
                let _ = tx.send(key);
            }
        }))?;
        state.attached = true;
        Ok(())
    }

    fn detach(&self, state: &mut State) {
        self.source.detach();
        state.attached = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Model, Settings};
    use crate::gemini::GenerateError;
    use crate::replay::tests::RecordingKeystrokes;
    use crate::transform::tests::ScriptedGenerator;
    use crate::transform::Generator;
    use arc_swap::ArcSwap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread::ThreadId;
    use std::time::Instant;

    /// In-memory source that tests push presses into
    struct ManualSource {
        target: Mutex<Option<Deliver>>,
        attaches: Mutex<usize>,
        refuse: Mutex<Option<String>>,
        alive: AtomicBool,
    }

    impl Default for ManualSource {
        fn default() -> Self {
            Self {
                target: Mutex::new(None),
                attaches: Mutex::new(0),
                refuse: Mutex::new(None),
                alive: AtomicBool::new(true),
            }
        }
    }

    impl ManualSource {
        fn refusing(reason: &str) -> Self {
            Self {
                refuse: Mutex::new(Some(reason.to_string())),
                ..Self::default()
            }
        }

        fn press(&self, key: KeyInput) {
            if let Some(deliver) = self.target.lock().unwrap().as_ref() {
                deliver(key);
            }
        }

        fn type_text(&self, text: &str) {
            for ch in text.chars() {
                self.press(if ch == ' ' { KeyInput::Space } else { KeyInput::Char(ch) });
            }
        }

        fn attached(&self) -> bool {
            self.target.lock().unwrap().is_some()
        }

        fn attaches(&self) -> usize {
            *self.attaches.lock().unwrap()
        }

        /// The OS hook went away after a successful attach
        fn die(&self) {
            self.alive.store(false, Ordering::SeqCst);
            self.target.lock().unwrap().take();
        }
    }

    impl KeySource for ManualSource {
        fn attach(&self, deliver: Deliver) -> Result<(), CaptureError> {
            if let Some(reason) = self.refuse.lock().unwrap().clone() {
                return Err(CaptureError::Hook(reason));
            }
            self.alive.store(true, Ordering::SeqCst);
            *self.target.lock().unwrap() = Some(deliver);
            *self.attaches.lock().unwrap() += 1;
            Ok(())
        }

        fn detach(&self) {
            self.target.lock().unwrap().take();
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    /// Panics on every call, after counting it
    #[derive(Clone, Default)]
    struct PanickingGenerator {
        calls: Arc<AtomicUsize>,
    }

    impl Generator for PanickingGenerator {
        fn generate(&self, _model: Model, _prompt: &str) -> Result<String, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("generator blew up");
        }
    }

    /// Answers every prompt and remembers which thread asked
    #[derive(Clone, Default)]
    struct ThreadRecordingGenerator {
        threads: Arc<Mutex<Vec<ThreadId>>>,
    }

    impl Generator for ThreadRecordingGenerator {
        fn generate(&self, _model: Model, _prompt: &str) -> Result<String, GenerateError> {
            self.threads.lock().unwrap().push(std::thread::current().id());
            Ok("Done.".into())
        }
    }

    fn engine_with(generator: Box<dyn Generator>, output: &RecordingKeystrokes) -> Arc<Engine> {
        let settings = Arc::new(ArcSwap::from_pointee(Settings {
            debug: false,
            ..Settings::default()
        }));
        Arc::new(Engine::new(settings, generator, output.factory()))
    }

    fn setup(
        responses: Vec<Result<String, GenerateError>>,
    ) -> (Controller, Arc<ManualSource>, RecordingKeystrokes) {
        let output = RecordingKeystrokes::default();
        let engine = engine_with(Box::new(ScriptedGenerator::with(responses)), &output);
        let source = Arc::new(ManualSource::default());
        let controller = Controller::new(engine, source.clone());
        (controller, source, output)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn start_twice_keeps_one_listener() {
        let (controller, source, _) = setup(vec![]);
        assert!(controller.start().unwrap());
        assert!(!controller.start().unwrap());
        assert!(controller.is_running());
        assert_eq!(source.attaches(), 1);
    }

    #[test]
    fn pause_when_paused_is_noop() {
        let (controller, source, _) = setup(vec![]);
        assert!(!controller.pause());
        controller.start().unwrap();
        assert!(controller.pause());
        assert!(!controller.pause());
        assert!(!controller.is_running());
        assert!(!source.attached());
    }

    #[test]
    fn toggle_alternates() {
        let (controller, source, _) = setup(vec![]);
        assert!(controller.toggle().unwrap());
        assert!(source.attached());
        assert!(!controller.toggle().unwrap());
        assert!(!source.attached());
        assert!(controller.toggle().unwrap());
        assert_eq!(source.attaches(), 2);
    }

    #[test]
    fn stop_is_idempotent() {
        let (controller, source, _) = setup(vec![]);
        controller.start().unwrap();
        controller.stop();
        controller.stop();
        assert!(!controller.is_running());
        assert!(!source.attached());
    }

    #[test]
    fn refused_hook_fails_start_and_leaves_capture_stopped() {
        let output = RecordingKeystrokes::default();
        let engine = engine_with(Box::new(ScriptedGenerator::with(vec![])), &output);
        let source = Arc::new(ManualSource::refusing("no accessibility permission"));
        let controller = Controller::new(engine, source.clone());

        match controller.start() {
            Err(CaptureError::Hook(reason)) => assert_eq!(reason, "no accessibility permission"),
            other => panic!("expected hook error, got {:?}", other),
        }
        assert!(!controller.is_running());
        assert!(!source.attached());
        assert!(controller.toggle().is_err());
        assert!(!controller.is_running());
    }

    #[test]
    fn dead_hook_is_not_running_and_start_retries() {
        let (controller, source, _) = setup(vec![]);
        controller.start().unwrap();
        source.die();
        assert!(!controller.is_running());

        assert!(controller.start().unwrap());
        assert!(controller.is_running());
        assert_eq!(source.attaches(), 2);
    }

    #[test]
    fn presses_reach_engine_while_running() {
        let (controller, source, output) = setup(vec![Ok("Fixed.".into())]);
        controller.start().unwrap();
        source.type_text("fxied?fix ");

        let engine = controller.engine().clone();
        assert!(wait_for(|| engine.stats().transformations() == 1));
        assert_eq!(output.strokes().len(), "fxied?fix ".len() + 1);
        assert_eq!(engine.buffer_snapshot(), "");
    }

    #[test]
    fn presses_are_ignored_while_paused() {
        let (controller, source, _) = setup(vec![]);
        controller.start().unwrap();
        source.type_text("ab");
        let engine = controller.engine().clone();
        assert!(wait_for(|| engine.buffer_snapshot() == "ab"));

        controller.pause();
        source.type_text("cd");
        controller.start().unwrap();
        source.type_text("e");
        assert!(wait_for(|| engine.buffer_snapshot() == "abe"));
    }

    #[test]
    fn quick_pause_and_resume_keeps_press_order() {
        let (controller, source, _) = setup(vec![]);
        let engine = controller.engine().clone();
        for round in ["ab", "cd", "ef", "gh"] {
            controller.start().unwrap();
            source.type_text(round);
            controller.pause();
        }
        assert!(wait_for(|| engine.buffer_snapshot() == "abcdefgh"));
    }

    #[test]
    fn resume_reuses_the_capture_worker() {
        let output = RecordingKeystrokes::default();
        let generator = ThreadRecordingGenerator::default();
        let engine = engine_with(Box::new(generator.clone()), &output);
        let source = Arc::new(ManualSource::default());
        let controller = Controller::new(engine.clone(), source.clone());

        controller.start().unwrap();
        source.type_text("one?fix ");
        assert!(wait_for(|| engine.stats().transformations() == 1));

        assert!(!controller.toggle().unwrap());
        assert!(controller.toggle().unwrap());
        source.type_text("two?fix ");
        assert!(wait_for(|| engine.stats().transformations() == 2));

        let threads = generator.threads.lock().unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0], threads[1]);
    }

    #[test]
    fn panicking_handler_does_not_stop_listener() {
        let output = RecordingKeystrokes::default();
        let generator = PanickingGenerator::default();
        let engine = engine_with(Box::new(generator.clone()), &output);
        let source = Arc::new(ManualSource::default());
        let controller = Controller::new(engine.clone(), source.clone());

        controller.start().unwrap();
        source.type_text("a?fix ");
        assert!(wait_for(|| {
            generator.calls.load(Ordering::SeqCst) == 1 && !engine.gate().is_busy()
        }));

        // Same worker, still listening, buffer intact
        source.type_text("z");
        assert!(wait_for(|| engine.buffer_snapshot() == "a?fix z"));
        assert!(controller.is_running());
        assert!(output.strokes().is_empty());
    }

    #[test]
    fn presses_are_dropped_at_arrival_while_busy() {
        let (controller, source, _) = setup(vec![]);
        controller.start().unwrap();
        let engine = controller.engine().clone();

        let guard = engine.gate().try_acquire().unwrap();
        source.type_text("lost");
        drop(guard);
        source.type_text("kept");
        assert!(wait_for(|| engine.buffer_snapshot() == "kept"));
    }
}
