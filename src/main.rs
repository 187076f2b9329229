mod buffer;
mod config;
mod control;
mod engine;
mod gemini;
mod logging;
mod lookups;
mod parser;
mod replay;
mod transform;

use anyhow::Result;
use arc_swap::ArcSwap;
use std::io::{self, BufRead};
use std::sync::Arc;

use config::{spawn_watcher, Credential, Settings, CREDENTIAL_VAR};
use control::{Controller, RdevSource};
use engine::Engine;
use gemini::GeminiClient;
use logging::{emit, Glyph};
use lookups::{language_name, LANGUAGE_CODES};
use parser::Command;
use replay::EnigoKeystrokes;

fn print_help(settings: &Settings) {
    println!();
    println!("Type your text, then a command, then {}:", settings.activation_key);
    println!("  hello wrold?fix            -> Hello world");
    println!();
    println!("Commands:");
    for command in Command::ALL {
        let about = match command {
            Command::Fix => "fix grammar, spelling and punctuation",
            Command::Polite => "more polite and professional",
            Command::Casual => "casual, friendly tone",
            Command::Summ => "summarize in 2-3 sentences",
            Command::Expand => "add detail and examples",
            Command::Short => "make it more concise",
            Command::Trans => "translate (?trans-es, ?trans-ja, ...; default English)",
            Command::Explain => "explain in simple terms",
            Command::Code => "turn a description into code",
        };
        println!("  ?{:<9} {}", command.name(), about);
    }
    println!();
    let languages: Vec<String> = LANGUAGE_CODES
        .iter()
        .filter_map(|code| language_name(code).map(|name| format!("{}={}", code, name)))
        .collect();
    println!("Languages: {}", languages.join(", "));
    println!();
    println!("Console: pause | resume | toggle | status | help | quit");
    println!();
}

fn print_status(control: &Controller) {
    let engine = control.engine();
    let settings = engine.settings();
    let stats = engine.stats();
    println!(
        "[TypiDesk] {} | model: {} | activation: {} | transformations: {} | up since {}",
        if control.is_running() { "running" } else { "paused" },
        settings.model,
        settings.activation_key,
        stats.transformations(),
        stats.started_at().format("%H:%M:%S"),
    );
}

/// Console stand-in for the tray menu. Returns on `quit` or end of input.
fn run_console(control: &Controller) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match line.trim().to_lowercase().as_str() {
            "" => {}
            "pause" | "p" => {
                if !control.pause() {
                    println!("[TypiDesk] Already paused");
                }
            }
            "resume" | "start" | "r" => match control.start() {
                Ok(true) => {}
                Ok(false) => println!("[TypiDesk] Already running"),
                Err(e) => emit(true, Glyph::Error, e),
            },
            "toggle" | "t" => {
                if let Err(e) = control.toggle() {
                    emit(true, Glyph::Error, e);
                }
            }
            "status" | "s" => print_status(control),
            "help" | "h" | "?" => print_help(&control.engine().settings()),
            "quit" | "exit" | "q" => break,
            other => println!("[TypiDesk] Unknown console command '{}' (try help)", other),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    logging::init()?;

    let Some(credential) = Credential::from_env() else {
        eprintln!();
        eprintln!("⚠️  ERROR: Please set the {} environment variable!", CREDENTIAL_VAR);
        eprintln!("Get a free API key at: https://aistudio.google.com/app/apikey");
        eprintln!();
        std::process::exit(1);
    };

    let (settings, settings_path) = Settings::load();

    println!("=================================");
    println!("   TypiDesk v{}", env!("CARGO_PKG_VERSION"));
    println!("   Type ?fix after your text");
    println!("=================================");
    print_help(&settings);

    emit(
        settings.debug,
        Glyph::Info,
        format!("Model: {}, Activation key: {}", settings.model, settings.activation_key),
    );

    let client = GeminiClient::new(credential, settings.endpoint.clone())?;
    let settings = Arc::new(ArcSwap::from_pointee(settings));
    if let Some(path) = settings_path {
        spawn_watcher(settings.clone(), path);
    }

    let engine = Arc::new(Engine::new(
        settings,
        Box::new(client),
        EnigoKeystrokes::factory(),
    ));
    let control = Controller::new(engine.clone(), Arc::new(RdevSource::new()));
    control.start()?;

    let outcome = run_console(&control);
    control.stop();

    let stats = engine.stats();
    let uptime = stats.uptime();
    emit(
        true,
        Glyph::Success,
        format!(
            "Session: {} transformations in {}h {:02}m {:02}s",
            stats.transformations(),
            uptime.num_hours(),
            uptime.num_minutes() % 60,
            uptime.num_seconds() % 60,
        ),
    );
    outcome
}
