//! Game OCR Translate - command line front end
//!
//! Replays screenshot directories through the change gate, runs one-off
//! translations with the configured engines and manages stored recognition
//! profiles.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use game_ocr_translate::app::build_orchestrator;
use game_ocr_translate::capture::{CaptureError, FrameSource, ImageSequenceSource, WindowHandle};
use game_ocr_translate::config::{self, AppConfig};
use game_ocr_translate::storage::{JsonProfileStore, ProfileStore};
use game_ocr_translate::translation::TranslationOutcome;
use game_ocr_translate::vision::{ChangeDetector, RecognitionCache};

/// Game OCR Translate - change-gated game text recognition and translation
#[derive(Parser, Debug)]
#[command(name = "game-ocr-translate")]
#[command(about = "Recognize and translate text in game windows")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a screenshot directory through the change gate and frame hash
    Scan {
        /// Directory of PNG/JPEG/BMP frames, replayed in name order
        dir: PathBuf,
    },
    /// Translate a piece of text with the configured engines
    Translate {
        text: String,
        /// Source language (detected when omitted)
        #[arg(long)]
        from: Option<String>,
        /// Target language (preferred target when omitted)
        #[arg(long)]
        to: Option<String>,
    },
    /// Inspect or reset stored recognition profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
        /// Profile store file (defaults to the user data directory)
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug)]
enum ProfileAction {
    /// Show the profile for a target, or list targets when none is given
    Show { target: Option<String> },
    /// Reset a target's profile to defaults
    Reset { target: String },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Scan { dir } => scan(&config, &dir),
        Command::Translate { text, from, to } => translate(&config, &text, from, to),
        Command::Profile { action, store } => profile(action, store.as_deref()),
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::default_config_path()?,
    };
    let config = config::load_or_default(&path)?;
    info!("Configuration: {:?}", path);
    Ok(config)
}

fn scan(config: &AppConfig, dir: &Path) -> Result<()> {
    let mut source = ImageSequenceSource::from_dir(dir, false)?;
    let window = WindowHandle::new(dir.display().to_string());
    let mut detector = ChangeDetector::new(config.change.clone());
    let cache = RecognitionCache::with_hash_grid(
        config.recognition.cache_capacity,
        config.recognition.hash_grid,
    );

    let mut previous = None;
    let mut changed = 0usize;
    let mut index = 0usize;
    loop {
        let frame = match source.capture(&window) {
            Ok(frame) => frame,
            Err(CaptureError::Exhausted) => break,
            Err(e) => {
                eprintln!("  [{:>4}] skipped: {}", index, e);
                index += 1;
                continue;
            }
        };

        let ratio = previous
            .as_ref()
            .and_then(|p| detector.difference_ratio(p, &frame));
        let significant = detector.has_significant_change(&frame);
        if significant {
            changed += 1;
        }

        println!(
            "  [{:>4}] {}x{} hash={:016x} diff={} {}",
            index,
            frame.width(),
            frame.height(),
            cache.key_for(&frame),
            ratio.map(|r| format!("{:.3}", r)).unwrap_or_else(|| "-".to_string()),
            if significant { "CHANGED" } else { "same" }
        );

        previous = Some(frame);
        index += 1;
    }

    println!("{} frame(s), {} would trigger recognition", index, changed);
    Ok(())
}

fn translate(config: &AppConfig, text: &str, from: Option<String>, to: Option<String>) -> Result<()> {
    let orchestrator = build_orchestrator(&config.translation);

    let outcome = match (from, to) {
        (None, None) => orchestrator.translate_auto(text),
        (from, to) => {
            let from = from.unwrap_or_else(|| orchestrator.resolve_auto(text).0);
            let to = to.unwrap_or_else(|| orchestrator.languages().auto_target(&from));
            orchestrator.translate(text, &from, &to)
        }
    };

    match &outcome {
        TranslationOutcome::Translated { engine, used_fallback, .. } => {
            info!("Translated by '{}'{}", engine, if *used_fallback { " (fallback)" } else { "" });
        }
        TranslationOutcome::Failed { error, .. } => {
            anyhow::bail!("Translation failed: {}", error);
        }
        _ => {}
    }

    println!("{}", outcome.text());
    Ok(())
}

fn profile(action: ProfileAction, store: Option<&Path>) -> Result<()> {
    let store = match store {
        Some(path) => JsonProfileStore::open(path)?,
        None => JsonProfileStore::open_default().context("Failed to open profile store")?,
    };

    match action {
        ProfileAction::Show { target: None } => {
            for target in store.targets() {
                println!("{}", target);
            }
        }
        ProfileAction::Show { target: Some(target) } => match store.load(&target)? {
            Some(settings) => println!("{}", serde_json::to_string_pretty(&settings)?),
            None => println!("No profile for '{}'", target),
        },
        ProfileAction::Reset { target } => {
            let mut settings = store.load(&target)?.unwrap_or_default();
            settings.reset_to_defaults();
            store.save(&target, &settings)?;
            println!("Reset profile for '{}'", target);
        }
    }
    Ok(())
}
