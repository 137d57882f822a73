//! Game OCR Translate - change-gated text recognition and translation core
//!
//! Samples a game window, re-runs text recognition only when the picture
//! changed, adapts preprocessing and confidence thresholds when nothing is
//! found, and translates the result through a cached primary/fallback engine
//! pair. Recognizers, translation engines, language detection and licensing
//! are supplied by the host through narrow traits.

pub mod app;
pub mod cache;
pub mod capture;
pub mod config;
pub mod storage;
pub mod translation;
pub mod vision;

pub use app::{RegionTracker, SessionConfig, SessionEvent, SessionStats, TranslatorSession};
pub use config::AppConfig;
