//! Translation Layer
//!
//! Takes recognized text to the user's language through a cache and a
//! primary/fallback pair of engines. The engines, the language detector and
//! the license check are external collaborators behind the traits below.

pub mod cache;
pub mod detect;
pub mod http;
pub mod orchestrator;

use std::collections::HashSet;

use thiserror::Error;

pub use cache::TranslationCache;
pub use detect::ScriptDetector;
pub use http::{HttpEngineConfig, HttpTranslationEngine};
pub use orchestrator::{LanguageSettings, TranslationOrchestrator, TranslationOutcome};

/// Translation failures
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("engine '{engine}' failed: {message}")]
    Engine { engine: String, message: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("budget exhausted (need {needed}, {remaining} remaining)")]
    BudgetExhausted { needed: u64, remaining: u64 },

    #[error("license feature '{0}' is not available")]
    LicenseUnavailable(String),

    #[error("engine '{0}' is not available")]
    Unavailable(String),

    #[error("engine '{0}' failed to initialize: {1}")]
    Initialization(String, String),

    #[error("no translation engine configured")]
    NoEngine,

    #[error("all engines failed (primary: {primary}; fallback: {fallback})")]
    AllEnginesFailed {
        primary: Box<TranslationError>,
        fallback: Box<TranslationError>,
    },

    #[error("language detection failed: {0}")]
    Detection(String),
}

/// Remaining metered allowance of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Unbounded,
    Remaining(u64),
}

impl Budget {
    /// Whether a request costing `cost` fits in the budget
    pub fn covers(&self, cost: u64) -> bool {
        match self {
            Budget::Unbounded => true,
            Budget::Remaining(left) => *left >= cost,
        }
    }

    /// Deduct `cost`, saturating at zero
    pub fn charge(&mut self, cost: u64) {
        if let Budget::Remaining(left) = self {
            *left = left.saturating_sub(cost);
        }
    }

    pub fn remaining(&self) -> Option<u64> {
        match self {
            Budget::Unbounded => None,
            Budget::Remaining(left) => Some(*left),
        }
    }
}

/// Conservative usage estimate for translating `text`.
///
/// Metered engines bill by characters or tokens; counting every character
/// once plus half again for CJK-heavy input, plus a fixed request overhead,
/// keeps the estimate at or above what either scheme charges.
pub fn estimate_cost(text: &str) -> u64 {
    const REQUEST_OVERHEAD: u64 = 16;
    let chars = text.chars().count() as u64;
    let wide = text.chars().filter(|c| !c.is_ascii()).count() as u64;
    chars + wide.div_ceil(2) + REQUEST_OVERHEAD
}

/// A translation backend
pub trait TranslationEngine: Send {
    /// Name used in logs and outcomes
    fn name(&self) -> &str;

    /// Prepare the engine. Safe to call more than once.
    fn initialize(&mut self) -> Result<(), TranslationError>;

    /// Whether the engine can take requests right now
    fn is_available(&self) -> bool;

    /// Usage left on the engine's plan
    fn remaining_budget(&self) -> Budget;

    fn translate(&mut self, text: &str, from: &str, to: &str) -> Result<String, TranslationError>;

    /// License feature the engine requires, if any
    fn license_feature(&self) -> Option<&str> {
        None
    }

    /// Release resources owned by the engine
    fn dispose(&mut self) {}
}

/// External source-language detector
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Result<String, TranslationError>;
}

/// External license check
pub trait LicenseGate: Send + Sync {
    fn has_feature(&self, feature_id: &str) -> bool;
}

/// License gate backed by a fixed feature list
#[derive(Debug, Clone, Default)]
pub struct StaticLicense {
    features: HashSet<String>,
}

impl StaticLicense {
    pub fn new<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            features: features.into_iter().map(Into::into).collect(),
        }
    }
}

impl LicenseGate for StaticLicense {
    fn has_feature(&self, feature_id: &str) -> bool {
        self.features.contains(feature_id)
    }
}
