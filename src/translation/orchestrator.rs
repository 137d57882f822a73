//! Translation orchestrator
//!
//! Resolves languages, consults the cache and drives the active engine,
//! falling back to the secondary engine when the active one errors, runs out
//! of budget, is unavailable or is not covered by the license. Failures end
//! up as [`TranslationOutcome::Failed`] with a displayable placeholder.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::translation::{
    estimate_cost, Budget, LanguageDetector, LicenseGate, TranslationCache, TranslationEngine,
    TranslationError,
};

/// Language selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageSettings {
    /// Language codes the engines are expected to handle
    pub supported: Vec<String>,
    /// Used when a source code is unsupported or detection fails
    pub default_source: String,
    /// The user's language
    pub preferred_target: String,
    /// Target used when the text is already in the preferred language
    pub alternate_target: String,
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self {
            supported: ["en", "ja", "zh", "ko", "fr", "de", "es"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_source: "en".to_string(),
            preferred_target: "ja".to_string(),
            alternate_target: "en".to_string(),
        }
    }
}

impl LanguageSettings {
    pub fn is_supported(&self, code: &str) -> bool {
        self.supported.iter().any(|s| s.eq_ignore_ascii_case(code))
    }

    /// Normalize `code`, replacing an unsupported one with `fallback`
    fn validate(&self, code: &str, fallback: &str) -> String {
        let normalized = code.trim().to_ascii_lowercase();
        if self.is_supported(&normalized) {
            normalized
        } else {
            warn!("Unsupported language '{}', using '{}'", code, fallback);
            fallback.to_ascii_lowercase()
        }
    }

    /// Target language for text detected as `detected`: the preferred target,
    /// unless the text is already in it
    pub fn auto_target(&self, detected: &str) -> String {
        let preferred = self.preferred_target.to_ascii_lowercase();
        if !detected.eq_ignore_ascii_case(&preferred) {
            return preferred;
        }

        let alternate = self.alternate_target.to_ascii_lowercase();
        if alternate != preferred && self.is_supported(&alternate) {
            return alternate;
        }

        self.supported
            .iter()
            .map(|s| s.to_ascii_lowercase())
            .find(|s| *s != preferred)
            .unwrap_or(alternate)
    }
}

/// Result of a translation request
#[derive(Debug, Clone, PartialEq)]
pub enum TranslationOutcome {
    /// Source and target language are the same, or the text is blank
    Unchanged { text: String },
    /// Served from the translation cache
    Cached { text: String },
    /// Fresh engine translation
    Translated {
        text: String,
        engine: String,
        used_fallback: bool,
    },
    /// Every engine failed; `placeholder` is safe to display
    Failed { placeholder: String, error: String },
}

impl TranslationOutcome {
    /// Text to display for this outcome
    pub fn text(&self) -> &str {
        match self {
            TranslationOutcome::Unchanged { text }
            | TranslationOutcome::Cached { text }
            | TranslationOutcome::Translated { text, .. } => text,
            TranslationOutcome::Failed { placeholder, .. } => placeholder,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, TranslationOutcome::Failed { .. })
    }
}

struct EngineSlot {
    engine: Box<dyn TranslationEngine>,
    is_initialized: bool,
    budget: Budget,
}

impl EngineSlot {
    fn new(engine: Box<dyn TranslationEngine>) -> Self {
        Self {
            engine,
            is_initialized: false,
            budget: Budget::Unbounded,
        }
    }

    fn name(&self) -> String {
        self.engine.name().to_string()
    }

    fn ensure_initialized(&mut self) -> Result<(), TranslationError> {
        if self.is_initialized {
            return Ok(());
        }
        self.engine.initialize()?;
        self.budget = self.engine.remaining_budget();
        self.is_initialized = true;
        info!("Translation engine '{}' initialized ({:?})", self.engine.name(), self.budget);
        Ok(())
    }
}

struct EngineState {
    active: Option<EngineSlot>,
    fallback: Option<EngineSlot>,
}

/// Routes translation requests through cache, active engine and fallback.
///
/// Engine state sits behind one mutex that is held for the duration of an
/// engine call, so initialization and translation never overlap on the same
/// engine. Callers are serialized by that lock: a request made while another
/// is in flight waits for it, up to the primary plus fallback engine timeouts.
pub struct TranslationOrchestrator {
    state: Mutex<EngineState>,
    cache: Arc<TranslationCache>,
    detector: Box<dyn LanguageDetector>,
    license: Arc<dyn LicenseGate>,
    languages: RwLock<LanguageSettings>,
}

impl TranslationOrchestrator {
    pub fn new(
        active: Option<Box<dyn TranslationEngine>>,
        cache: Arc<TranslationCache>,
        detector: Box<dyn LanguageDetector>,
        license: Arc<dyn LicenseGate>,
        languages: LanguageSettings,
    ) -> Self {
        Self {
            state: Mutex::new(EngineState {
                active: active.map(EngineSlot::new),
                fallback: None,
            }),
            cache,
            detector,
            license,
            languages: RwLock::new(languages),
        }
    }

    /// Builder-style fallback engine
    pub fn with_fallback(self, engine: Box<dyn TranslationEngine>) -> Self {
        self.set_fallback(Some(engine));
        self
    }

    /// Replace the active engine. The previous one is disposed and the new
    /// one is initialized lazily before its first request.
    pub fn set_engine(&self, engine: Box<dyn TranslationEngine>) {
        let mut state = self.state.lock();
        if let Some(mut previous) = state.active.take() {
            info!("Switching translation engine '{}' -> '{}'", previous.engine.name(), engine.name());
            previous.engine.dispose();
        }
        state.active = Some(EngineSlot::new(engine));
    }

    /// Replace or remove the fallback engine, disposing the previous one
    pub fn set_fallback(&self, engine: Option<Box<dyn TranslationEngine>>) {
        let mut state = self.state.lock();
        if let Some(mut previous) = state.fallback.take() {
            previous.engine.dispose();
        }
        state.fallback = engine.map(EngineSlot::new);
    }

    /// Initialize the active engine ahead of the first request. Idempotent.
    pub fn initialize(&self) -> Result<(), TranslationError> {
        let mut state = self.state.lock();
        let slot = state.active.as_mut().ok_or(TranslationError::NoEngine)?;
        self.check_license(slot)?;
        slot.ensure_initialized()
    }

    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|s| s.is_initialized)
            .unwrap_or(false)
    }

    /// Name of the active engine
    pub fn active_engine(&self) -> Option<String> {
        self.state.lock().active.as_ref().map(EngineSlot::name)
    }

    /// Budget the orchestrator tracks for the active engine
    pub fn remaining_budget(&self) -> Option<Budget> {
        self.state.lock().active.as_ref().map(|s| s.budget)
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    pub fn languages(&self) -> LanguageSettings {
        self.languages.read().clone()
    }

    pub fn set_preferred_target(&self, code: &str) {
        let mut languages = self.languages.write();
        let validated = languages.validate(code, &languages.preferred_target.clone());
        languages.preferred_target = validated;
    }

    /// Translate with explicit languages
    pub fn translate(&self, text: &str, from: &str, to: &str) -> TranslationOutcome {
        let (from, to) = {
            let languages = self.languages.read();
            (
                languages.validate(from, &languages.default_source),
                languages.validate(to, &languages.preferred_target),
            )
        };

        if from == to {
            return TranslationOutcome::Unchanged {
                text: text.to_string(),
            };
        }

        let source = text.trim();
        if source.is_empty() {
            return TranslationOutcome::Unchanged {
                text: text.to_string(),
            };
        }

        if let Some(hit) = self.cache.get(source, &from, &to) {
            debug!("Translation cache hit ({}->{})", from, to);
            return TranslationOutcome::Cached { text: hit };
        }

        let result = {
            let mut state = self.state.lock();
            self.run_engines(&mut state, source, &from, &to)
        };

        match result {
            Ok((translated, engine, used_fallback)) => {
                self.cache.put(source, &translated, &from, &to);
                TranslationOutcome::Translated {
                    text: translated,
                    engine,
                    used_fallback,
                }
            }
            Err(e) => {
                warn!("Translation failed ({}->{}): {}", from, to, e);
                TranslationOutcome::Failed {
                    placeholder: format!("[Translation unavailable: {}]", e),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Translate with a detected source language. Text already in the
    /// preferred target language goes to the alternate language instead.
    pub fn translate_auto(&self, text: &str) -> TranslationOutcome {
        let (from, to) = self.resolve_auto(text);
        self.translate(text, &from, &to)
    }

    /// Source and target languages `translate_auto` would use for `text`
    pub fn resolve_auto(&self, text: &str) -> (String, String) {
        let languages = self.languages.read();
        let detected = match self.detector.detect(text) {
            Ok(code) => code,
            Err(e) => {
                warn!("Language detection failed: {}", e);
                languages.default_source.clone()
            }
        };
        let from = languages.validate(&detected, &languages.default_source);
        let to = languages.auto_target(&from);
        debug!("Auto languages: detected '{}' -> {}->{}", detected, from, to);
        (from, to)
    }

    fn run_engines(
        &self,
        state: &mut EngineState,
        text: &str,
        from: &str,
        to: &str,
    ) -> Result<(String, String, bool), TranslationError> {
        let cost = estimate_cost(text);

        let primary_error = match state.active.as_mut() {
            Some(slot) => match self.try_engine(slot, text, from, to, cost) {
                Ok(translated) => return Ok((translated, slot.name(), false)),
                Err(e) => {
                    warn!("Engine '{}' failed: {}", slot.engine.name(), e);
                    e
                }
            },
            None => TranslationError::NoEngine,
        };

        let Some(slot) = state.fallback.as_mut() else {
            return Err(primary_error);
        };

        info!("Falling back to engine '{}'", slot.engine.name());
        match self.try_engine(slot, text, from, to, cost) {
            Ok(translated) => Ok((translated, slot.name(), true)),
            Err(e) => {
                warn!("Fallback engine '{}' failed: {}", slot.engine.name(), e);
                Err(TranslationError::AllEnginesFailed {
                    primary: Box::new(primary_error),
                    fallback: Box::new(e),
                })
            }
        }
    }

    fn check_license(&self, slot: &EngineSlot) -> Result<(), TranslationError> {
        match slot.engine.license_feature() {
            Some(feature) if !self.license.has_feature(feature) => {
                Err(TranslationError::LicenseUnavailable(feature.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn try_engine(
        &self,
        slot: &mut EngineSlot,
        text: &str,
        from: &str,
        to: &str,
        cost: u64,
    ) -> Result<String, TranslationError> {
        self.check_license(slot)?;
        slot.ensure_initialized()?;

        if !slot.engine.is_available() {
            return Err(TranslationError::Unavailable(slot.name()));
        }

        let budget = tighter(slot.budget, slot.engine.remaining_budget());
        if !budget.covers(cost) {
            return Err(TranslationError::BudgetExhausted {
                needed: cost,
                remaining: budget.remaining().unwrap_or(0),
            });
        }

        let translated = slot.engine.translate(text, from, to)?;
        if translated.trim().is_empty() {
            return Err(TranslationError::InvalidResponse(format!(
                "engine '{}' returned empty text",
                slot.engine.name()
            )));
        }

        slot.budget.charge(cost);
        Ok(translated)
    }
}

impl Drop for TranslationOrchestrator {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for slot in [state.active.as_mut(), state.fallback.as_mut()].into_iter().flatten() {
            slot.engine.dispose();
        }
    }
}

/// The smaller of two budgets
fn tighter(a: Budget, b: Budget) -> Budget {
    match (a, b) {
        (Budget::Unbounded, other) | (other, Budget::Unbounded) => other,
        (Budget::Remaining(x), Budget::Remaining(y)) => Budget::Remaining(x.min(y)),
    }
}
