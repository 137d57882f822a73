//! Script-based language detection
//!
//! Good enough to tell Japanese, Korean and Chinese game text apart from
//! Latin-script text without a model. Latin text is reported as English.

use crate::translation::{LanguageDetector, TranslationError};

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptDetector;

impl ScriptDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect_code(&self, text: &str) -> &'static str {
        let mut kana = 0usize;
        let mut hangul = 0usize;
        let mut han = 0usize;

        for c in text.chars() {
            match c as u32 {
                0x3040..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9F => kana += 1,
                0xAC00..=0xD7AF | 0x1100..=0x11FF | 0x3130..=0x318F => hangul += 1,
                0x4E00..=0x9FFF | 0x3400..=0x4DBF => han += 1,
                _ => {}
            }
        }

        if kana > 0 {
            "ja"
        } else if hangul > 0 {
            "ko"
        } else if han > 0 {
            "zh"
        } else {
            "en"
        }
    }
}

impl LanguageDetector for ScriptDetector {
    fn detect(&self, text: &str) -> Result<String, TranslationError> {
        Ok(self.detect_code(text).to_string())
    }
}
