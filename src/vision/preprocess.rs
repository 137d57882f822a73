//! Image preprocessing presets for OCR
//!
//! Game text comes in every contrast and font weight imaginable, so the
//! pipeline walks an ordered ladder of enhancement presets whenever a
//! recognition attempt finds nothing.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::Frame;
use crate::storage::OptimalSettings;
use crate::vision::Rect;

/// A named bundle of enhancement parameters.
///
/// Every field has a neutral value; a preset with all neutral values leaves
/// the frame untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingPreset {
    pub name: String,
    /// Contrast factor around mid-gray (1.0 = unchanged)
    pub contrast: f32,
    /// Additive brightness offset in 8-bit levels
    pub brightness: f32,
    /// 3x3 sharpen strength (0.0 = off, 1.0 = strong)
    pub sharpness: f32,
    /// Median filter radius in pixels (0 = off)
    pub noise_reduction: f32,
    /// Resize factor applied first (1.0 = unchanged)
    pub scale_factor: f32,
    /// Luma cut-off for black/white conversion (0 = off)
    pub binarize_threshold: u8,
    /// Border added on every side, in output pixels
    pub padding: u32,
}

impl Default for PreprocessingPreset {
    fn default() -> Self {
        Self::neutral()
    }
}

impl PreprocessingPreset {
    pub fn neutral() -> Self {
        Self {
            name: "neutral".to_string(),
            contrast: 1.0,
            brightness: 0.0,
            sharpness: 0.0,
            noise_reduction: 0.0,
            scale_factor: 1.0,
            binarize_threshold: 0,
            padding: 0,
        }
    }

    pub fn high_contrast() -> Self {
        Self {
            name: "high_contrast".to_string(),
            contrast: 1.8,
            brightness: 10.0,
            ..Self::neutral()
        }
    }

    pub fn upscaled() -> Self {
        Self {
            name: "upscaled".to_string(),
            scale_factor: 2.0,
            padding: 8,
            ..Self::neutral()
        }
    }

    pub fn sharpened() -> Self {
        Self {
            name: "sharpened".to_string(),
            contrast: 1.2,
            sharpness: 0.8,
            noise_reduction: 1.0,
            ..Self::neutral()
        }
    }

    pub fn binarized() -> Self {
        Self {
            name: "binarized".to_string(),
            scale_factor: 2.0,
            contrast: 1.4,
            binarize_threshold: 128,
            padding: 10,
            ..Self::neutral()
        }
    }

    /// The built-in ladder, mildest first
    pub fn default_ladder() -> Vec<Self> {
        vec![
            Self::neutral(),
            Self::high_contrast(),
            Self::upscaled(),
            Self::sharpened(),
            Self::binarized(),
        ]
    }

    /// Whether applying this preset would leave a frame unchanged
    pub fn is_neutral(&self) -> bool {
        (self.contrast - 1.0).abs() <= 0.01
            && self.brightness.abs() <= 0.5
            && self.sharpness <= 0.01
            && self.noise_reduction < 0.5
            && (self.scale_factor - 1.0).abs() <= 0.01
            && self.binarize_threshold == 0
            && self.padding == 0
    }

    /// Scale factor with nonsensical values replaced by 1.0
    fn effective_scale(&self) -> f32 {
        if self.scale_factor.is_finite() && self.scale_factor > 0.0 {
            self.scale_factor.min(8.0)
        } else {
            1.0
        }
    }
}

/// Walks an ordered, fixed list of presets
#[derive(Debug, Clone)]
pub struct PreprocessSelector {
    presets: Vec<PreprocessingPreset>,
    ladder: Vec<PreprocessingPreset>,
    index: usize,
}

impl Default for PreprocessSelector {
    fn default() -> Self {
        Self::new(PreprocessingPreset::default_ladder())
    }
}

impl PreprocessSelector {
    /// Create a selector over `presets`. An empty list falls back to a single
    /// neutral preset.
    pub fn new(presets: Vec<PreprocessingPreset>) -> Self {
        let presets = if presets.is_empty() {
            warn!("Empty preset list, using neutral preset only");
            vec![PreprocessingPreset::neutral()]
        } else {
            presets
        };

        Self {
            ladder: presets.clone(),
            presets,
            index: 0,
        }
    }

    /// The preset to use for the next attempt
    pub fn current(&self) -> PreprocessingPreset {
        self.ladder[self.index].clone()
    }

    /// Move to the next preset. Returns `false`, staying on the last preset,
    /// once the ladder is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.index + 1 < self.ladder.len() {
            self.index += 1;
            debug!("Advanced to preset '{}'", self.ladder[self.index].name);
            true
        } else {
            false
        }
    }

    /// Go back to the first rung of the ladder
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Jump to a rung directly. Out-of-range indices select the first rung.
    pub fn select(&mut self, index: usize) -> usize {
        if index < self.ladder.len() {
            self.index = index;
        } else {
            warn!(
                "Preset index {} out of range (0..{}), using first preset",
                index,
                self.ladder.len()
            );
            self.index = 0;
        }
        self.index
    }

    /// Seed the ladder with a persisted optimal preset: it becomes the first
    /// rung, followed by the built-in presets that differ from it.
    pub fn apply_named(&mut self, settings: &OptimalSettings) {
        let seed = settings.preset.clone();
        let mut ladder = Vec::with_capacity(self.presets.len() + 1);
        ladder.push(seed.clone());
        ladder.extend(self.presets.iter().filter(|p| **p != seed).cloned());

        debug!("Seeded preset ladder with '{}' ({} rungs)", seed.name, ladder.len());
        self.ladder = ladder;
        self.index = 0;
    }

    /// Drop any seed and return to the built-in ladder
    pub fn clear_seed(&mut self) {
        self.ladder = self.presets.clone();
        self.index = 0;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.ladder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ladder.is_empty()
    }

    /// Whether the selector sits on its last rung
    pub fn is_exhausted(&self) -> bool {
        self.index + 1 >= self.ladder.len()
    }

    /// All rungs in order
    pub fn presets(&self) -> &[PreprocessingPreset] {
        &self.ladder
    }
}

/// A frame after preprocessing, with the geometry needed to map detected
/// bounds back onto the captured frame
#[derive(Debug, Clone)]
pub struct PreprocessedFrame {
    pub frame: Frame,
    pub scale: f32,
    pub padding: u32,
}

impl PreprocessedFrame {
    /// Map a box from processed coordinates to original frame coordinates
    pub fn to_original(&self, rect: Rect, original: (u32, u32)) -> Rect {
        let unpad = |v: u32| v.saturating_sub(self.padding) as f32 / self.scale;
        let x = (unpad(rect.x) as u32).min(original.0);
        let y = (unpad(rect.y) as u32).min(original.1);
        let width = ((rect.width as f32 / self.scale) as u32).min(original.0 - x);
        let height = ((rect.height as f32 / self.scale) as u32).min(original.1 - y);
        Rect::new(x, y, width, height)
    }
}

/// Apply a preset to a frame.
///
/// Order: resize, brightness, contrast, noise reduction, sharpen, binarize,
/// padding. A neutral preset or a malformed frame is passed through as-is.
pub fn apply_preset(frame: &Frame, preset: &PreprocessingPreset) -> PreprocessedFrame {
    let passthrough = || PreprocessedFrame {
        frame: frame.clone(),
        scale: 1.0,
        padding: 0,
    };

    if preset.is_neutral() {
        return passthrough();
    }

    let Some(mut img) = RgbaImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
    else {
        warn!("Cannot preprocess malformed {}x{} frame", frame.width(), frame.height());
        return passthrough();
    };

    let scale = preset.effective_scale();
    if (scale - 1.0).abs() > 0.01 {
        let w = ((frame.width() as f32 * scale).round() as u32).max(1);
        let h = ((frame.height() as f32 * scale).round() as u32).max(1);
        img = imageops::resize(&img, w, h, FilterType::Triangle);
    }

    if preset.brightness.abs() > 0.5 {
        apply_brightness(&mut img, preset.brightness);
    }

    if (preset.contrast - 1.0).abs() > 0.01 {
        apply_contrast(&mut img, preset.contrast);
    }

    let radius = preset.noise_reduction.round();
    if radius >= 1.0 {
        let radius = radius as u32;
        img = imageproc::filter::median_filter(&img, radius, radius);
    }

    if preset.sharpness > 0.01 {
        img = apply_sharpen(&img, preset.sharpness);
    }

    if preset.binarize_threshold > 0 {
        apply_binarize(&mut img, preset.binarize_threshold);
    }

    let scaled_width = img.width();
    if preset.padding > 0 {
        img = apply_padding(&img, preset.padding);
    }

    let (width, height) = img.dimensions();
    debug!(
        "Preset '{}' produced {}x{} from {}x{}",
        preset.name,
        width,
        height,
        frame.width(),
        frame.height()
    );

    PreprocessedFrame {
        frame: Frame::with_timestamp(img.into_raw(), width, height, frame.captured_at()),
        scale: scaled_width as f32 / frame.width() as f32,
        padding: preset.padding,
    }
}

fn apply_brightness(img: &mut RgbaImage, offset: f32) {
    for px in img.pixels_mut() {
        for c in 0..3 {
            px[c] = (px[c] as f32 + offset).clamp(0.0, 255.0) as u8;
        }
    }
}

/// Contrast around mid-gray (128); alpha is left alone
fn apply_contrast(img: &mut RgbaImage, factor: f32) {
    for px in img.pixels_mut() {
        for c in 0..3 {
            let adjusted = ((px[c] as f32 - 128.0) * factor + 128.0).clamp(0.0, 255.0);
            px[c] = adjusted as u8;
        }
    }
}

/// 3x3 cross sharpen: center weight 1 + 4s, direct neighbours -s. Edges are
/// copied unchanged.
fn apply_sharpen(img: &RgbaImage, strength: f32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let mut result = img.clone();
    if w < 3 || h < 3 {
        return result;
    }

    let center_weight = 1.0 + 4.0 * strength;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = img.get_pixel(x, y);
            let top = img.get_pixel(x, y - 1);
            let bottom = img.get_pixel(x, y + 1);
            let left = img.get_pixel(x - 1, y);
            let right = img.get_pixel(x + 1, y);

            let out = result.get_pixel_mut(x, y);
            for c in 0..3 {
                let neighbours = top[c] as f32 + bottom[c] as f32 + left[c] as f32 + right[c] as f32;
                let sharpened = center[c] as f32 * center_weight - neighbours * strength;
                out[c] = sharpened.clamp(0.0, 255.0) as u8;
            }
        }
    }

    result
}

fn apply_binarize(img: &mut RgbaImage, threshold: u8) {
    for px in img.pixels_mut() {
        let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
        let v = if luma >= threshold as f32 { 255 } else { 0 };
        px[0] = v;
        px[1] = v;
        px[2] = v;
    }
}

/// White border on every side
fn apply_padding(img: &RgbaImage, padding: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let mut padded = RgbaImage::from_pixel(w + 2 * padding, h + 2 * padding, Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut padded, img, padding as i64, padding as i64);
    padded
}
