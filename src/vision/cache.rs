//! Recognition result cache keyed by a coarse perceptual frame hash

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{BoundedCache, CacheStats};
use crate::capture::Frame;
use crate::vision::{grid_coord, TextRegion};

/// Default sample grid per axis for [`frame_hash`]
pub const DEFAULT_HASH_GRID: u32 = 5;

/// Bits of precision kept per color channel
const COLOR_BITS: u32 = 3;

/// Cheap perceptual hash of a frame.
///
/// Mixes width, height and a `grid x grid` color signature where each sample
/// keeps only the top bits of every channel. Near-identical frames collide on
/// purpose so their recognition result can be reused.
pub fn frame_hash(frame: &Frame, grid: u32) -> u64 {
    let mut hasher = DefaultHasher::new();
    let (width, height) = frame.dimensions();
    width.hash(&mut hasher);
    height.hash(&mut hasher);

    let grid = grid.max(1);
    let shift = 8 - COLOR_BITS;
    for gy in 0..grid {
        let y = grid_coord(gy, grid, height);
        for gx in 0..grid {
            let x = grid_coord(gx, grid, width);
            match frame.pixel(x, y) {
                Some(px) => {
                    let signature = ((px[0] >> shift) as u16) << (2 * COLOR_BITS)
                        | ((px[1] >> shift) as u16) << COLOR_BITS
                        | (px[2] >> shift) as u16;
                    signature.hash(&mut hasher);
                }
                // Missing pixel in a malformed frame
                None => u16::MAX.hash(&mut hasher),
            }
        }
    }

    hasher.finish()
}

/// Thread-safe, capacity-bounded map from frame hash to recognized regions
pub struct RecognitionCache {
    inner: Mutex<BoundedCache<u64, Vec<TextRegion>>>,
    hash_grid: u32,
}

impl RecognitionCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_hash_grid(capacity, DEFAULT_HASH_GRID)
    }

    pub fn with_hash_grid(capacity: usize, hash_grid: u32) -> Self {
        Self {
            inner: Mutex::new(BoundedCache::new(capacity)),
            hash_grid,
        }
    }

    /// Hash a frame with this cache's grid
    pub fn key_for(&self, frame: &Frame) -> u64 {
        frame_hash(frame, self.hash_grid)
    }

    /// Cached regions for a frame, if a perceptually identical one was seen
    pub fn get(&self, frame: &Frame) -> Option<Vec<TextRegion>> {
        self.get_by_key(self.key_for(frame))
    }

    pub fn get_by_key(&self, key: u64) -> Option<Vec<TextRegion>> {
        self.inner.lock().get(&key).cloned()
    }

    pub fn put(&self, frame: &Frame, regions: Vec<TextRegion>) {
        self.put_by_key(self.key_for(frame), regions);
    }

    pub fn put_by_key(&self, key: u64, regions: Vec<TextRegion>) {
        let mut cache = self.inner.lock();
        if let Some(evicted) = cache.insert(key, regions) {
            debug!("Recognition cache evicted {:016x}", evicted);
        }
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }
}
