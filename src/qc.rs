//! Length and median-quality filtering.

use serde::{Deserialize, Serialize};

use crate::read::{ReadSet, SeqRead};

/// Thresholds for the quality-control stage. Both boundaries are inclusive:
/// a read exactly at the minimum passes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct QualityConfig {
    pub min_length: usize,
    pub min_median: f32,
}

impl Default for QualityConfig {
    fn default() -> QualityConfig {
        QualityConfig {
            min_length: 50,
            min_median: 20.0,
        }
    }
}

pub struct QualityFilter {
    config: QualityConfig,
    /// Process-wide quality encoding offset, fixed before any record is read.
    offset: u8,
    dropped: u64,
}

impl QualityFilter {
    pub fn new(config: QualityConfig, offset: u8) -> QualityFilter {
        QualityFilter {
            config,
            offset,
            dropped: 0,
        }
    }

    fn read_passes(&self, read: &SeqRead) -> bool {
        read.len() >= self.config.min_length
            && read.median_quality(self.offset) >= self.config.min_median
    }

    /// Whether the whole set survives. In PE mode a single failing mate
    /// drops the pair, which is what keeps the two output streams the same
    /// length.
    pub fn keep(&mut self, set: &ReadSet) -> bool {
        let pass = set.reads().all(|r| self.read_passes(r));
        if !pass {
            self.dropped += 1;
        }
        pass
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
