//! Ascending bitrate ladder.

use thiserror::Error;

use crate::segment::QualityLevel;

/// Errors raised when building a ladder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LadderError {
    /// The ladder has no rungs.
    #[error("bitrate ladder is empty")]
    Empty,

    /// A rung is not strictly greater than its predecessor.
    #[error("bitrate ladder is not ascending at position {position}")]
    NotAscending { position: usize },
}

/// Ordered, ascending list of available bitrates (kbps).
///
/// Quality level `q` refers to `bitrates[q]`. A ladder always has at least
/// one rung.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitrateLadder {
    bitrates: Vec<u32>,
}

impl BitrateLadder {
    /// Create a ladder, validating that it is non-empty and strictly ascending.
    pub fn new(bitrates: Vec<u32>) -> Result<Self, LadderError> {
        if bitrates.is_empty() {
            return Err(LadderError::Empty);
        }
        if let Some(position) = bitrates.windows(2).position(|w| w[0] >= w[1]) {
            return Err(LadderError::NotAscending {
                position: position + 1,
            });
        }
        Ok(Self { bitrates })
    }

    /// Number of quality levels.
    pub fn len(&self) -> usize {
        self.bitrates.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.bitrates.is_empty()
    }

    /// Lowest bitrate (quality 0).
    pub fn lowest(&self) -> u32 {
        self.bitrates[0]
    }

    /// Highest bitrate.
    pub fn highest(&self) -> u32 {
        self.bitrates[self.bitrates.len() - 1]
    }

    /// Highest quality level.
    pub fn top_quality(&self) -> QualityLevel {
        self.bitrates.len() - 1
    }

    /// Bitrate for a quality level.
    pub fn bitrate(&self, quality: QualityLevel) -> Option<u32> {
        self.bitrates.get(quality).copied()
    }

    /// All bitrates, ascending.
    pub fn as_slice(&self) -> &[u32] {
        &self.bitrates
    }

    /// Highest quality whose bitrate does not exceed `bitrate`.
    ///
    /// Scans from the top down; when every rung exceeds `bitrate` the lowest
    /// quality (0) is returned.
    pub fn highest_at_most(&self, bitrate: f64) -> QualityLevel {
        self.bitrates
            .iter()
            .rposition(|&rung| bitrate >= f64::from(rung))
            .unwrap_or(0)
    }
}
