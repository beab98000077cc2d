//! Adaptive bitrate algorithms.
//!
//! The coordinator is the primary source of quality decisions. When it has
//! not answered for the segment the player is about to request, the pipeline
//! falls back to a local algorithm implementing [`AbrAlgorithm`].
//!
//! Only the buffer-based algorithm ([`BufferBased`]) is provided.

mod bb;
mod ladder;
mod metrics;

pub use bb::{BbConfig, BufferBased, DEFAULT_CUSHION_MS, DEFAULT_RESERVOIR_MS};
pub use ladder::{BitrateLadder, LadderError};
pub use metrics::{BufferLevelGetter, PlaybackMetrics, Value};

use crate::segment::{Decision, SegmentIndex};

/// A local quality selection algorithm.
///
/// Implementations are invoked once per segment request, never continuously.
pub trait AbrAlgorithm: Send + Sync {
    /// Produce a decision for `index` from the latest playback metrics.
    ///
    /// # Arguments
    ///
    /// * `metrics` - Playback metrics reported since the previous call
    /// * `index` - Segment the decision applies to
    /// * `timestamp` - Milliseconds timestamp stamped onto the decision
    fn decide(&mut self, metrics: &PlaybackMetrics, index: SegmentIndex, timestamp: i64)
        -> Decision;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}
