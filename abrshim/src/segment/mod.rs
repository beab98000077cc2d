//! Segment identity and quality decisions.
//!
//! A segment is a discrete, independently fetchable chunk of the media stream.
//! Every component in the crate correlates its work through the segment index:
//! the orchestrator requests decisions for it, the pipeline stores decisions
//! under it, and the interceptor tracks fetch state per index.

mod url;

use serde::{Deserialize, Serialize};

pub use url::{
    is_segment_url, make_header, SegmentUrl, HEADER_MARKER, SEGMENT_EXTENSION, SEGMENT_MARKER,
};

/// Index of a fetchable media segment. Never reused once served.
pub type SegmentIndex = u64;

/// Index into an ascending bitrate ladder.
pub type QualityLevel = usize;

/// The authoritative quality for a single segment.
///
/// Created once per segment, either from a coordinator response or by the
/// fallback algorithm. Decisions are never mutated; a newer decision for the
/// same index simply replaces the older one in the pipeline.
///
/// The wire form is the coordinator's JSON payload:
///
/// ```json
/// { "index": 4, "quality": 2, "timestamp": 1700000000000 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decision {
    /// Segment this decision applies to.
    pub index: SegmentIndex,
    /// Selected quality level.
    pub quality: QualityLevel,
    /// Milliseconds timestamp attached by whoever produced the decision.
    pub timestamp: i64,
}

impl Decision {
    /// Create a new decision.
    pub fn new(index: SegmentIndex, quality: QualityLevel, timestamp: i64) -> Self {
        Self {
            index,
            quality,
            timestamp,
        }
    }
}

/// Current wall-clock time as Unix milliseconds.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
