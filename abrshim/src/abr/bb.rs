//! Buffer-based (BB) quality selection.
//!
//! Maps the current buffer level onto the bitrate ladder through a linear
//! ramp:
//!
//! ```text
//! bitrate
//!   ▲
//!   │                         ┌──────────── highest
//!   │                       ╱
//!   │                     ╱
//!   │                   ╱
//!   │ ─────────────────┘                    lowest
//!   └──────────────────┬──────┬──────────► buffer level
//!                  reservoir  reservoir + cushion
//! ```
//!
//! The interpolated bitrate is then rounded down to the highest rung that
//! does not exceed it.

use tracing::debug;

use super::{AbrAlgorithm, BitrateLadder, BufferLevelGetter, PlaybackMetrics};
use crate::segment::{Decision, QualityLevel, SegmentIndex};

/// Default low-water mark in milliseconds.
///
/// At or below this level the lowest bitrate is always chosen.
pub const DEFAULT_RESERVOIR_MS: f64 = 5_000.0;

/// Default ramp width in milliseconds.
///
/// At or above `reservoir + cushion` the highest bitrate is always chosen.
pub const DEFAULT_CUSHION_MS: f64 = 10_000.0;

/// Configuration for the buffer-based algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BbConfig {
    /// Low-water mark in milliseconds. Default: 5000.
    pub reservoir_ms: f64,
    /// Ramp width in milliseconds. Default: 10000.
    pub cushion_ms: f64,
}

impl Default for BbConfig {
    fn default() -> Self {
        Self {
            reservoir_ms: DEFAULT_RESERVOIR_MS,
            cushion_ms: DEFAULT_CUSHION_MS,
        }
    }
}

impl BbConfig {
    /// Set the reservoir.
    pub fn with_reservoir_ms(mut self, reservoir_ms: f64) -> Self {
        self.reservoir_ms = reservoir_ms;
        self
    }

    /// Set the cushion.
    pub fn with_cushion_ms(mut self, cushion_ms: f64) -> Self {
        self.cushion_ms = cushion_ms;
        self
    }
}

/// Buffer-based algorithm over a fixed ladder.
#[derive(Debug, Clone)]
pub struct BufferBased {
    ladder: BitrateLadder,
    config: BbConfig,
    buffer_level: BufferLevelGetter,
}

impl BufferBased {
    /// Create the algorithm for a ladder.
    pub fn new(ladder: BitrateLadder, config: BbConfig) -> Self {
        Self {
            ladder,
            config,
            buffer_level: BufferLevelGetter::new(),
        }
    }

    /// The ladder decisions are made against.
    pub fn ladder(&self) -> &BitrateLadder {
        &self.ladder
    }

    /// The active configuration.
    pub fn config(&self) -> &BbConfig {
        &self.config
    }

    /// Interpolated target bitrate for a buffer level.
    pub fn target_bitrate(&self, buffer_level_ms: f64) -> f64 {
        let BbConfig {
            reservoir_ms,
            cushion_ms,
        } = self.config;
        let lowest = f64::from(self.ladder.lowest());
        let highest = f64::from(self.ladder.highest());

        if buffer_level_ms <= reservoir_ms {
            lowest
        } else if buffer_level_ms >= reservoir_ms + cushion_ms {
            highest
        } else {
            lowest + (highest - lowest) * (buffer_level_ms - reservoir_ms) / cushion_ms
        }
    }

    /// Quality level for a buffer level.
    pub fn quality_for(&self, buffer_level_ms: f64) -> QualityLevel {
        self.ladder
            .highest_at_most(self.target_bitrate(buffer_level_ms))
    }

    /// Decide directly from a buffer level, bypassing the metrics getter.
    pub fn decide_for_buffer(
        &self,
        buffer_level_ms: f64,
        index: SegmentIndex,
        timestamp: i64,
    ) -> Decision {
        let bitrate = self.target_bitrate(buffer_level_ms);
        let quality = self.ladder.highest_at_most(bitrate);

        debug!(
            bitrate,
            quality,
            buffer_level = buffer_level_ms,
            "BB decision"
        );

        Decision::new(index, quality, timestamp)
    }
}

impl AbrAlgorithm for BufferBased {
    fn decide(
        &mut self,
        metrics: &PlaybackMetrics,
        index: SegmentIndex,
        timestamp: i64,
    ) -> Decision {
        self.buffer_level.update(metrics);
        self.decide_for_buffer(self.buffer_level.value(), index, timestamp)
    }

    fn name(&self) -> &'static str {
        "BB"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bb() -> BufferBased {
        let ladder = BitrateLadder::new(vec![300, 750, 1200]).unwrap();
        BufferBased::new(ladder, BbConfig::default())
    }

    #[test]
    fn test_config_defaults() {
        let config = BbConfig::default();
        assert_eq!(config.reservoir_ms, 5000.0);
        assert_eq!(config.cushion_ms, 10000.0);
    }

    #[test]
    fn test_config_builder() {
        let config = BbConfig::default()
            .with_reservoir_ms(2000.0)
            .with_cushion_ms(4000.0);
        assert_eq!(config.reservoir_ms, 2000.0);
        assert_eq!(config.cushion_ms, 4000.0);
    }

    #[test]
    fn test_interpolated_target() {
        // 300 + (1200 - 300) * (8000 - 5000) / 10000
        assert!((bb().target_bitrate(8000.0) - 570.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mid_ramp_rounds_down() {
        let bb = bb();
        assert_eq!(bb.quality_for(8000.0), 0);
        assert_eq!(bb.quality_for(10000.0), 1);
    }

    #[test]
    fn test_full_buffer_selects_top() {
        assert_eq!(bb().quality_for(20000.0), 2);
        assert_eq!(bb().quality_for(15000.0), 2);
    }

    #[test]
    fn test_empty_buffer_selects_bottom() {
        assert_eq!(bb().quality_for(0.0), 0);
        assert_eq!(bb().quality_for(5000.0), 0);
    }

    #[test]
    fn test_single_rung_ladder() {
        let ladder = BitrateLadder::new(vec![500]).unwrap();
        let bb = BufferBased::new(ladder, BbConfig::default());
        assert_eq!(bb.quality_for(0.0), 0);
        assert_eq!(bb.quality_for(8000.0), 0);
        assert_eq!(bb.quality_for(50000.0), 0);
    }

    #[test]
    fn test_zero_cushion_is_a_step() {
        let ladder = BitrateLadder::new(vec![300, 750, 1200]).unwrap();
        let bb = BufferBased::new(ladder, BbConfig::default().with_cushion_ms(0.0));
        assert_eq!(bb.quality_for(5000.0), 0);
        assert_eq!(bb.quality_for(5000.1), 2);
    }

    #[test]
    fn test_decide_uses_newest_buffer_sample() {
        let mut bb = bb();
        let decision = bb.decide(&PlaybackMetrics::with_buffer_level(20000.0, 10), 7, 99);
        assert_eq!(decision, Decision::new(7, 2, 99));

        // Older sample is ignored
        let decision = bb.decide(&PlaybackMetrics::with_buffer_level(0.0, 5), 8, 100);
        assert_eq!(decision.quality, 2);

        let decision = bb.decide(&PlaybackMetrics::with_buffer_level(0.0, 11), 9, 101);
        assert_eq!(decision.quality, 0);
    }

    #[test]
    fn test_decide_without_metrics_selects_bottom() {
        let mut bb = bb();
        let decision = bb.decide(&PlaybackMetrics::default(), 1, 0);
        assert_eq!(decision.quality, 0);
        assert_eq!(bb.name(), "BB");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn ladder_strategy() -> impl Strategy<Value = BitrateLadder> {
            proptest::collection::btree_set(1u32..20_000, 1..8)
                .prop_map(|set| BitrateLadder::new(set.into_iter().collect()).unwrap())
        }

        proptest! {
            #[test]
            fn test_below_reservoir_is_lowest(
                ladder in ladder_strategy(),
                level in 0.0..=5000.0_f64,
            ) {
                let bb = BufferBased::new(ladder, BbConfig::default());
                prop_assert_eq!(bb.quality_for(level), 0);
            }

            #[test]
            fn test_above_cushion_is_highest(
                ladder in ladder_strategy(),
                level in 15000.0..1_000_000.0_f64,
            ) {
                let top = ladder.top_quality();
                let bb = BufferBased::new(ladder, BbConfig::default());
                prop_assert_eq!(bb.quality_for(level), top);
            }

            #[test]
            fn test_monotonic_in_buffer_level(
                ladder in ladder_strategy(),
                a in 0.0..30000.0_f64,
                b in 0.0..30000.0_f64,
            ) {
                let (low, high) = if a <= b { (a, b) } else { (b, a) };
                let bb = BufferBased::new(ladder, BbConfig::default());
                prop_assert!(
                    bb.quality_for(low) <= bb.quality_for(high),
                    "quality decreased from {} ms to {} ms",
                    low, high
                );
            }
        }
    }
}
