//! Decision pipeline.
//!
//! Correlates segment indices with externally supplied quality decisions and
//! tracks the index the player will request next.
//!
//! # Flow
//!
//! ```text
//! Orchestrator ── add_decision(d) ──► decisions[d.index]
//! Interceptor  ── advance(n + 1)  ──► next_index
//! Player ABR   ── select(metrics) ──► decisions[next_index]  or  fallback.decide(..)
//! ```
//!
//! Decisions are accepted last-write-wins in arrival order. A decision for an
//! index the player has already moved past is kept but logged, since nothing
//! validates it against the playback position.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::abr::{AbrAlgorithm, PlaybackMetrics};
use crate::segment::{Decision, SegmentIndex};
use crate::telemetry::ShimMetrics;

/// Where a selected decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// Supplied by the coordinator.
    Coordinator,
    /// Computed locally by the fallback algorithm.
    Fallback,
}

/// A decision together with its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub decision: Decision,
    pub source: DecisionSource,
}

#[derive(Debug, Default)]
struct PipelineInner {
    decisions: HashMap<SegmentIndex, Decision>,
    next_index: SegmentIndex,
}

/// Holds the latest decision per segment and the player's request pointer.
///
/// Safe to receive decisions and advances in any order.
pub struct DecisionPipeline {
    inner: Mutex<PipelineInner>,
    fallback: Mutex<Box<dyn AbrAlgorithm>>,
    metrics: Arc<ShimMetrics>,
}

impl std::fmt::Debug for DecisionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionPipeline")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl DecisionPipeline {
    /// Create a pipeline with a fallback algorithm.
    pub fn new(fallback: Box<dyn AbrAlgorithm>, metrics: Arc<ShimMetrics>) -> Self {
        Self {
            inner: Mutex::new(PipelineInner::default()),
            fallback: Mutex::new(fallback),
            metrics,
        }
    }

    /// Record a decision, replacing any unconsumed entry for the same index.
    pub fn add_decision(&self, decision: Decision) {
        let mut inner = self.inner.lock();

        if decision.index < inner.next_index {
            warn!(
                index = decision.index,
                next_index = inner.next_index,
                "Decision arrived for an index the player has passed"
            );
        }

        if let Some(previous) = inner.decisions.insert(decision.index, decision) {
            debug!(
                index = decision.index,
                previous = previous.quality,
                quality = decision.quality,
                "Replaced pending decision"
            );
        } else {
            info!(
                index = decision.index,
                quality = decision.quality,
                "Decision added"
            );
        }
    }

    /// Signal that the player's next request will target `next_index`.
    ///
    /// Decisions for indices below the new pointer are dropped.
    pub fn advance(&self, next_index: SegmentIndex) {
        let mut inner = self.inner.lock();
        if next_index < inner.next_index {
            debug!(
                next_index,
                current = inner.next_index,
                "Ignoring backwards advance"
            );
            return;
        }
        inner.next_index = next_index;
        inner.decisions.retain(|&index, _| index >= next_index);
        debug!(next_index, "Pipeline advanced");
    }

    /// Index the player will request next.
    pub fn next_index(&self) -> SegmentIndex {
        self.inner.lock().next_index
    }

    /// Decision stored for `index`, if any.
    pub fn decision_for(&self, index: SegmentIndex) -> Option<Decision> {
        self.inner.lock().decisions.get(&index).copied()
    }

    /// Number of stored decisions.
    pub fn pending(&self) -> usize {
        self.inner.lock().decisions.len()
    }

    /// Choose the quality for the player's next request.
    ///
    /// Uses the coordinator's decision when one exists for the current
    /// pointer; otherwise asks the fallback algorithm rather than blocking.
    pub fn select(&self, metrics: &PlaybackMetrics, timestamp: i64) -> Selection {
        let index = {
            let inner = self.inner.lock();
            if let Some(decision) = inner.decisions.get(&inner.next_index) {
                return Selection {
                    decision: *decision,
                    source: DecisionSource::Coordinator,
                };
            }
            inner.next_index
        };

        let mut fallback = self.fallback.lock();
        let decision = fallback.decide(metrics, index, timestamp);
        self.metrics.fallback_decision();
        debug!(
            index,
            quality = decision.quality,
            algorithm = fallback.name(),
            "No coordinator decision, using fallback"
        );

        Selection {
            decision,
            source: DecisionSource::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abr::{BbConfig, BitrateLadder, BufferBased};

    fn pipeline() -> (DecisionPipeline, Arc<ShimMetrics>) {
        let ladder = BitrateLadder::new(vec![300, 750, 1200]).unwrap();
        let metrics = Arc::new(ShimMetrics::new());
        let bb = BufferBased::new(ladder, BbConfig::default());
        (DecisionPipeline::new(Box::new(bb), Arc::clone(&metrics)), metrics)
    }

    #[test]
    fn test_select_prefers_coordinator_decision() {
        let (pipeline, metrics) = pipeline();
        pipeline.advance(3);
        pipeline.add_decision(Decision::new(3, 1, 10));

        let selection = pipeline.select(&PlaybackMetrics::with_buffer_level(20000.0, 1), 11);

        assert_eq!(selection.source, DecisionSource::Coordinator);
        assert_eq!(selection.decision, Decision::new(3, 1, 10));
        assert_eq!(metrics.snapshot().fallback_decisions, 0);
    }

    #[test]
    fn test_select_falls_back_to_bb() {
        let (pipeline, metrics) = pipeline();
        pipeline.advance(3);
        pipeline.add_decision(Decision::new(4, 0, 10));

        let selection = pipeline.select(&PlaybackMetrics::with_buffer_level(20000.0, 1), 11);

        assert_eq!(selection.source, DecisionSource::Fallback);
        assert_eq!(selection.decision, Decision::new(3, 2, 11));
        assert_eq!(metrics.snapshot().fallback_decisions, 1);
    }

    #[test]
    fn test_last_write_wins() {
        let (pipeline, _) = pipeline();
        pipeline.add_decision(Decision::new(5, 0, 1));
        pipeline.add_decision(Decision::new(5, 2, 2));
        assert_eq!(pipeline.decision_for(5), Some(Decision::new(5, 2, 2)));
        assert_eq!(pipeline.pending(), 1);
    }

    #[test]
    fn test_decision_before_advance_is_used() {
        let (pipeline, _) = pipeline();
        pipeline.add_decision(Decision::new(2, 1, 1));
        pipeline.advance(2);
        let selection = pipeline.select(&PlaybackMetrics::default(), 5);
        assert_eq!(selection.source, DecisionSource::Coordinator);
        assert_eq!(selection.decision.quality, 1);
    }

    #[test]
    fn test_advance_drops_passed_decisions() {
        let (pipeline, _) = pipeline();
        pipeline.add_decision(Decision::new(1, 1, 1));
        pipeline.add_decision(Decision::new(2, 1, 1));
        pipeline.add_decision(Decision::new(3, 1, 1));

        pipeline.advance(3);

        assert_eq!(pipeline.next_index(), 3);
        assert_eq!(pipeline.decision_for(1), None);
        assert_eq!(pipeline.decision_for(2), None);
        assert!(pipeline.decision_for(3).is_some());
    }

    #[test]
    fn test_advance_never_moves_backwards() {
        let (pipeline, _) = pipeline();
        pipeline.advance(6);
        pipeline.advance(4);
        assert_eq!(pipeline.next_index(), 6);
    }

    #[test]
    fn test_stale_decision_is_kept() {
        let (pipeline, _) = pipeline();
        pipeline.advance(6);
        pipeline.add_decision(Decision::new(2, 1, 1));
        assert_eq!(pipeline.decision_for(2), Some(Decision::new(2, 1, 1)));
    }
}
