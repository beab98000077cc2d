//! Playback metrics consumed by local algorithms.

use serde::{Deserialize, Serialize};

/// A timestamped scalar sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub value: f64,
    pub timestamp: i64,
}

impl Value {
    pub fn new(value: f64, timestamp: i64) -> Self {
        Self { value, timestamp }
    }
}

/// Metrics reported by the player between two decisions.
///
/// Serialized in the camelCase form the coordinator's metrics endpoint
/// expects (`bufferLevel`, `playerTime`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackMetrics {
    /// Buffered media in milliseconds.
    #[serde(default)]
    pub buffer_level: Vec<Value>,
    /// Playback position in milliseconds.
    #[serde(default)]
    pub player_time: Vec<Value>,
}

impl PlaybackMetrics {
    /// Metrics holding a single buffer level sample.
    pub fn with_buffer_level(level_ms: f64, timestamp: i64) -> Self {
        Self {
            buffer_level: vec![Value::new(level_ms, timestamp)],
            player_time: Vec::new(),
        }
    }
}

/// Tracks the newest buffer level sample seen across metric reports.
///
/// A sample replaces the current one only when its timestamp is strictly
/// newer, so out-of-order reports cannot move the level backwards in time.
#[derive(Debug, Clone, Default)]
pub struct BufferLevelGetter {
    last: Option<Value>,
}

impl BufferLevelGetter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a metrics report into the tracked sample.
    pub fn update(&mut self, metrics: &PlaybackMetrics) {
        for sample in &metrics.buffer_level {
            let newer = self
                .last
                .map_or(true, |last| sample.timestamp > last.timestamp);
            if newer {
                self.last = Some(*sample);
            }
        }
    }

    /// Current buffer level in milliseconds (0 before any sample).
    pub fn value(&self) -> f64 {
        self.last.map_or(0.0, |v| v.value)
    }
}
