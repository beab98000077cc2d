//! Simulated adaptive player.
//!
//! Stands in for a real video player: it asks the shim for a quality, opens a
//! segment fetch through the interceptor, and tracks a playout buffer from the
//! time each fetch takes. Playback is paced so the buffer never exceeds its
//! target.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use abrshim::abr::PlaybackMetrics;
use abrshim::orchestrator::RequestOrchestrator;
use abrshim::pipeline::DecisionSource;
use abrshim::segment::{now_millis, QualityLevel, SegmentIndex};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Player pacing and media location.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Media origin; segments live at `<origin>/video<q>/<index>.m4s`.
    pub media_url: String,
    /// Media duration of one segment.
    pub segment_ms: f64,
    /// Buffer level the player refills to before pausing downloads.
    pub target_buffer_ms: f64,
    /// How long to wait for a segment before giving up on it.
    pub fetch_timeout: Duration,
    /// How long to wait for a coordinator decision before fetching anyway.
    pub decision_wait: Duration,
}

/// What happened to one segment fetch.
#[derive(Debug, Clone)]
pub struct SegmentReport {
    pub index: SegmentIndex,
    pub quality: QualityLevel,
    pub source: DecisionSource,
    pub status: u16,
    pub bytes: usize,
    pub elapsed: Duration,
    pub buffer_ms: f64,
    pub stalled: bool,
    pub completed: bool,
}

impl fmt::Display for SegmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            DecisionSource::Coordinator => "coordinator",
            DecisionSource::Fallback => "fallback",
        };
        write!(
            f,
            "segment {:>4}  quality {} ({:<11})  ",
            self.index, self.quality, source
        )?;
        if self.completed {
            write!(f, "{} {:>9} bytes", self.status, self.bytes)?;
        } else {
            write!(f, "timed out      ")?;
        }
        write!(
            f,
            "  {:>6} ms  buffer {:>6.0} ms",
            self.elapsed.as_millis(),
            self.buffer_ms
        )?;
        if self.stalled {
            write!(f, "  STALL")?;
        }
        Ok(())
    }
}

/// Player driving segment fetches through a running orchestrator.
pub struct SimulatedPlayer {
    orchestrator: Arc<RequestOrchestrator>,
    config: PlayerConfig,
    buffer_ms: f64,
}

impl SimulatedPlayer {
    pub fn new(orchestrator: Arc<RequestOrchestrator>, config: PlayerConfig) -> Self {
        Self {
            orchestrator,
            config,
            buffer_ms: 0.0,
        }
    }

    /// Current buffer level in milliseconds.
    pub fn buffer_ms(&self) -> f64 {
        self.buffer_ms
    }

    /// Fetch and "play" one segment.
    pub async fn play_segment(&mut self, index: SegmentIndex) -> SegmentReport {
        self.await_decision(index).await;

        let playback = PlaybackMetrics::with_buffer_level(self.buffer_ms, now_millis());
        let selection = self.orchestrator.select_quality(&playback);
        let url = segment_url(&self.config.media_url, selection.decision.quality, index);

        let started = Instant::now();
        let request = self.orchestrator.interceptor().open("GET", &url);
        let done = Arc::new(Notify::new());
        let signal = Arc::clone(&done);
        request.set_on_load_end(move |_| {
            signal.notify_one();
            Ok(())
        });
        request.send();

        let completed = tokio::time::timeout(self.config.fetch_timeout, done.notified())
            .await
            .is_ok();
        if !completed {
            warn!(index, url = %url, "Segment fetch timed out");
        }

        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let stalled = elapsed_ms > self.buffer_ms && index > self.orchestrator.config().start_index;
        let delivered = if completed { self.config.segment_ms } else { 0.0 };
        self.buffer_ms = next_buffer_level(self.buffer_ms, elapsed_ms, delivered);

        let report = SegmentReport {
            index,
            quality: selection.decision.quality,
            source: selection.source,
            status: request.status(),
            bytes: request.response().len(),
            elapsed,
            buffer_ms: self.buffer_ms,
            stalled,
            completed,
        };

        let _ = self
            .orchestrator
            .report_playback(&PlaybackMetrics::with_buffer_level(self.buffer_ms, now_millis()));

        self.pace().await;
        report
    }

    /// Give the coordinator a short head start on `index`.
    async fn await_decision(&self, index: SegmentIndex) {
        let deadline = Instant::now() + self.config.decision_wait;
        while self.orchestrator.pipeline().decision_for(index).is_none() {
            if Instant::now() >= deadline {
                debug!(index, "No coordinator decision yet");
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Play out media until the buffer is back at its target.
    async fn pace(&mut self) {
        let excess = self.buffer_ms - self.config.target_buffer_ms;
        if excess > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(excess / 1000.0)).await;
            self.buffer_ms = self.config.target_buffer_ms;
        }
    }
}

/// Segment URL for `quality` and `index` under a media origin.
pub fn segment_url(media_url: &str, quality: QualityLevel, index: SegmentIndex) -> String {
    format!(
        "{}/video{}/{}.m4s",
        media_url.trim_end_matches('/'),
        quality,
        index
    )
}

/// Buffer after draining for `elapsed_ms` of playback and adding `delivered_ms`.
pub fn next_buffer_level(buffer_ms: f64, elapsed_ms: f64, delivered_ms: f64) -> f64 {
    (buffer_ms - elapsed_ms).max(0.0) + delivered_ms
}
