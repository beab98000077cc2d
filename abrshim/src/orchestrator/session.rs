//! Request orchestration over a bounded window of segments.
//!
//! The [`RequestOrchestrator`] keeps up to `pool` segment indices outstanding.
//! For each admitted index it runs two flows concurrently:
//!
//! ```text
//!            ┌─ decision flow ── coordinator.decision(i) ── pipeline.add_decision
//!  admit(i) ─┤                                          └── broadcast, admit(i + 1)
//!            └─ resource flow ── coordinator.resource(i) ─┬─ on send: interceptor.intercept(i)
//!                                                         └─ on response: on_intercept(i, substitute)
//!                                                                          └── wait ≤ fetch_timeout
//! ```
//!
//! The next index is admitted only after the current index's decision has
//! arrived, and only while a pool slot is free. The slot belongs to the
//! resource flow and is held until the segment is served to the player, times
//! out, or is abandoned.
//!
//! # Failure handling
//!
//! Coordinator requests are retried under the configured [`RetryPolicy`].
//! Retries stay on the same index. When the resource request is exhausted
//! the index is cancelled in the interceptor, so the player's own fetch
//! reaches the network, and the slot is released. A segment the player never
//! fetches within `fetch_timeout` is cancelled the same way.
//!
//! An exhausted decision request never advances admission. The same index is
//! asked again after `outage_backoff` until a decision arrives or the
//! orchestrator is shut down, so a coordinator outage leaves the window
//! parked instead of running ahead of the player. Indices the player fetched
//! from the network in the meantime are skipped once admission resumes.
//!
//! [`RetryPolicy`]: super::RetryPolicy

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::policy::with_retry;
use super::types::{OrchestratorConfig, OrchestratorError, SegmentOutcome};
use crate::abr::PlaybackMetrics;
use crate::coordinator::CoordinatorClient;
use crate::intercept::{CompletionReport, Interceptor};
use crate::pipeline::{DecisionPipeline, Selection};
use crate::segment::{now_millis, Decision, SegmentIndex};
use crate::telemetry::ShimMetrics;

/// Drives decision and resource requests for successive segments.
pub struct RequestOrchestrator {
    client: Arc<dyn CoordinatorClient>,
    interceptor: Interceptor,
    pipeline: Arc<DecisionPipeline>,
    config: OrchestratorConfig,
    metrics: Arc<ShimMetrics>,
    slots: Arc<Semaphore>,
    outstanding: AtomicUsize,
    peak_outstanding: AtomicUsize,
    decisions: broadcast::Sender<Decision>,
    shutdown: CancellationToken,
    started: AtomicBool,
}

impl std::fmt::Debug for RequestOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOrchestrator")
            .field("config", &self.config)
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

impl RequestOrchestrator {
    pub fn new(
        client: Arc<dyn CoordinatorClient>,
        interceptor: Interceptor,
        pipeline: Arc<DecisionPipeline>,
        config: OrchestratorConfig,
        metrics: Arc<ShimMetrics>,
    ) -> Arc<Self> {
        let (decisions, _) = broadcast::channel(config.decision_channel_capacity.max(1));
        Arc::new(Self {
            client,
            interceptor,
            pipeline,
            slots: Arc::new(Semaphore::new(config.pool)),
            config,
            metrics,
            outstanding: AtomicUsize::new(0),
            peak_outstanding: AtomicUsize::new(0),
            decisions,
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Receive every decision accepted from the coordinator.
    pub fn subscribe_decisions(&self) -> broadcast::Receiver<Decision> {
        self.decisions.subscribe()
    }

    /// Segments currently holding a pool slot.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously outstanding segments so far.
    pub fn peak_outstanding(&self) -> usize {
        self.peak_outstanding.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<DecisionPipeline> {
        &self.pipeline
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Quality for the player's next request.
    pub fn select_quality(&self, metrics: &PlaybackMetrics) -> Selection {
        self.pipeline.select(metrics, now_millis())
    }

    /// Wire the player hook and begin admitting segments.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, OrchestratorError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(OrchestratorError::AlreadyStarted);
        }

        self.pipeline.advance(self.config.start_index);
        let pipeline = Arc::clone(&self.pipeline);
        self.interceptor
            .on_request(move |index| pipeline.advance(index + 1));

        info!(
            pool = self.config.pool,
            start_index = self.config.start_index,
            "Orchestrator started"
        );
        Ok(tokio::spawn(Arc::clone(self).admit()))
    }

    /// Stop admitting new segments. Segments already admitted run to completion.
    pub fn shutdown(&self) {
        info!(outstanding = self.outstanding(), "Orchestrator shutting down");
        self.shutdown.cancel();
    }

    /// Post statistics to the coordinator without waiting for the answer.
    pub fn report_metrics(&self, stats: serde_json::Value) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            if let Err(e) = client.metrics(stats).await {
                metrics.coordinator_failed();
                warn!(error = %e, "Metrics report failed");
            }
        })
    }

    /// Post a playback metrics report.
    pub fn report_playback(&self, playback: &PlaybackMetrics) -> Option<JoinHandle<()>> {
        match serde_json::to_value(playback) {
            Ok(stats) => Some(self.report_metrics(stats)),
            Err(e) => {
                warn!(error = %e, "Failed to serialize playback metrics");
                None
            }
        }
    }

    async fn admit(self: Arc<Self>) {
        let mut index = self.config.start_index;

        loop {
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_outstanding.fetch_max(now, Ordering::SeqCst);
            debug!(index, outstanding = now, "Segment admitted");

            let (decided_tx, decided_rx) = oneshot::channel();
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.run_segment(index, permit, decided_tx).await;
            });

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                decided = decided_rx => {
                    if decided.is_err() {
                        break;
                    }
                }
            }

            let player_next = self.pipeline.next_index();
            if player_next > index + 1 {
                info!(
                    skipped_from = index + 1,
                    resume_at = player_next,
                    "Player moved past the window, resuming at its position"
                );
                index = player_next;
            } else {
                index += 1;
            }
        }

        debug!(next_index = index, "Admission loop stopped");
    }

    async fn run_segment(
        &self,
        index: SegmentIndex,
        permit: OwnedSemaphorePermit,
        decided: oneshot::Sender<()>,
    ) {
        let decision_flow = async move {
            if self.await_decision(index).await {
                let _ = decided.send(());
            }
        };
        let resource_flow = async move {
            let outcome = self.serve_resource(index).await;
            self.finish(index, outcome);
            drop(permit);
        };
        tokio::join!(decision_flow, resource_flow);
    }

    /// Request the decision for `index` until one arrives.
    ///
    /// Returns false if the orchestrator was shut down first.
    async fn await_decision(&self, index: SegmentIndex) -> bool {
        let mut rounds: u32 = 0;
        loop {
            let result = tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                result = self.fetch_decision(index) => result,
            };

            let err = match result {
                Ok(_) => return true,
                Err(e) => e,
            };
            rounds += 1;
            warn!(
                index,
                rounds,
                backoff_ms = self.config.outage_backoff.as_millis() as u64,
                error = %err,
                "No decision for segment, holding admission"
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = tokio::time::sleep(self.config.outage_backoff) => {}
            }
        }
    }

    async fn fetch_decision(&self, index: SegmentIndex) -> Result<Decision, OrchestratorError> {
        let decision = with_retry(&self.config.retry, "decision", index, &self.metrics, || {
            self.client.decision(index)
        })
        .await?;

        if decision.index != index {
            warn!(
                requested = index,
                received = decision.index,
                "Coordinator answered for a different index"
            );
        }

        self.metrics.decision_received();
        self.pipeline.add_decision(decision);
        let _ = self.decisions.send(decision);
        Ok(decision)
    }

    async fn serve_resource(&self, index: SegmentIndex) -> SegmentOutcome {
        let payload = with_retry(&self.config.retry, "resource", index, &self.metrics, || {
            let interceptor = self.interceptor.clone();
            self.client.resource(
                index,
                Box::new(move || {
                    interceptor.intercept(index);
                }),
            )
        })
        .await;

        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                warn!(index, error = %e, "No payload for segment, releasing to network");
                self.interceptor.cancel(index);
                return SegmentOutcome::Abandoned;
            }
        };

        debug!(index, bytes = payload.len(), "Payload received");

        let (served_tx, mut served_rx) = oneshot::channel::<CompletionReport>();
        let metrics = Arc::clone(&self.metrics);
        self.interceptor.on_intercept(index, move |call| {
            let report = call.request.substitute(payload);
            metrics.substitution_completed(report.bytes);
            for _ in 0..report.handler_failures {
                metrics.callback_failed();
            }
            let _ = served_tx.send(report);
        });

        match tokio::time::timeout(self.config.fetch_timeout, &mut served_rx).await {
            Ok(Ok(report)) => SegmentOutcome::Served {
                bytes: report.bytes,
            },
            Ok(Err(_)) => SegmentOutcome::Abandoned,
            Err(_) => {
                if self.interceptor.cancel(index) {
                    SegmentOutcome::TimedOut
                } else {
                    // Resolved between the deadline and the cancel.
                    match served_rx.try_recv() {
                        Ok(report) => SegmentOutcome::Served {
                            bytes: report.bytes,
                        },
                        Err(_) => SegmentOutcome::TimedOut,
                    }
                }
            }
        }
    }

    fn finish(&self, index: SegmentIndex, outcome: SegmentOutcome) {
        let remaining = self.outstanding.fetch_sub(1, Ordering::SeqCst) - 1;
        match outcome {
            SegmentOutcome::Served { bytes } => {
                self.metrics.segment_served();
                info!(index, bytes, outstanding = remaining, "Segment served");
            }
            SegmentOutcome::TimedOut => {
                self.metrics.segment_timed_out();
                let err = OrchestratorError::Timeout {
                    index,
                    after: self.config.fetch_timeout,
                };
                warn!(outstanding = remaining, error = %err, "Segment timed out");
            }
            SegmentOutcome::Abandoned => {
                self.metrics.segment_abandoned();
                let err = OrchestratorError::Abandoned { index };
                warn!(outstanding = remaining, error = %err, "Segment left the pool");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abr::{BbConfig, BitrateLadder, BufferBased};
    use crate::coordinator::MockCoordinator;
    use crate::intercept::engine::tests::RecordingTransport;
    use crate::intercept::{ReadyState, SegmentPhase};
    use crate::orchestrator::RetryPolicy;
    use std::time::Duration;

    struct Harness {
        orchestrator: Arc<RequestOrchestrator>,
        coordinator: Arc<MockCoordinator>,
        interceptor: Interceptor,
        transport: Arc<RecordingTransport>,
        metrics: Arc<ShimMetrics>,
    }

    fn harness(coordinator: MockCoordinator, config: OrchestratorConfig) -> Harness {
        let metrics = Arc::new(ShimMetrics::new());
        let transport = Arc::new(RecordingTransport::default());
        let interceptor = Interceptor::with_metrics(transport.clone(), 3, Arc::clone(&metrics));
        let ladder = BitrateLadder::new(vec![300, 750, 1200]).unwrap();
        let pipeline = Arc::new(DecisionPipeline::new(
            Box::new(BufferBased::new(ladder, BbConfig::default())),
            Arc::clone(&metrics),
        ));
        let coordinator = Arc::new(coordinator);
        let orchestrator = RequestOrchestrator::new(
            coordinator.clone(),
            interceptor.clone(),
            pipeline,
            config,
            Arc::clone(&metrics),
        );
        Harness {
            orchestrator,
            coordinator,
            interceptor,
            transport,
            metrics,
        }
    }

    async fn settle() {
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_pool_is_filled_and_bounded() {
        let h = harness(MockCoordinator::default(), OrchestratorConfig::default());
        let _task = h.orchestrator.start().unwrap();
        settle().await;

        assert_eq!(h.orchestrator.outstanding(), 5);
        assert_eq!(h.orchestrator.peak_outstanding(), 5);
        for index in 1..=5 {
            assert_eq!(h.interceptor.phase(index), SegmentPhase::Announced);
        }
        assert_eq!(h.interceptor.phase(6), SegmentPhase::Unseen);
    }

    #[tokio::test]
    async fn test_serving_frees_a_slot() {
        let h = harness(MockCoordinator::default(), OrchestratorConfig::default());
        let _task = h.orchestrator.start().unwrap();
        settle().await;

        let request = h.interceptor.open("GET", "https://host/video0/1.m4s");
        request.send();
        settle().await;

        assert_eq!(request.ready_state(), ReadyState::Done);
        assert_eq!(&request.response()[..], b"segment-1");
        assert_eq!(h.interceptor.phase(6), SegmentPhase::Announced);
        assert_eq!(h.orchestrator.peak_outstanding(), 5);
        assert_eq!(h.metrics.snapshot().segments_served, 1);
        assert!(h.transport.urls().is_empty());
    }

    #[tokio::test]
    async fn test_decisions_reach_pipeline_and_stream() {
        let coordinator = MockCoordinator::default();
        coordinator.qualities.lock().insert(1, 2);
        let h = harness(coordinator, OrchestratorConfig::default().with_pool(1));
        let mut stream = h.orchestrator.subscribe_decisions();
        let _task = h.orchestrator.start().unwrap();

        let decision = stream.recv().await.unwrap();
        assert_eq!(decision, Decision::new(1, 2, 1000));

        let selection = h.orchestrator.select_quality(&PlaybackMetrics::default());
        assert_eq!(selection.decision.quality, 2);
    }

    #[tokio::test]
    async fn test_player_request_advances_pipeline() {
        let h = harness(MockCoordinator::default(), OrchestratorConfig::default());
        let _task = h.orchestrator.start().unwrap();
        settle().await;

        h.interceptor.open("GET", "https://host/video0/3.m4s");
        assert_eq!(h.orchestrator.pipeline().next_index(), 4);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let h = harness(MockCoordinator::default(), OrchestratorConfig::default());
        let _task = h.orchestrator.start().unwrap();
        assert!(matches!(
            h.orchestrator.start(),
            Err(OrchestratorError::AlreadyStarted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfetched_segment_times_out() {
        let config = OrchestratorConfig::default()
            .with_pool(1)
            .with_fetch_timeout(Duration::from_secs(2));
        let h = harness(MockCoordinator::default(), config);
        let _task = h.orchestrator.start().unwrap();
        settle().await;
        assert_eq!(h.interceptor.phase(1), SegmentPhase::Announced);

        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;

        assert_eq!(h.metrics.snapshot().segments_timed_out, 1);
        assert_eq!(h.interceptor.phase(1), SegmentPhase::Unseen);
        assert_eq!(h.interceptor.phase(2), SegmentPhase::Announced);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_resource_releases_fetch() {
        let coordinator = MockCoordinator {
            fail_resources: true,
            ..Default::default()
        };
        let config = OrchestratorConfig::default()
            .with_pool(1)
            .with_retry(RetryPolicy::fixed(2, Duration::from_millis(10)));
        let h = harness(coordinator, config);
        let _task = h.orchestrator.start().unwrap();
        settle().await;

        // Player fetch arrives while the resource request is still retrying.
        h.interceptor.open("GET", "https://host/video0/1.m4s").send();
        assert!(h.transport.urls().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        settle().await;

        assert_eq!(h.transport.urls(), vec!["https://host/video0/1.m4s"]);
        let snapshot = h.metrics.snapshot();
        assert!(snapshot.segments_abandoned >= 1);
        assert!(snapshot.coordinator_failures >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_retry_stays_on_index() {
        let coordinator = MockCoordinator {
            fail_decisions: 1,
            ..Default::default()
        };
        let config = OrchestratorConfig::default()
            .with_pool(2)
            .with_retry(RetryPolicy::fixed(3, Duration::from_millis(10)));
        let h = harness(coordinator, config);
        let mut stream = h.orchestrator.subscribe_decisions();
        let _task = h.orchestrator.start().unwrap();

        let first = stream.recv().await.unwrap();
        let second = stream.recv().await.unwrap();
        assert_eq!((first.index, second.index), (1, 2));
        assert_eq!(h.metrics.snapshot().coordinator_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_outage_holds_admission() {
        let coordinator = MockCoordinator {
            fail_decisions: usize::MAX,
            fail_resources: true,
            ..Default::default()
        };
        let config = OrchestratorConfig::default();
        let window_end = config.start_index + config.pool as SegmentIndex - 1;
        let h = harness(coordinator, config);
        let _task = h.orchestrator.start().unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;

        let highest = h
            .coordinator
            .decision_attempts
            .lock()
            .keys()
            .copied()
            .max()
            .unwrap();
        assert!(highest <= window_end, "admitted up to {highest}");
        assert_eq!(highest, 1);
        assert_eq!(h.interceptor.phase(2), SegmentPhase::Unseen);

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.segments_abandoned, 1);
        assert_eq!(snapshot.decisions_received, 0);
        assert_eq!(h.orchestrator.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_resumes_after_outage() {
        let coordinator = MockCoordinator {
            fail_decisions: 4,
            ..Default::default()
        };
        let config = OrchestratorConfig::default()
            .with_pool(2)
            .with_retry(RetryPolicy::fixed(2, Duration::from_millis(10)))
            .with_outage_backoff(Duration::from_millis(100));
        let h = harness(coordinator, config);
        let mut stream = h.orchestrator.subscribe_decisions();
        let _task = h.orchestrator.start().unwrap();

        // Two rounds of two attempts have failed; the third round is pending.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.coordinator.decision_attempts.lock().get(&1), Some(&4));
        assert_eq!(h.interceptor.phase(1), SegmentPhase::Announced);
        assert_eq!(h.interceptor.phase(2), SegmentPhase::Unseen);

        let first = stream.recv().await.unwrap();
        assert_eq!(first.index, 1);
        settle().await;
        assert_eq!(h.interceptor.phase(2), SegmentPhase::Announced);
    }

    #[tokio::test]
    async fn test_shutdown_stops_admission() {
        let h = harness(MockCoordinator::default(), OrchestratorConfig::default().with_pool(1));
        let task = h.orchestrator.start().unwrap();
        settle().await;

        h.orchestrator.shutdown();
        task.await.unwrap();

        h.interceptor.open("GET", "https://host/video0/1.m4s").send();
        settle().await;
        assert_eq!(h.interceptor.phase(2), SegmentPhase::Unseen);
    }

    #[tokio::test]
    async fn test_report_metrics_is_fire_and_forget() {
        let coordinator = Arc::new(MockCoordinator::default());
        let metrics = Arc::new(ShimMetrics::new());
        let transport = Arc::new(RecordingTransport::default());
        let interceptor = Interceptor::new(transport, 3);
        let ladder = BitrateLadder::new(vec![300]).unwrap();
        let pipeline = Arc::new(DecisionPipeline::new(
            Box::new(BufferBased::new(ladder, BbConfig::default())),
            Arc::clone(&metrics),
        ));
        let orchestrator = RequestOrchestrator::new(
            coordinator.clone(),
            interceptor,
            pipeline,
            OrchestratorConfig::default(),
            metrics,
        );

        orchestrator
            .report_playback(&PlaybackMetrics::with_buffer_level(1000.0, 1))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(
            coordinator
                .metrics_posted
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }
}
