//! Session command - run the shim end to end against a live coordinator.
//!
//! Wires the HTTP coordinator client, the reqwest transport, the interceptor
//! and the orchestrator together, then lets a simulated player fetch segments
//! through them. Ctrl+C stops the session early; telemetry is printed either
//! way.

use std::sync::Arc;
use std::time::Duration;

use abrshim::abr::{BbConfig, BitrateLadder, BufferBased};
use abrshim::config::ConfigFile;
use abrshim::coordinator::{CoordinatorConfig, HttpCoordinator};
use abrshim::intercept::{HttpTransport, Interceptor};
use abrshim::orchestrator::{OrchestratorConfig, RequestOrchestrator};
use abrshim::pipeline::DecisionPipeline;
use abrshim::telemetry::ShimMetrics;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CliError;
use crate::player::{PlayerConfig, SimulatedPlayer};

/// Arguments for the session command.
#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Media origin serving `video<q>/<index>.m4s`
    #[arg(long, default_value = "https://media.example.org")]
    pub media_url: String,

    /// Coordinator endpoint (overrides coordinator.url)
    #[arg(long)]
    pub coordinator_url: Option<String>,

    /// Number of segments to play
    #[arg(long, default_value_t = 10)]
    pub segments: u64,

    /// Media duration of one segment in milliseconds
    #[arg(long, default_value_t = 2000.0)]
    pub segment_ms: f64,

    /// Buffer the player refills to, in milliseconds
    #[arg(long, default_value_t = 12000.0)]
    pub target_buffer_ms: f64,

    /// Milliseconds to wait for a coordinator decision before each fetch
    #[arg(long, default_value_t = 500)]
    pub decision_wait_ms: u64,

    /// Segments kept in flight (overrides orchestrator.pool)
    #[arg(long)]
    pub pool: Option<usize>,
}

/// Everything a session needs, resolved from config and arguments.
struct SessionPlan {
    ladder: BitrateLadder,
    bb: BbConfig,
    coordinator: CoordinatorConfig,
    orchestrator: OrchestratorConfig,
    player: PlayerConfig,
    segments: u64,
}

impl SessionPlan {
    fn resolve(config: &ConfigFile, args: SessionArgs) -> Result<Self, CliError> {
        if args.segment_ms <= 0.0 || args.target_buffer_ms < 0.0 {
            return Err(CliError::Config(
                "Segment duration must be positive and target buffer non-negative".to_string(),
            ));
        }

        // CLI takes precedence, then config
        let mut coordinator = config.coordinator_config();
        if let Some(url) = args.coordinator_url {
            coordinator = coordinator.with_url(url);
        }
        let mut orchestrator = config.orchestrator_config();
        if let Some(pool) = args.pool {
            orchestrator = orchestrator.with_pool(pool);
        }

        let player = PlayerConfig {
            media_url: args.media_url,
            segment_ms: args.segment_ms,
            target_buffer_ms: args.target_buffer_ms,
            fetch_timeout: orchestrator.fetch_timeout,
            decision_wait: Duration::from_millis(args.decision_wait_ms),
        };

        Ok(Self {
            ladder: config.ladder()?,
            bb: config.bb_config(),
            coordinator,
            orchestrator,
            player,
            segments: args.segments,
        })
    }
}

/// Run the session command.
pub fn run(config: &ConfigFile, args: SessionArgs) -> Result<(), CliError> {
    let plan = SessionPlan::resolve(config, args)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping session...");
        signal.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(play(plan, shutdown))
}

async fn play(plan: SessionPlan, shutdown: CancellationToken) -> Result<(), CliError> {
    let metrics = Arc::new(ShimMetrics::new());
    let coordinator = HttpCoordinator::new(&plan.coordinator)?;
    let transport = HttpTransport::with_timeout(plan.orchestrator.fetch_timeout)?;

    println!("abrshim session v{}", abrshim::VERSION);
    println!("====================");
    println!();
    println!("Coordinator: {}", coordinator.url());
    println!("Media:       {}", plan.player.media_url);
    println!("Ladder:      {:?} kbps", plan.ladder.as_slice());
    println!("Pool:        {}", plan.orchestrator.pool);
    println!();

    let interceptor =
        Interceptor::with_metrics(Arc::new(transport), plan.ladder.len(), Arc::clone(&metrics));
    let pipeline = Arc::new(DecisionPipeline::new(
        Box::new(BufferBased::new(plan.ladder, plan.bb)),
        Arc::clone(&metrics),
    ));
    let first = plan.orchestrator.start_index;
    let orchestrator = RequestOrchestrator::new(
        Arc::new(coordinator),
        interceptor,
        pipeline,
        plan.orchestrator,
        Arc::clone(&metrics),
    );
    let admission = orchestrator.start()?;

    let mut player = SimulatedPlayer::new(Arc::clone(&orchestrator), plan.player);
    let mut stalls = 0u64;
    for index in first..first + plan.segments {
        let report = tokio::select! {
            _ = shutdown.cancelled() => break,
            report = player.play_segment(index) => report,
        };
        if report.stalled {
            stalls += 1;
        }
        println!("{}", report);
    }

    orchestrator.shutdown();
    let _ = admission.await;
    info!(
        peak_outstanding = orchestrator.peak_outstanding(),
        "Session finished"
    );

    println!();
    println!("Final buffer: {:.0} ms, stalls: {}", player.buffer_ms(), stalls);
    println!("{}", metrics.snapshot());
    Ok(())
}
