//! abrshim - Externally driven quality selection for adaptive video players
//!
//! This library sits between an adaptive video player and the network. Segment
//! fetches issued by the player are intercepted so that the quality of each
//! segment can be decided by an external coordinator instead of the player's
//! built-in heuristic, while the player still observes a normal asynchronous
//! network completion.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────┐
//!                    │ RequestOrchestrator  │──── decision / resource ────► Coordinator
//!                    └──────────┬───────────┘
//!               add_decision    │    intercept / on_intercept
//!          ┌────────────────────┴─────────────────────┐
//!          ▼                                          ▼
//!   DecisionPipeline ◄──── advance(index + 1) ─── Interceptor ◄──── open / send ──── Player
//!          │                                          │
//!          └── fallback: BufferBased                  └── passthrough ──► Transport
//! ```

pub mod abr;
pub mod config;
pub mod coordinator;
pub mod intercept;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod segment;
pub mod telemetry;

/// Library version, as declared in the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
