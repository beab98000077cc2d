//! External coordinator access.
//!
//! Every request is a JSON POST to a single endpoint; the body says whether a
//! decision, a segment payload, or a statistics report is wanted.

mod client;
mod types;

pub use client::{BoxFuture, CoordinatorClient, HttpCoordinator, OnSend};
pub use types::{
    decode_decision, CoordinatorConfig, CoordinatorError, CoordinatorRequest, CoordinatorResult,
    DEFAULT_COORDINATOR_TIMEOUT, DEFAULT_COORDINATOR_URL,
};

#[cfg(test)]
pub(crate) use client::tests::MockCoordinator;
