//! Per-index interception state.
//!
//! ```text
//!             intercept(i)              player fetch
//!   Unseen ───────────────► Announced ───────────────► Captured
//!                               │                         │
//!                               │ on_intercept(i)         │ on_intercept(i)
//!                               ▼                         ▼
//!                      (resolver stored) ──fetch──►   Resolved
//! ```
//!
//! An absent entry is `Unseen`. Resolution is reachable only through
//! `Announced`, and a resolver leaves the table exactly once.

use std::collections::HashMap;
use std::fmt;

use super::request::RequestHandle;
use crate::segment::SegmentIndex;

/// Callback that completes a captured fetch.
pub type Resolver = Box<dyn FnOnce(CapturedCall) + Send>;

/// A player fetch held back by the interceptor.
#[derive(Clone)]
pub struct CapturedCall {
    pub index: SegmentIndex,
    pub request: RequestHandle,
    pub url: String,
}

impl fmt::Debug for CapturedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedCall")
            .field("index", &self.index)
            .field("request", &self.request.id())
            .field("url", &self.url)
            .finish()
    }
}

/// Observable phase of a segment index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentPhase {
    Unseen,
    Announced,
    Captured,
    Resolved,
}

enum SegmentState {
    Announced { resolver: Option<Resolver> },
    Captured { call: CapturedCall },
    Resolved,
}

impl SegmentState {
    fn phase(&self) -> SegmentPhase {
        match self {
            SegmentState::Announced { .. } => SegmentPhase::Announced,
            SegmentState::Captured { .. } => SegmentPhase::Captured,
            SegmentState::Resolved => SegmentPhase::Resolved,
        }
    }
}

/// What to do with a player fetch.
pub(crate) enum FetchOutcome {
    /// Not announced: send to the network.
    Passthrough,
    /// Held until a resolver arrives.
    Captured,
    /// A resolver was waiting; run it now.
    Resolve(Resolver, CapturedCall),
    /// Index already captured or resolved: send to the network.
    Retry(SegmentPhase),
}

/// Result of registering a resolver.
pub(crate) enum AttachOutcome {
    /// Stored until the fetch arrives.
    Pending,
    /// The fetch was already captured; run it now.
    Resolve(Resolver, CapturedCall),
    /// Not accepted in the current phase.
    Rejected(SegmentPhase),
}

/// Result of abandoning an index.
pub(crate) enum CancelOutcome {
    /// Nothing outstanding for the index.
    Idle(SegmentPhase),
    /// The announcement was withdrawn before any fetch.
    Withdrawn,
    /// A captured fetch must be handed to the network.
    Release(CapturedCall),
}

/// Interception state for every index seen so far.
#[derive(Default)]
pub(crate) struct SegmentTable {
    entries: HashMap<SegmentIndex, SegmentState>,
}

impl SegmentTable {
    pub fn phase(&self, index: SegmentIndex) -> SegmentPhase {
        self.entries
            .get(&index)
            .map_or(SegmentPhase::Unseen, SegmentState::phase)
    }

    /// Mark an index as expected. Returns false if it was already tracked.
    pub fn announce(&mut self, index: SegmentIndex) -> bool {
        if self.entries.contains_key(&index) {
            return false;
        }
        self.entries
            .insert(index, SegmentState::Announced { resolver: None });
        true
    }

    /// Apply a player fetch for `index`.
    pub fn fetch(&mut self, call: CapturedCall) -> FetchOutcome {
        let index = call.index;
        match self.entries.remove(&index) {
            None => FetchOutcome::Passthrough,
            Some(SegmentState::Announced { resolver: None }) => {
                self.entries.insert(index, SegmentState::Captured { call });
                FetchOutcome::Captured
            }
            Some(SegmentState::Announced {
                resolver: Some(resolver),
            }) => {
                self.entries.insert(index, SegmentState::Resolved);
                FetchOutcome::Resolve(resolver, call)
            }
            Some(state) => {
                let phase = state.phase();
                self.entries.insert(index, state);
                FetchOutcome::Retry(phase)
            }
        }
    }

    /// Register the resolver for `index`.
    pub fn attach(&mut self, index: SegmentIndex, resolver: Resolver) -> AttachOutcome {
        match self.entries.remove(&index) {
            None => AttachOutcome::Rejected(SegmentPhase::Unseen),
            Some(SegmentState::Announced { resolver: None }) => {
                self.entries.insert(
                    index,
                    SegmentState::Announced {
                        resolver: Some(resolver),
                    },
                );
                AttachOutcome::Pending
            }
            Some(SegmentState::Captured { call }) => {
                self.entries.insert(index, SegmentState::Resolved);
                AttachOutcome::Resolve(resolver, call)
            }
            Some(state) => {
                let phase = state.phase();
                self.entries.insert(index, state);
                AttachOutcome::Rejected(phase)
            }
        }
    }

    /// Abandon `index`, returning any captured fetch to the caller.
    pub fn cancel(&mut self, index: SegmentIndex) -> CancelOutcome {
        match self.entries.remove(&index) {
            None => CancelOutcome::Idle(SegmentPhase::Unseen),
            Some(SegmentState::Announced { .. }) => CancelOutcome::Withdrawn,
            Some(SegmentState::Captured { call }) => CancelOutcome::Release(call),
            Some(SegmentState::Resolved) => {
                self.entries.insert(index, SegmentState::Resolved);
                CancelOutcome::Idle(SegmentPhase::Resolved)
            }
        }
    }

    /// Forget resolved indices below `floor`. Pending entries are kept.
    pub fn prune_resolved(&mut self, floor: SegmentIndex) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|&index, state| index >= floor || !matches!(state, SegmentState::Resolved));
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::request::tests::RecordingSender;
    use crate::intercept::request::RequestContext;
    use std::sync::Arc;

    fn call(index: SegmentIndex) -> CapturedCall {
        let url = format!("https://host/video1/{index}.m4s");
        CapturedCall {
            index,
            request: RequestContext::new(index, "GET", url.clone(), Arc::new(RecordingSender::default())),
            url,
        }
    }

    fn noop() -> Resolver {
        Box::new(|_| {})
    }

    #[test]
    fn test_unseen_fetch_passes_through() {
        let mut table = SegmentTable::default();
        assert!(matches!(
            table.fetch(call(1)),
            FetchOutcome::Passthrough
        ));
        assert_eq!(table.phase(1), SegmentPhase::Unseen);
    }

    #[test]
    fn test_announce_is_idempotent() {
        let mut table = SegmentTable::default();
        assert!(table.announce(1));
        assert!(!table.announce(1));
        assert_eq!(table.phase(1), SegmentPhase::Announced);
    }

    #[test]
    fn test_fetch_then_attach_resolves() {
        let mut table = SegmentTable::default();
        table.announce(2);

        assert!(matches!(
            table.fetch(call(2)),
            FetchOutcome::Captured
        ));
        assert_eq!(table.phase(2), SegmentPhase::Captured);

        match table.attach(2, noop()) {
            AttachOutcome::Resolve(_, call) => assert_eq!(call.index, 2),
            _ => panic!("expected resolve"),
        }
        assert_eq!(table.phase(2), SegmentPhase::Resolved);
    }

    #[test]
    fn test_attach_then_fetch_resolves() {
        let mut table = SegmentTable::default();
        table.announce(2);

        assert!(matches!(table.attach(2, noop()), AttachOutcome::Pending));
        assert_eq!(table.phase(2), SegmentPhase::Announced);

        assert!(matches!(
            table.fetch(call(2)),
            FetchOutcome::Resolve(..)
        ));
        assert_eq!(table.phase(2), SegmentPhase::Resolved);
    }

    #[test]
    fn test_second_fetch_is_retry() {
        let mut table = SegmentTable::default();
        table.announce(3);
        table.fetch(call(3));

        assert!(matches!(
            table.fetch(call(3)),
            FetchOutcome::Retry(SegmentPhase::Captured)
        ));

        table.attach(3, noop());
        assert!(matches!(
            table.fetch(call(3)),
            FetchOutcome::Retry(SegmentPhase::Resolved)
        ));
    }

    #[test]
    fn test_attach_rejected_when_unseen_or_duplicate() {
        let mut table = SegmentTable::default();
        assert!(matches!(
            table.attach(4, noop()),
            AttachOutcome::Rejected(SegmentPhase::Unseen)
        ));

        table.announce(4);
        table.attach(4, noop());
        assert!(matches!(
            table.attach(4, noop()),
            AttachOutcome::Rejected(SegmentPhase::Announced)
        ));
    }

    #[test]
    fn test_cancel_transitions() {
        let mut table = SegmentTable::default();
        assert!(matches!(table.cancel(1), CancelOutcome::Idle(SegmentPhase::Unseen)));

        table.announce(1);
        assert!(matches!(table.cancel(1), CancelOutcome::Withdrawn));
        assert_eq!(table.phase(1), SegmentPhase::Unseen);

        table.announce(2);
        table.fetch(call(2));
        assert!(matches!(table.cancel(2), CancelOutcome::Release(_)));
        assert_eq!(table.phase(2), SegmentPhase::Unseen);

        table.announce(3);
        table.attach(3, noop());
        table.fetch(call(3));
        assert!(matches!(
            table.cancel(3),
            CancelOutcome::Idle(SegmentPhase::Resolved)
        ));
        assert_eq!(table.phase(3), SegmentPhase::Resolved);
    }

    #[test]
    fn test_prune_keeps_pending_entries() {
        let mut table = SegmentTable::default();
        for index in 1..=4 {
            table.announce(index);
        }
        table.attach(1, noop());
        table.fetch(call(1));
        table.fetch(call(2));
        table.attach(4, noop());
        table.fetch(call(4));

        assert_eq!(table.prune_resolved(4), 1);
        assert_eq!(table.phase(1), SegmentPhase::Unseen);
        assert_eq!(table.phase(2), SegmentPhase::Captured);
        assert_eq!(table.phase(3), SegmentPhase::Announced);
        assert_eq!(table.phase(4), SegmentPhase::Resolved);
    }
}
