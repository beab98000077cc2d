//! Interception engine.
//!
//! The [`Interceptor`] creates every request the player opens and decides, at
//! `send()` time, whether the fetch goes to the network or is held back until
//! an externally obtained payload is substituted into it.
//!
//! # Capture protocol
//!
//! ```text
//! orchestrator                 interceptor                     player
//!     │  intercept(i)               │                            │
//!     │────────────────────────────►│ Unseen → Announced         │
//!     │                             │◄──────── open(GET, url_i) ─│  on_request(i)
//!     │                             │◄──────── send() ───────────│
//!     │                             │ Announced → Captured       │
//!     │  on_intercept(i, resolver)  │                            │
//!     │────────────────────────────►│ Captured → Resolved        │
//!     │                             │── resolver(call) ─────────►│  substitute(payload)
//! ```
//!
//! `on_intercept` may equally arrive before the player's `send()`; the
//! resolver then runs inside `send()`. Either order yields the same event
//! sequence on the player's request.
//!
//! Requests that are not segment fetches, or whose index was never announced,
//! are handed to the [`Transport`] unchanged. A second fetch for an index that
//! is already captured or resolved is treated as a player retry and also goes
//! to the network.
//!
//! Resolvers run outside the state lock, so they may call back into the
//! interceptor.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::request::{RequestContext, RequestHandle, RequestSender, Transport};
use super::state::{
    AttachOutcome, CancelOutcome, CapturedCall, FetchOutcome, Resolver, SegmentPhase,
    SegmentTable,
};
use crate::segment::{is_segment_url, SegmentIndex, SegmentUrl};
use crate::telemetry::ShimMetrics;

/// How far behind the newest opened index retries are still recognised.
pub const RETRY_WINDOW: SegmentIndex = 16;

/// Callback fired the first time the player opens a segment index.
pub type RequestCallback = Arc<dyn Fn(SegmentIndex) + Send + Sync>;

/// Intercepts player fetches and substitutes responses.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Interceptor {
    core: Arc<InterceptorCore>,
}

struct InterceptorCore {
    transport: Arc<dyn Transport>,
    max_rates: usize,
    table: Mutex<SegmentTable>,
    /// Indices already reported through `on_request`.
    opened: Mutex<HashSet<SegmentIndex>>,
    on_request: RwLock<Option<RequestCallback>>,
    metrics: Arc<ShimMetrics>,
    next_id: AtomicU64,
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("max_rates", &self.core.max_rates)
            .finish_non_exhaustive()
    }
}

impl Interceptor {
    /// Create an interceptor for a ladder of `max_rates` qualities.
    pub fn new(transport: Arc<dyn Transport>, max_rates: usize) -> Self {
        Self::with_metrics(transport, max_rates, Arc::new(ShimMetrics::new()))
    }

    /// Create an interceptor that reports into shared metrics.
    pub fn with_metrics(
        transport: Arc<dyn Transport>,
        max_rates: usize,
        metrics: Arc<ShimMetrics>,
    ) -> Self {
        Self {
            core: Arc::new(InterceptorCore {
                transport,
                max_rates,
                table: Mutex::new(SegmentTable::default()),
                opened: Mutex::new(HashSet::new()),
                on_request: RwLock::new(None),
                metrics,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn metrics(&self) -> &Arc<ShimMetrics> {
        &self.core.metrics
    }

    /// Register the callback fired once per newly opened segment index.
    pub fn on_request<F>(&self, callback: F) -> &Self
    where
        F: Fn(SegmentIndex) + Send + Sync + 'static,
    {
        *self.core.on_request.write() = Some(Arc::new(callback));
        self
    }

    /// Announce that the fetch for `index` should be captured.
    ///
    /// Repeated announcements are no-ops.
    pub fn intercept(&self, index: SegmentIndex) -> &Self {
        if self.core.table.lock().announce(index) {
            debug!(index, "Segment announced");
        }
        self
    }

    /// Register how the fetch for `index` is completed.
    ///
    /// Runs `resolver` immediately when the fetch is already captured,
    /// otherwise when it arrives. Resolvers for indices that were never
    /// announced, or that already have one, are dropped with a warning.
    pub fn on_intercept<F>(&self, index: SegmentIndex, resolver: F) -> &Self
    where
        F: FnOnce(CapturedCall) + Send + 'static,
    {
        let outcome = self.core.table.lock().attach(index, Box::new(resolver));
        match outcome {
            AttachOutcome::Pending => info!(index, "Resolver stored until fetch arrives"),
            AttachOutcome::Resolve(resolver, call) => self.core.resolve(resolver, call),
            AttachOutcome::Rejected(phase) => {
                warn!(index, ?phase, "Resolver rejected for segment")
            }
        }
        self
    }

    /// Abandon `index`.
    ///
    /// A captured fetch is released to the network; a bare announcement is
    /// withdrawn so a later fetch passes through. Returns false when nothing
    /// was outstanding.
    pub fn cancel(&self, index: SegmentIndex) -> bool {
        let outcome = self.core.table.lock().cancel(index);
        match outcome {
            CancelOutcome::Idle(phase) => {
                debug!(index, ?phase, "Nothing to cancel");
                false
            }
            CancelOutcome::Withdrawn => {
                info!(index, "Announcement withdrawn");
                true
            }
            CancelOutcome::Release(call) => {
                info!(index, url = %call.url, "Releasing captured fetch to network");
                self.core.passthrough(call.request);
                true
            }
        }
    }

    /// Current phase of `index`.
    pub fn phase(&self, index: SegmentIndex) -> SegmentPhase {
        self.core.table.lock().phase(index)
    }

    /// Open a request on behalf of the player.
    ///
    /// The first open of each segment index fires the `on_request` callback;
    /// later opens of the same index are logged as retries.
    pub fn open(&self, method: &str, url: &str) -> RequestHandle {
        if is_segment_url(url) {
            match SegmentUrl::parse(url, self.core.max_rates).index() {
                Some(index) => self.core.opened(index, url),
                None => warn!(url, "Index not present in segment URL"),
            }
        }

        let id = self.core.next_id.fetch_add(1, Ordering::Relaxed);
        let sender: Arc<dyn RequestSender> = Arc::clone(&self.core) as Arc<dyn RequestSender>;
        RequestContext::new(id, method, url, sender)
    }
}

impl InterceptorCore {
    fn opened(&self, index: SegmentIndex, url: &str) {
        let first = self.opened.lock().insert(index);
        if !first {
            info!(index, url, "Retry on request");
            return;
        }

        debug!(index, url, "Segment opened");
        if let Some(floor) = index.checked_sub(RETRY_WINDOW) {
            self.prune(floor);
        }

        let callback = self.on_request.read().clone();
        if let Some(callback) = callback {
            callback(index);
        }
    }

    /// Drop bookkeeping for indices the player has moved past.
    fn prune(&self, floor: SegmentIndex) {
        self.opened.lock().retain(|&index| index >= floor);
        let pruned = self.table.lock().prune_resolved(floor);
        if pruned > 0 {
            debug!(floor, pruned, "Pruned resolved segments");
        }
    }

    fn passthrough(&self, request: RequestHandle) {
        self.metrics.fetch_passed_through();
        self.transport.transmit(request);
    }

    fn resolve(&self, resolver: Resolver, call: CapturedCall) {
        info!(index = call.index, url = %call.url, "Resolving captured fetch");
        resolver(call);
    }
}

impl RequestSender for InterceptorCore {
    fn send(&self, request: RequestHandle) {
        let url = request.url().to_string();
        if !is_segment_url(&url) {
            return self.passthrough(request);
        }

        let Some(index) = SegmentUrl::parse(&url, self.max_rates).index() else {
            warn!(url = %url, "Unparseable segment URL, forwarding");
            return self.passthrough(request);
        };

        let call = CapturedCall {
            index,
            request: Arc::clone(&request),
            url: url.clone(),
        };
        let outcome = self.table.lock().fetch(call);

        match outcome {
            FetchOutcome::Passthrough => {
                debug!(index, url = %url, "Segment not announced, forwarding");
                self.passthrough(request);
            }
            FetchOutcome::Captured => {
                info!(index, url = %url, "Intercepted");
                self.metrics.fetch_captured();
            }
            FetchOutcome::Resolve(resolver, call) => {
                info!(index, url = %url, "Intercepted with resolver waiting");
                self.metrics.fetch_captured();
                self.resolve(resolver, call);
            }
            FetchOutcome::Retry(phase) => {
                info!(index, url = %url, ?phase, "Retry on intercepted segment, forwarding");
                self.metrics.fetch_retried();
                self.passthrough(request);
            }
        }
    }
}
