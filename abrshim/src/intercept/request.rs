//! Emulated asynchronous network request.
//!
//! [`RequestContext`] is the object the player holds while a fetch is in
//! flight. It exposes the completion fields and event handlers a browser
//! network request exposes (`readyState`, `status`, `response`, `onprogress`,
//! `onload`, `onloadend`, `onerror`), and it can be completed either by a real
//! transport or by replaying a substitute payload.
//!
//! # Completion sequence
//!
//! Both completion paths produce the same observable sequence:
//!
//! ```text
//! readyState = LOADING (3)  ──► progress
//! response fields written, readyState = DONE (4)
//!                           ──► progress (lengthComputable, loaded, total)
//!                           ──► load
//!                           ──► loadend
//! ```
//!
//! Substituted completions mark every event with `no_trace` so downstream
//! metrics can tell them apart from real network progress.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Shared handle to a request context.
pub type RequestHandle = Arc<RequestContext>;

/// Result returned by player event handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// A player event handler.
pub type EventHandler = Arc<dyn Fn(&ProgressEvent) -> HandlerResult + Send + Sync>;

/// Failure raised by a player event handler.
///
/// Handler failures are logged at the dispatch site and never abort the
/// remaining events of a completion sequence.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Readiness state of a request, with the numeric codes players expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ReadyState {
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

impl ReadyState {
    /// Numeric readiness code.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// How the response body should be interpreted by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    #[default]
    Text,
    /// Raw binary.
    ArrayBuffer,
}

/// Which handler an event is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Progress,
    Load,
    LoadEnd,
    Error,
}

/// Event delivered to player handlers.
///
/// `target`, `src_element` and `current_target` all reference the request the
/// event belongs to, and `trusted` is always set, matching what native
/// network events expose.
#[derive(Clone)]
pub struct ProgressEvent {
    pub kind: EventKind,
    pub length_computable: bool,
    pub loaded: u64,
    pub total: u64,
    /// Set on synthesized events so metrics can filter them out.
    pub no_trace: bool,
    pub target: RequestHandle,
    pub src_element: RequestHandle,
    pub current_target: RequestHandle,
    pub trusted: bool,
}

impl fmt::Debug for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressEvent")
            .field("kind", &self.kind)
            .field("length_computable", &self.length_computable)
            .field("loaded", &self.loaded)
            .field("total", &self.total)
            .field("no_trace", &self.no_trace)
            .field("target", &self.target.id())
            .field("trusted", &self.trusted)
            .finish()
    }
}

/// Event fields that vary between dispatches.
#[derive(Debug, Clone, Copy, Default)]
struct EventInit {
    length_computable: bool,
    loaded: u64,
    total: u64,
    no_trace: bool,
}

/// Outcome of a completion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionReport {
    /// Size of the response body.
    pub bytes: u64,
    /// Handlers that returned an error or panicked.
    pub handler_failures: usize,
}

/// Entry point for `send()`: decides where a request goes.
///
/// Implemented by the interceptor; the context only forwards to it.
pub trait RequestSender: Send + Sync {
    fn send(&self, request: RequestHandle);
}

/// The real network.
///
/// Implementations perform the fetch and complete the request through
/// [`RequestContext::complete`] or [`RequestContext::fail`].
pub trait Transport: Send + Sync {
    fn transmit(&self, request: RequestHandle);
}

#[derive(Debug, Clone)]
struct ResponseState {
    ready_state: ReadyState,
    status: u16,
    status_text: String,
    response_url: String,
    response: Bytes,
    response_type: ResponseType,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            ready_state: ReadyState::Opened,
            status: 0,
            status_text: String::new(),
            response_url: String::new(),
            response: Bytes::new(),
            response_type: ResponseType::default(),
        }
    }
}

#[derive(Default, Clone)]
struct Handlers {
    on_progress: Option<EventHandler>,
    on_load: Option<EventHandler>,
    on_load_end: Option<EventHandler>,
    on_error: Option<EventHandler>,
}

impl Handlers {
    fn get(&self, kind: EventKind) -> Option<EventHandler> {
        match kind {
            EventKind::Progress => self.on_progress.clone(),
            EventKind::Load => self.on_load.clone(),
            EventKind::LoadEnd => self.on_load_end.clone(),
            EventKind::Error => self.on_error.clone(),
        }
    }
}

/// An opened network request.
pub struct RequestContext {
    id: u64,
    method: String,
    url: String,
    state: Mutex<ResponseState>,
    handlers: Mutex<Handlers>,
    sender: Arc<dyn RequestSender>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    /// Create an opened request that sends through `sender`.
    pub fn new(
        id: u64,
        method: impl Into<String>,
        url: impl Into<String>,
        sender: Arc<dyn RequestSender>,
    ) -> RequestHandle {
        Arc::new(Self {
            id,
            method: method.into(),
            url: url.into(),
            state: Mutex::new(ResponseState::default()),
            handlers: Mutex::new(Handlers::default()),
            sender,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// URL passed to `open`.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    pub fn status(&self) -> u16 {
        self.state.lock().status
    }

    pub fn status_text(&self) -> String {
        self.state.lock().status_text.clone()
    }

    pub fn response_url(&self) -> String {
        self.state.lock().response_url.clone()
    }

    pub fn response(&self) -> Bytes {
        self.state.lock().response.clone()
    }

    pub fn response_type(&self) -> ResponseType {
        self.state.lock().response_type
    }

    pub fn set_response_type(&self, response_type: ResponseType) {
        self.state.lock().response_type = response_type;
    }

    pub fn set_on_progress<F>(&self, handler: F)
    where
        F: Fn(&ProgressEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.lock().on_progress = Some(Arc::new(handler));
    }

    pub fn set_on_load<F>(&self, handler: F)
    where
        F: Fn(&ProgressEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.lock().on_load = Some(Arc::new(handler));
    }

    pub fn set_on_load_end<F>(&self, handler: F)
    where
        F: Fn(&ProgressEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.lock().on_load_end = Some(Arc::new(handler));
    }

    pub fn set_on_error<F>(&self, handler: F)
    where
        F: Fn(&ProgressEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.lock().on_error = Some(Arc::new(handler));
    }

    /// Send the request.
    ///
    /// The interceptor decides whether it reaches the network.
    pub fn send(self: &Arc<Self>) {
        self.sender.send(Arc::clone(self));
    }

    /// Replay a substitute payload as if it had arrived from the network.
    ///
    /// Runs the full completion sequence synchronously with status 200,
    /// a binary response type and the originally requested URL. Every event
    /// carries the `no_trace` marker.
    pub fn substitute(self: &Arc<Self>, payload: Bytes) -> CompletionReport {
        self.set_response_type(ResponseType::ArrayBuffer);
        self.replay(200, "OK", payload, true)
    }

    /// Complete with a response received from the real network.
    pub fn complete(
        self: &Arc<Self>,
        status: u16,
        status_text: &str,
        body: Bytes,
    ) -> CompletionReport {
        self.replay(status, status_text, body, false)
    }

    /// Complete with a transport failure: `error` then `loadend`.
    pub fn fail(self: &Arc<Self>) -> CompletionReport {
        {
            let mut state = self.state.lock();
            state.ready_state = ReadyState::Done;
            state.status = 0;
            state.status_text.clear();
        }

        let mut report = CompletionReport::default();
        for kind in [EventKind::Error, EventKind::LoadEnd] {
            if !self.dispatch(kind, EventInit::default()) {
                report.handler_failures += 1;
            }
        }
        report
    }

    fn replay(
        self: &Arc<Self>,
        status: u16,
        status_text: &str,
        body: Bytes,
        no_trace: bool,
    ) -> CompletionReport {
        let mut report = CompletionReport {
            bytes: body.len() as u64,
            handler_failures: 0,
        };

        self.state.lock().ready_state = ReadyState::Loading;
        if !self.dispatch(
            EventKind::Progress,
            EventInit {
                no_trace,
                ..Default::default()
            },
        ) {
            report.handler_failures += 1;
        }

        {
            let mut state = self.state.lock();
            state.response_url = self.url.clone();
            state.response = body;
            state.ready_state = ReadyState::Done;
            state.status = status;
            state.status_text = status_text.to_string();
        }
        debug!(id = self.id, url = %self.url, status, bytes = report.bytes, no_trace, "Response written");

        let sized = EventInit {
            length_computable: true,
            loaded: report.bytes,
            total: report.bytes,
            no_trace,
        };
        for (kind, init) in [
            (EventKind::Progress, sized),
            (EventKind::Load, sized),
            (EventKind::LoadEnd, sized),
        ] {
            if !self.dispatch(kind, init) {
                report.handler_failures += 1;
            }
        }

        report
    }

    /// Deliver one event. Returns false if the handler failed.
    fn dispatch(self: &Arc<Self>, kind: EventKind, init: EventInit) -> bool {
        // Clone the handler out so it may touch this request without deadlocking.
        let handler = self.handlers.lock().get(kind);
        let Some(handler) = handler else {
            return true;
        };

        let event = ProgressEvent {
            kind,
            length_computable: init.length_computable,
            loaded: init.loaded,
            total: init.total,
            no_trace: init.no_trace,
            target: Arc::clone(self),
            src_element: Arc::clone(self),
            current_target: Arc::clone(self),
            trusted: true,
        };

        execute_callback(&handler, &event)
    }
}

/// Run a handler, containing both returned errors and panics.
fn execute_callback(handler: &EventHandler, event: &ProgressEvent) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(kind = ?event.kind, url = %event.target.url(), error = %e, "Exception in event handler");
            false
        }
        Err(_) => {
            warn!(kind = ?event.kind, url = %event.target.url(), "Event handler panicked");
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Sender that records every request handed to it.
    #[derive(Default)]
    pub struct RecordingSender {
        pub sent: Mutex<Vec<RequestHandle>>,
    }

    impl RequestSender for RecordingSender {
        fn send(&self, request: RequestHandle) {
            self.sent.lock().push(request);
        }
    }

    /// Install handlers that append `(kind, ready_state, no_trace, loaded)` to a log.
    pub fn record_events(
        request: &RequestHandle,
    ) -> Arc<Mutex<Vec<(EventKind, ReadyState, bool, u64)>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = |log: Arc<Mutex<Vec<_>>>| {
            move |event: &ProgressEvent| -> HandlerResult {
                log.lock().push((
                    event.kind,
                    event.target.ready_state(),
                    event.no_trace,
                    event.loaded,
                ));
                Ok(())
            }
        };
        request.set_on_progress(make(Arc::clone(&log)));
        request.set_on_load(make(Arc::clone(&log)));
        request.set_on_load_end(make(Arc::clone(&log)));
        request.set_on_error(make(Arc::clone(&log)));
        log
    }

    fn request(url: &str) -> RequestHandle {
        RequestContext::new(1, "GET", url, Arc::new(RecordingSender::default()))
    }

    #[test]
    fn test_new_request_is_opened() {
        let request = request("https://host/video1/2.m4s");
        assert_eq!(request.ready_state(), ReadyState::Opened);
        assert_eq!(request.ready_state().code(), 1);
        assert_eq!(request.status(), 0);
        assert!(request.response().is_empty());
    }

    #[test]
    fn test_send_goes_through_sender() {
        let sender = Arc::new(RecordingSender::default());
        let request = RequestContext::new(9, "GET", "https://host/x", sender.clone());
        request.send();
        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id(), 9);
    }

    #[test]
    fn test_substitute_sequence() {
        let request = request("https://host/video1/2.m4s");
        let log = record_events(&request);

        let report = request.substitute(Bytes::from_static(b"segment"));

        assert_eq!(report.bytes, 7);
        assert_eq!(report.handler_failures, 0);
        assert_eq!(
            *log.lock(),
            vec![
                (EventKind::Progress, ReadyState::Loading, true, 0),
                (EventKind::Progress, ReadyState::Done, true, 7),
                (EventKind::Load, ReadyState::Done, true, 7),
                (EventKind::LoadEnd, ReadyState::Done, true, 7),
            ]
        );
        assert_eq!(request.status(), 200);
        assert_eq!(request.status_text(), "OK");
        assert_eq!(request.response_url(), "https://host/video1/2.m4s");
        assert_eq!(request.response_type(), ResponseType::ArrayBuffer);
        assert_eq!(&request.response()[..], b"segment");
    }

    #[test]
    fn test_real_completion_is_traced() {
        let request = request("https://host/video1/2.m4s");
        let log = record_events(&request);

        request.complete(200, "OK", Bytes::from_static(b"abc"));

        assert!(log.lock().iter().all(|(_, _, no_trace, _)| !no_trace));
        assert_eq!(log.lock().len(), 4);
    }

    #[test]
    fn test_failing_handlers_do_not_abort_sequence() {
        let request = request("https://host/video1/2.m4s");
        let loaded = Arc::new(Mutex::new(false));
        let ended = Arc::new(Mutex::new(false));

        request.set_on_progress(|_| Err(HandlerError::new("boom")));
        let flag = Arc::clone(&loaded);
        request.set_on_load(move |_| -> HandlerResult {
            *flag.lock() = true;
            panic!("handler panic");
        });
        let flag = Arc::clone(&ended);
        request.set_on_load_end(move |_| {
            *flag.lock() = true;
            Ok(())
        });

        let report = request.substitute(Bytes::from_static(b"x"));

        assert_eq!(report.handler_failures, 3);
        assert!(*loaded.lock());
        assert!(*ended.lock());
        assert_eq!(request.ready_state(), ReadyState::Done);
    }

    #[test]
    fn test_event_targets_request() {
        let request = request("https://host/video1/2.m4s");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        request.set_on_load(move |event| {
            sink.lock().push((
                event.target.id(),
                event.src_element.id(),
                event.current_target.id(),
                event.trusted,
            ));
            Ok(())
        });

        request.substitute(Bytes::new());

        assert_eq!(*seen.lock(), vec![(1, 1, 1, true)]);
    }

    #[test]
    fn test_handler_may_read_request_during_dispatch() {
        let request = request("https://host/video1/2.m4s");
        let body = Arc::new(Mutex::new(Bytes::new()));
        let sink = Arc::clone(&body);
        request.set_on_load(move |event| {
            *sink.lock() = event.target.response();
            Ok(())
        });

        request.substitute(Bytes::from_static(b"payload"));

        assert_eq!(&body.lock()[..], b"payload");
    }

    #[test]
    fn test_fail_sequence() {
        let request = request("https://host/video1/2.m4s");
        let log = record_events(&request);

        request.fail();

        let kinds: Vec<_> = log.lock().iter().map(|e| e.0).collect();
        assert_eq!(kinds, vec![EventKind::Error, EventKind::LoadEnd]);
        assert_eq!(request.ready_state(), ReadyState::Done);
        assert_eq!(request.status(), 0);
    }
}
