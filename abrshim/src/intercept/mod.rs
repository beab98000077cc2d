//! Player fetch interception.
//!
//! - [`Interceptor`]: creates player requests and routes their `send()`
//! - [`RequestContext`]: the emulated asynchronous request the player holds
//! - [`HttpTransport`]: the real network for requests that are not captured
//!
//! See [`engine`] for the capture protocol.

pub mod engine;
mod http;
mod request;
mod state;

pub use engine::{Interceptor, RequestCallback, RETRY_WINDOW};
pub use http::{HttpTransport, NetworkError};
pub use request::{
    CompletionReport, EventHandler, EventKind, HandlerError, HandlerResult, ProgressEvent,
    ReadyState, RequestContext, RequestHandle, RequestSender, ResponseType, Transport,
};
pub use state::{CapturedCall, Resolver, SegmentPhase};
