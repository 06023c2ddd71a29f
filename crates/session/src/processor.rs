//! Low-level request channel contracts.
//!
//! The capture stack exposes a request processor that accepts one-shot and
//! repeating requests and reports per-frame events through a
//! [`RequestCallback`] owned by the channel for the life of the request.

use efv_common::error::EfvResult;
use efv_metadata::{CaptureResult, RequestSnapshot};
use serde::{Deserialize, Serialize};

/// Identifier of an output stream bound at session configuration.
pub type OutputId = i32;

/// Output id of the high-resolution still capture stream.
pub const CAPTURE_OUTPUT_ID: OutputId = 0;

/// Output id of the live preview stream.
pub const PREVIEW_OUTPUT_ID: OutputId = 1;

/// Which public operation produced a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Repeating,
    MultiFrame,
    Trigger,
}

impl RequestKind {
    /// Output streams a request of this kind targets.
    pub fn output_ids(self) -> Vec<OutputId> {
        match self {
            RequestKind::Repeating | RequestKind::Trigger => vec![PREVIEW_OUTPUT_ID],
            RequestKind::MultiFrame => vec![CAPTURE_OUTPUT_ID],
        }
    }
}

/// A request handed to the capture stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub kind: RequestKind,
    pub output_ids: Vec<OutputId>,
    pub parameters: RequestSnapshot,
}

impl Request {
    pub fn new(kind: RequestKind, parameters: RequestSnapshot) -> Self {
        Self {
            kind,
            output_ids: kind.output_ids(),
            parameters,
        }
    }
}

/// Why a capture failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The capture failed inside the camera pipeline.
    Error,
    /// The capture was discarded by a flush.
    Flushed,
}

/// A failed frame reported by the capture stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFailure {
    pub frame_number: u64,
    pub reason: FailureReason,
}

/// Per-request events from the capture stack.
///
/// Events for one request arrive in order on the channel's delivery
/// context; events of different requests may interleave.
pub trait RequestCallback: Send + Sync {
    fn on_capture_started(&self, request: &Request, frame_number: u64, timestamp_ns: i64);

    fn on_capture_progressed(&self, request: &Request, partial: &CaptureResult);

    fn on_capture_completed(&self, request: &Request, result: &CaptureResult);

    fn on_capture_failed(&self, request: &Request, failure: CaptureFailure);

    fn on_capture_buffer_lost(&self, request: &Request, frame_number: u64, output_id: OutputId);

    fn on_capture_sequence_completed(&self, channel_sequence_id: i32, frame_number: u64);

    fn on_capture_sequence_aborted(&self, channel_sequence_id: i32);
}

/// The request submission channel of the capture stack.
///
/// Submission errors are returned synchronously; once a request has been
/// accepted, every outcome is reported through its callback.
pub trait RequestProcessor: Send + Sync {
    /// Submit a one-shot request. Returns the channel's own sequence number.
    fn submit(&self, request: Request, callback: Box<dyn RequestCallback>) -> EfvResult<i32>;

    /// Replace the repeating request. Returns the channel's own sequence number.
    fn set_repeating(&self, request: Request, callback: Box<dyn RequestCallback>)
        -> EfvResult<i32>;

    /// Stop the repeating request after its in-flight frames complete.
    fn stop_repeating(&self);

    /// Discard all pending and in-flight requests.
    fn abort_captures(&self);
}
