//! Client-facing capture callback surface.

use efv_metadata::ResultBundle;
use serde::{Deserialize, Serialize};

use crate::processor::FailureReason;

/// Identifier of one logical request for the lifetime of its callbacks.
///
/// Issued by a single counter starting at 1, shared by every request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(u32);

impl SequenceId {
    pub const FIRST: SequenceId = SequenceId(1);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SequenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events delivered to the client, keyed by sequence id.
///
/// Called from the capture stack's delivery context, except
/// `on_capture_process_started` for one-shot captures which is invoked on
/// the submitting thread right after the request is accepted.
pub trait CaptureCallback: Send + Sync {
    fn on_capture_started(&self, sequence_id: SequenceId, timestamp_ns: i64);

    fn on_capture_process_started(&self, sequence_id: SequenceId);

    fn on_capture_completed(&self, timestamp_ns: i64, sequence_id: SequenceId, result: &ResultBundle);

    fn on_capture_failed(&self, sequence_id: SequenceId, reason: FailureReason);

    fn on_capture_sequence_completed(&self, sequence_id: SequenceId);

    fn on_capture_sequence_aborted(&self, sequence_id: SequenceId);
}

/// A recorded callback invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CaptureEvent {
    Started {
        sequence_id: SequenceId,
        timestamp_ns: i64,
    },
    ProcessStarted {
        sequence_id: SequenceId,
    },
    Completed {
        sequence_id: SequenceId,
        timestamp_ns: i64,
        result: ResultBundle,
    },
    Failed {
        sequence_id: SequenceId,
        reason: FailureReason,
    },
    SequenceCompleted {
        sequence_id: SequenceId,
    },
    SequenceAborted {
        sequence_id: SequenceId,
    },
}

impl CaptureEvent {
    pub fn sequence_id(&self) -> SequenceId {
        match self {
            CaptureEvent::Started { sequence_id, .. }
            | CaptureEvent::ProcessStarted { sequence_id }
            | CaptureEvent::Completed { sequence_id, .. }
            | CaptureEvent::Failed { sequence_id, .. }
            | CaptureEvent::SequenceCompleted { sequence_id }
            | CaptureEvent::SequenceAborted { sequence_id } => *sequence_id,
        }
    }
}

/// Forwards every callback into an async channel as a [`CaptureEvent`].
///
/// Send failures mean the receiver went away; events are dropped then.
impl CaptureCallback for tokio::sync::mpsc::UnboundedSender<CaptureEvent> {
    fn on_capture_started(&self, sequence_id: SequenceId, timestamp_ns: i64) {
        let _ = self.send(CaptureEvent::Started {
            sequence_id,
            timestamp_ns,
        });
    }

    fn on_capture_process_started(&self, sequence_id: SequenceId) {
        let _ = self.send(CaptureEvent::ProcessStarted { sequence_id });
    }

    fn on_capture_completed(&self, timestamp_ns: i64, sequence_id: SequenceId, result: &ResultBundle) {
        let _ = self.send(CaptureEvent::Completed {
            sequence_id,
            timestamp_ns,
            result: result.clone(),
        });
    }

    fn on_capture_failed(&self, sequence_id: SequenceId, reason: FailureReason) {
        let _ = self.send(CaptureEvent::Failed {
            sequence_id,
            reason,
        });
    }

    fn on_capture_sequence_completed(&self, sequence_id: SequenceId) {
        let _ = self.send(CaptureEvent::SequenceCompleted { sequence_id });
    }

    fn on_capture_sequence_aborted(&self, sequence_id: SequenceId) {
        let _ = self.send(CaptureEvent::SequenceAborted { sequence_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_callback_forwards_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let seq = SequenceId::new(3);
        tx.on_capture_started(seq, 42);
        tx.on_capture_failed(seq, FailureReason::Error);
        tx.on_capture_sequence_aborted(seq);

        assert_eq!(
            rx.try_recv().unwrap(),
            CaptureEvent::Started {
                sequence_id: seq,
                timestamp_ns: 42
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            CaptureEvent::Failed {
                sequence_id: seq,
                reason: FailureReason::Error
            }
        );
        assert_eq!(rx.try_recv().unwrap().sequence_id(), seq);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_json_shape() {
        let event = CaptureEvent::ProcessStarted {
            sequence_id: SequenceId::new(7),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"process_started","sequence_id":7}"#);
    }
}
