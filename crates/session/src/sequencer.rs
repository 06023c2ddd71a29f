//! Capture sequencing.
//!
//! Every public capture operation gets a sequence id from one counter and
//! hands the request channel a [`SequenceForwarder`] that rewrites
//! low-level request events into sequence-scoped client callbacks.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use efv_common::error::{EfvError, EfvResult};
use efv_metadata::{CaptureRequest, CaptureResult, ExtensionCapabilities, RequestSnapshot};

use crate::callback::{CaptureCallback, SequenceId};
use crate::params::{filter_supported, ParameterStore};
use crate::processor::{
    CaptureFailure, FailureReason, OutputId, Request, RequestCallback, RequestKind,
    RequestProcessor,
};
use crate::synthesizer::ResultSynthesizer;

/// Wire value reported when a submission is rejected.
pub const REJECTED_SEQUENCE_ID: i32 = -1;

/// Largest sequence id handed out. Ids must fit the signed wire integer.
pub const MAX_SEQUENCE_ID: u32 = i32::MAX as u32;

/// Map a submission outcome to the integer returned across the platform
/// boundary: the sequence id, or `-1` when the channel refused the request.
pub fn raw_sequence_id(result: &EfvResult<SequenceId>) -> i32 {
    match result {
        Ok(id) => i32::try_from(id.get()).unwrap_or(i32::MAX),
        Err(_) => REJECTED_SEQUENCE_ID,
    }
}

/// Issues requests on a bound request channel.
pub struct CaptureSequencer {
    processor: Arc<dyn RequestProcessor>,
    params: Arc<ParameterStore>,
    capabilities: Arc<ExtensionCapabilities>,
    synthesizer: ResultSynthesizer,
    next_id: AtomicU32,
    end_flag: Arc<AtomicBool>,
    repeating: Mutex<Option<SequenceId>>,
}

impl CaptureSequencer {
    pub fn new(
        processor: Arc<dyn RequestProcessor>,
        params: Arc<ParameterStore>,
        capabilities: Arc<ExtensionCapabilities>,
        end_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            processor,
            params,
            synthesizer: ResultSynthesizer::new(Arc::clone(&capabilities)),
            capabilities,
            next_id: AtomicU32::new(SequenceId::FIRST.get()),
            end_flag,
            repeating: Mutex::new(None),
        }
    }

    /// Start streaming preview frames with the current parameters.
    ///
    /// Replaces any repeating request already running.
    pub fn start_repeating(&self, callback: Arc<dyn CaptureCallback>) -> EfvResult<SequenceId> {
        let request = Request::new(RequestKind::Repeating, self.params.snapshot());
        let sequence_id = self.next_sequence_id()?;
        let forwarder = self.forwarder(sequence_id, RequestKind::Repeating, callback);

        self.processor
            .set_repeating(request, Box::new(forwarder))
            .map_err(|e| {
                tracing::warn!(%sequence_id, error = %e, "Repeating request rejected");
                e
            })?;

        *self
            .repeating
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sequence_id);
        tracing::debug!(%sequence_id, "Repeating request started");
        Ok(sequence_id)
    }

    /// Submit a one-shot still capture with the current parameters.
    pub fn start_multi_frame_capture(
        &self,
        callback: Arc<dyn CaptureCallback>,
    ) -> EfvResult<SequenceId> {
        let snapshot = self.params.snapshot();
        self.submit_one_shot(RequestKind::MultiFrame, snapshot, callback)
    }

    /// Submit a one-shot trigger built only from the supported keys of
    /// `request`. Persistent parameters are not merged in.
    pub fn start_trigger(
        &self,
        request: &CaptureRequest,
        callback: Arc<dyn CaptureCallback>,
    ) -> EfvResult<SequenceId> {
        let snapshot = filter_supported(request, &self.capabilities);
        self.submit_one_shot(RequestKind::Trigger, snapshot, callback)
    }

    /// Stop the repeating request, if one is outstanding.
    pub fn stop_repeating(&self) {
        let outstanding = self
            .repeating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match outstanding {
            Some(sequence_id) => {
                tracing::debug!(%sequence_id, "Stopping repeating request");
                self.processor.stop_repeating();
            }
            None => tracing::debug!("stop_repeating with no repeating request outstanding"),
        }
    }

    /// Abort everything in flight on the channel.
    pub fn abort_all(&self) {
        self.repeating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.processor.abort_captures();
    }

    /// Sequence id of the running repeating request.
    pub fn repeating_sequence(&self) -> Option<SequenceId> {
        *self
            .repeating
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn submit_one_shot(
        &self,
        kind: RequestKind,
        snapshot: RequestSnapshot,
        callback: Arc<dyn CaptureCallback>,
    ) -> EfvResult<SequenceId> {
        let request = Request::new(kind, snapshot);
        let sequence_id = self.next_sequence_id()?;
        let forwarder = self.forwarder(sequence_id, kind, Arc::clone(&callback));

        self.processor
            .submit(request, Box::new(forwarder))
            .map_err(|e| {
                tracing::warn!(%sequence_id, ?kind, error = %e, "Capture request rejected");
                e
            })?;

        tracing::debug!(%sequence_id, ?kind, "Capture request submitted");
        callback.on_capture_process_started(sequence_id);
        Ok(sequence_id)
    }

    /// Take the next id. Fails once [`MAX_SEQUENCE_ID`] has been issued;
    /// the counter never wraps back onto ids already in use.
    fn next_sequence_id(&self) -> EfvResult<SequenceId> {
        self.next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                (raw <= MAX_SEQUENCE_ID).then(|| raw + 1)
            })
            .map(SequenceId::new)
            .map_err(|_| {
                tracing::warn!("Sequence ids exhausted");
                EfvError::submission_rejected("sequence ids exhausted")
            })
    }

    #[cfg(test)]
    fn set_next_sequence_id(&self, raw: u32) {
        self.next_id.store(raw, Ordering::SeqCst);
    }

    fn forwarder(
        &self,
        sequence_id: SequenceId,
        kind: RequestKind,
        callback: Arc<dyn CaptureCallback>,
    ) -> SequenceForwarder {
        SequenceForwarder {
            sequence_id,
            kind,
            end_flag: Arc::clone(&self.end_flag),
            synthesizer: self.synthesizer.clone(),
            callback,
        }
    }
}

/// Translates one request's channel events into client callbacks.
struct SequenceForwarder {
    sequence_id: SequenceId,
    kind: RequestKind,
    end_flag: Arc<AtomicBool>,
    synthesizer: ResultSynthesizer,
    callback: Arc<dyn CaptureCallback>,
}

impl SequenceForwarder {
    /// Repeating events stop reaching the client once session end began.
    fn suppressed(&self, event: &'static str) -> bool {
        let suppressed =
            self.kind == RequestKind::Repeating && self.end_flag.load(Ordering::Acquire);
        if suppressed {
            tracing::trace!(sequence_id = %self.sequence_id, event, "Suppressing late event");
        }
        suppressed
    }
}

impl RequestCallback for SequenceForwarder {
    fn on_capture_started(&self, _request: &Request, _frame_number: u64, timestamp_ns: i64) {
        if self.suppressed("started") {
            return;
        }
        self.callback
            .on_capture_started(self.sequence_id, timestamp_ns);
    }

    fn on_capture_progressed(&self, _request: &Request, _partial: &CaptureResult) {}

    fn on_capture_completed(&self, request: &Request, result: &CaptureResult) {
        if self.suppressed("completed") {
            return;
        }

        match result.sensor_timestamp() {
            Some(timestamp_ns) => {
                let bundle = self.synthesizer.synthesize(&request.parameters, result);
                self.callback
                    .on_capture_completed(timestamp_ns, self.sequence_id, &bundle);
            }
            None => {
                tracing::trace!(sequence_id = %self.sequence_id, "Result without sensor timestamp");
            }
        }

        if self.kind == RequestKind::Repeating {
            self.callback.on_capture_process_started(self.sequence_id);
        }
    }

    fn on_capture_failed(&self, _request: &Request, failure: CaptureFailure) {
        if self.suppressed("failed") {
            return;
        }
        self.callback
            .on_capture_failed(self.sequence_id, failure.reason);
    }

    fn on_capture_buffer_lost(&self, _request: &Request, frame_number: u64, output_id: OutputId) {
        if self.suppressed("buffer_lost") {
            return;
        }
        tracing::debug!(sequence_id = %self.sequence_id, frame_number, output_id, "Capture buffer lost");
        self.callback
            .on_capture_failed(self.sequence_id, FailureReason::Error);
    }

    fn on_capture_sequence_completed(&self, _channel_sequence_id: i32, _frame_number: u64) {
        if self.suppressed("sequence_completed") {
            return;
        }
        self.callback.on_capture_sequence_completed(self.sequence_id);
    }

    fn on_capture_sequence_aborted(&self, _channel_sequence_id: i32) {
        if self.suppressed("sequence_aborted") {
            return;
        }
        self.callback.on_capture_sequence_aborted(self.sequence_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CaptureEvent;
    use crate::loopback::{EventLog, LoopbackProcessor};
    use efv_metadata::{MetadataValue, Rect, RequestKey, ResultKey};

    struct Fixture {
        processor: Arc<LoopbackProcessor>,
        params: Arc<ParameterStore>,
        end_flag: Arc<AtomicBool>,
        sequencer: CaptureSequencer,
    }

    fn fixture() -> Fixture {
        let caps = Arc::new(ExtensionCapabilities::eyes_free(Rect::from_size(
            4000, 3000,
        )));
        let processor = Arc::new(LoopbackProcessor::new());
        let params = Arc::new(ParameterStore::new(Arc::clone(&caps)));
        let end_flag = Arc::new(AtomicBool::new(false));
        let sequencer = CaptureSequencer::new(
            processor.clone(),
            Arc::clone(&params),
            caps,
            Arc::clone(&end_flag),
        );
        Fixture {
            processor,
            params,
            end_flag,
            sequencer,
        }
    }

    #[test]
    fn test_ids_shared_across_kinds() {
        let f = fixture();
        let log = Arc::new(EventLog::new());
        let a = f.sequencer.start_repeating(log.clone()).unwrap();
        let b = f.sequencer.start_multi_frame_capture(log.clone()).unwrap();
        let c = f
            .sequencer
            .start_trigger(&CaptureRequest::new(), log.clone())
            .unwrap();
        assert_eq!(
            (a.get(), b.get(), c.get()),
            (1, 2, 3),
            "ids come from one counter"
        );
    }

    #[test]
    fn test_rejected_submission_reports_minus_one_and_no_events() {
        let f = fixture();
        let log = Arc::new(EventLog::new());
        f.processor.set_reject_submissions(true);

        let result = f.sequencer.start_multi_frame_capture(log.clone());
        assert!(matches!(result, Err(EfvError::SubmissionRejected { .. })));
        assert_eq!(raw_sequence_id(&result), REJECTED_SEQUENCE_ID);
        assert!(log.is_empty());

        f.processor.set_reject_submissions(false);
        let next = f.sequencer.start_multi_frame_capture(log.clone()).unwrap();
        assert_eq!(next.get(), 2, "rejected ids are never reused");
        assert_eq!(raw_sequence_id(&Ok(next)), 2);
    }

    #[test]
    fn test_one_shot_signals_process_started_on_submit() {
        let f = fixture();
        let log = Arc::new(EventLog::new());
        let seq = f.sequencer.start_multi_frame_capture(log.clone()).unwrap();
        assert_eq!(
            log.events(),
            vec![CaptureEvent::ProcessStarted { sequence_id: seq }]
        );
        assert_eq!(
            f.processor.submitted()[0].output_ids,
            vec![crate::processor::CAPTURE_OUTPUT_ID]
        );
    }

    #[test]
    fn test_trigger_snapshot_ignores_persistent_parameters() {
        let f = fixture();
        f.params
            .set(&CaptureRequest::new().with(RequestKey::EfvAutoZoom, true));
        let log = Arc::new(EventLog::new());
        f.sequencer
            .start_trigger(
                &CaptureRequest::new()
                    .with(RequestKey::ControlAfTrigger, 1)
                    .with(RequestKey::FlashMode, 2),
                log,
            )
            .unwrap();

        let submitted = f.processor.submitted();
        let keys: Vec<_> = submitted[0].parameters.keys().collect();
        assert_eq!(keys, vec![RequestKey::ControlAfTrigger]);
    }

    #[test]
    fn test_repeating_events_are_suppressed_after_end() {
        let f = fixture();
        let log = Arc::new(EventLog::new());
        let seq = f.sequencer.start_repeating(log.clone()).unwrap();

        f.processor.fire_repeating_frame(100);
        let before = log.len();
        assert!(before > 0);

        f.end_flag.store(true, Ordering::Release);
        f.processor.fire_repeating_frame(200);
        f.sequencer.abort_all();
        assert_eq!(log.len(), before);
        assert!(log
            .events()
            .iter()
            .all(|event| event.sequence_id() == seq));
    }

    #[test]
    fn test_one_shot_abort_still_reported_after_end() {
        let f = fixture();
        let log = Arc::new(EventLog::new());
        let seq = f.sequencer.start_multi_frame_capture(log.clone()).unwrap();
        f.end_flag.store(true, Ordering::Release);
        f.sequencer.abort_all();
        assert_eq!(
            log.events().last(),
            Some(&CaptureEvent::SequenceAborted { sequence_id: seq })
        );
    }

    #[test]
    fn test_completion_without_timestamp_delivers_nothing() {
        let f = fixture();
        let log = Arc::new(EventLog::new());
        let seq = f.sequencer.start_multi_frame_capture(log.clone()).unwrap();
        f.processor
            .complete_pending_with(CaptureResult::new().with(ResultKey::ControlAfState, 1));

        let events = log.events();
        assert!(!events
            .iter()
            .any(|event| matches!(event, CaptureEvent::Completed { .. })));
        assert_eq!(
            events.last(),
            Some(&CaptureEvent::SequenceCompleted { sequence_id: seq })
        );
    }

    #[test]
    fn test_buffer_lost_maps_to_error_failure() {
        let f = fixture();
        let log = Arc::new(EventLog::new());
        let seq = f.sequencer.start_trigger(&CaptureRequest::new(), log.clone()).unwrap();
        f.processor.lose_buffer_pending();
        assert!(log.events().contains(&CaptureEvent::Failed {
            sequence_id: seq,
            reason: FailureReason::Error
        }));
    }

    #[test]
    fn test_stop_repeating_without_outstanding_is_noop() {
        let f = fixture();
        f.sequencer.stop_repeating();
        assert_eq!(f.processor.stop_repeating_calls(), 0);

        let log = Arc::new(EventLog::new());
        let seq = f.sequencer.start_repeating(log.clone()).unwrap();
        assert_eq!(f.sequencer.repeating_sequence(), Some(seq));
        f.sequencer.stop_repeating();
        f.sequencer.stop_repeating();
        assert_eq!(f.processor.stop_repeating_calls(), 1);
        assert_eq!(
            log.events().last(),
            Some(&CaptureEvent::SequenceCompleted { sequence_id: seq })
        );
    }

    #[test]
    fn test_repeating_completion_carries_snapshot_at_submission() {
        let f = fixture();
        f.params.set(
            &CaptureRequest::new().with(RequestKey::EfvRotateViewport, MetadataValue::Float(5.0)),
        );
        let log = Arc::new(EventLog::new());
        let seq = f.sequencer.start_repeating(log.clone()).unwrap();
        f.params.set(
            &CaptureRequest::new().with(RequestKey::EfvRotateViewport, MetadataValue::Float(9.0)),
        );
        f.processor.fire_repeating_frame(1000);

        let completed = log
            .events()
            .into_iter()
            .find_map(|event| match event {
                CaptureEvent::Completed { result, .. } => Some(result),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            completed.get(ResultKey::EfvRotateViewport),
            Some(&MetadataValue::Float(5.0))
        );
        assert_eq!(
            log.events().last(),
            Some(&CaptureEvent::ProcessStarted { sequence_id: seq })
        );
    }

    #[test]
    fn test_channel_failure_reason_is_forwarded() {
        let f = fixture();
        let log = Arc::new(EventLog::new());
        let seq = f.sequencer.start_trigger(&CaptureRequest::new(), log.clone()).unwrap();
        f.processor.fail_pending(FailureReason::Flushed);
        assert_eq!(
            log.events(),
            vec![
                CaptureEvent::ProcessStarted { sequence_id: seq },
                CaptureEvent::Failed {
                    sequence_id: seq,
                    reason: FailureReason::Flushed
                },
                CaptureEvent::SequenceCompleted { sequence_id: seq },
            ]
        );

        let preview_log = Arc::new(EventLog::new());
        let preview = f.sequencer.start_repeating(preview_log.clone()).unwrap();
        assert!(f.processor.fail_repeating_frame(FailureReason::Flushed));
        assert_eq!(
            preview_log.events(),
            vec![CaptureEvent::Failed {
                sequence_id: preview,
                reason: FailureReason::Flushed
            }]
        );

        f.end_flag.store(true, Ordering::Release);
        assert!(f.processor.fail_repeating_frame(FailureReason::Flushed));
        assert_eq!(preview_log.len(), 1);

        let late = f.sequencer.start_trigger(&CaptureRequest::new(), log.clone()).unwrap();
        f.processor.fail_pending(FailureReason::Flushed);
        assert!(log.events().contains(&CaptureEvent::Failed {
            sequence_id: late,
            reason: FailureReason::Flushed
        }));
    }

    #[test]
    fn test_sequence_ids_stop_at_wire_maximum() {
        let f = fixture();
        let log = Arc::new(EventLog::new());
        f.sequencer.set_next_sequence_id(MAX_SEQUENCE_ID);

        let last = f.sequencer.start_multi_frame_capture(log.clone());
        assert_eq!(raw_sequence_id(&last), i32::MAX);

        let exhausted = f.sequencer.start_repeating(log.clone());
        assert!(matches!(exhausted, Err(EfvError::SubmissionRejected { .. })));
        assert_eq!(raw_sequence_id(&exhausted), REJECTED_SEQUENCE_ID);
        let again = f.sequencer.start_trigger(&CaptureRequest::new(), log.clone());
        assert!(again.is_err());

        assert_eq!(f.processor.submitted().len(), 1);
        assert_eq!(f.sequencer.repeating_sequence(), None);
    }
}
