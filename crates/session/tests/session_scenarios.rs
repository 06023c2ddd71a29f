use std::sync::Arc;
use std::time::{Duration, Instant};

use efv_metadata::{
    CaptureRequest, ExtensionCapabilities, ImageFormat, MetadataValue, Rect, RequestKey,
    ResultKey, Size, StabilizationMode,
};
use efv_session::loopback::{EventLog, LoopbackProcessor, LoopbackSurfaceProvider};
use efv_session::processor::PREVIEW_OUTPUT_ID;
use efv_session::{
    raw_sequence_id, CaptureEvent, ExtensionSession, OutputSurfaceConfig, SessionConfig,
    SessionState, REJECTED_SEQUENCE_ID,
};
use proptest::prelude::*;

struct Harness {
    provider: Arc<LoopbackSurfaceProvider>,
    processor: Arc<LoopbackProcessor>,
    session: ExtensionSession,
}

fn active_session(forward_delay: Duration) -> Harness {
    let provider = Arc::new(LoopbackSurfaceProvider::new(forward_delay));
    let processor = Arc::new(LoopbackProcessor::new());
    let mut session = ExtensionSession::new(
        Arc::new(ExtensionCapabilities::eyes_free(Rect::from_size(4000, 3000))),
        provider.clone(),
        SessionConfig::default(),
    );
    let preview = OutputSurfaceConfig::new(
        provider.allocate_surface(),
        Size::new(1280, 720),
        ImageFormat::Yuv420_888,
    );
    let config = session
        .init_session("0", preview, OutputSurfaceConfig::absent())
        .expect("init should succeed");
    assert!(config.output(PREVIEW_OUTPUT_ID).is_some());
    session
        .on_capture_session_start(processor.clone())
        .expect("session start should succeed");
    assert_eq!(session.state(), SessionState::Active);

    Harness {
        provider,
        processor,
        session,
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn locked_stabilization_with_auto_zoom_reports_padding_regions() {
    let h = active_session(Duration::ZERO);
    h.session
        .set_parameters(
            &CaptureRequest::new()
                .with(RequestKey::EfvStabilizationMode, StabilizationMode::Locked.to_value())
                .with(RequestKey::EfvAutoZoom, true),
        )
        .unwrap();

    let log = Arc::new(EventLog::new());
    let seq = h.session.start_repeating(log.clone()).unwrap();
    assert!(h.processor.fire_repeating_frame(1000));

    let events = log.for_sequence(seq);
    assert_eq!(
        events[0],
        CaptureEvent::Started {
            sequence_id: seq,
            timestamp_ns: 1000
        }
    );

    let results = log.completed_results(seq);
    assert_eq!(results.len(), 1);
    let bundle = &results[0];
    assert_eq!(
        bundle.get(ResultKey::EfvPaddingRegion),
        Some(&MetadataValue::IntArray(vec![5, 5, 5, 5]))
    );
    assert_eq!(
        bundle.get(ResultKey::EfvAutoZoom),
        Some(&MetadataValue::Bool(true))
    );
    assert_eq!(
        bundle.get(ResultKey::EfvAutoZoomPaddingRegion),
        Some(&MetadataValue::IntArray(vec![3, 3, 3, 3]))
    );
    assert!(matches!(
        events.iter().find(|e| matches!(e, CaptureEvent::Completed { .. })),
        Some(CaptureEvent::Completed {
            timestamp_ns: 1000,
            ..
        })
    ));
}

#[test]
fn trigger_keeps_only_published_keys() {
    let h = active_session(Duration::ZERO);
    let log = Arc::new(EventLog::new());
    h.session
        .start_trigger(
            &CaptureRequest::new()
                .with(RequestKey::ControlAfTrigger, 1)
                .with(RequestKey::NoiseReductionMode, 2),
            log.clone(),
        )
        .unwrap();

    let submitted = h.processor.submitted();
    assert_eq!(submitted.len(), 1);
    let keys: Vec<_> = submitted[0].parameters.keys().collect();
    assert_eq!(keys, vec![RequestKey::ControlAfTrigger]);
}

#[test]
fn rejected_capture_returns_minus_one_without_events() {
    let h = active_session(Duration::ZERO);
    let log = Arc::new(EventLog::new());
    h.processor.set_reject_submissions(true);

    let result = h.session.start_multi_frame_capture(log.clone());
    assert_eq!(raw_sequence_id(&result), REJECTED_SEQUENCE_ID);
    assert!(log.is_empty());
    assert!(h.processor.submitted().is_empty());
}

#[test]
fn multi_frame_capture_completes_with_stamped_result() {
    let h = active_session(Duration::ZERO);
    h.session
        .set_parameters(&CaptureRequest::new().with(RequestKey::EfvPaddingZoomFactor, 1.5f32))
        .unwrap();
    let log = Arc::new(EventLog::new());
    let seq = h.session.start_multi_frame_capture(log.clone()).unwrap();
    assert_eq!(h.processor.complete_pending(2_000), 1);

    let events = log.for_sequence(seq);
    assert_eq!(events.first(), Some(&CaptureEvent::ProcessStarted { sequence_id: seq }));
    assert_eq!(
        events.last(),
        Some(&CaptureEvent::SequenceCompleted { sequence_id: seq })
    );
    let results = log.completed_results(seq);
    assert_eq!(
        results[0].get(ResultKey::EfvPaddingZoomFactor),
        Some(&MetadataValue::Float(1.5))
    );
    assert!(!results[0].contains(ResultKey::SensorTimestamp));
}

#[test]
fn preview_frames_reach_client_surface() {
    let mut h = active_session(Duration::ZERO);
    let source = h.provider.latest_source().unwrap();
    let output = h.provider.latest_output().unwrap();

    for (i, ts) in [10i64, 20, 30].into_iter().enumerate() {
        assert!(source.produce_frame(ts));
        assert!(wait_until(|| output.queued_timestamps().len() == i + 1));
        assert!(wait_until(|| h.session.relay_stats().forwarded == i as u64 + 1));
    }
    assert_eq!(output.queued_timestamps(), vec![10, 20, 30]);

    h.session.on_capture_session_end().unwrap();
    h.session.deinit_session();
    assert_eq!(source.released_frames(), source.produced_frames());
    assert_eq!(h.session.relay_stats().forwarded, 3);
}

#[test]
fn frame_arriving_during_forward_is_dropped() {
    let mut h = active_session(Duration::from_millis(200));
    let source = h.provider.latest_source().unwrap();
    let output = h.provider.latest_output().unwrap();

    assert!(source.produce_frame(1));
    assert!(source.produce_frame(2));
    assert_eq!(h.session.relay_stats().dropped, 1);

    h.session.deinit_session();
    assert_eq!(output.queued_timestamps(), vec![1]);
    assert_eq!(source.released_frames(), 2);
    let stats = h.session.relay_stats();
    assert_eq!((stats.forwarded, stats.dropped), (1, 1));
}

#[test]
fn abandoned_surface_does_not_disturb_relay() {
    let mut h = active_session(Duration::ZERO);
    let source = h.provider.latest_source().unwrap();
    let output = h.provider.latest_output().unwrap();
    output.abandon();

    assert!(source.produce_frame(1));
    assert!(wait_until(|| h.session.relay_stats().failed == 1));
    assert!(source.produce_frame(2));
    assert!(wait_until(|| h.session.relay_stats().failed == 2));

    h.session.deinit_session();
    assert!(output.queued_timestamps().is_empty());
    assert_eq!(source.released_frames(), 2);
}

#[test]
fn late_repeating_events_are_swallowed_after_end() {
    let mut h = active_session(Duration::ZERO);
    let log = Arc::new(EventLog::new());
    h.session.start_repeating(log.clone()).unwrap();
    h.processor.fire_repeating_frame(100);
    let delivered = log.len();

    h.session.on_capture_session_end().unwrap();
    assert!(!h.processor.fire_repeating_frame(200));
    assert_eq!(log.len(), delivered);
    assert!(!log
        .events()
        .iter()
        .any(|e| matches!(e, CaptureEvent::SequenceAborted { .. })));
}

#[test]
fn teardown_twice_releases_once() {
    let mut h = active_session(Duration::ZERO);
    h.session.on_capture_session_end().unwrap();
    h.session.deinit_session();
    h.session.deinit_session();

    let source = h.provider.latest_source().unwrap();
    let output = h.provider.latest_output().unwrap();
    assert_eq!(source.close_calls(), 1);
    assert_eq!(output.close_calls(), 1);

    drop(h.session);
    assert_eq!(source.close_calls(), 1);
    assert_eq!(output.close_calls(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sequence_ids_strictly_increase_across_kinds(
        ops in proptest::collection::vec((0u8..3, any::<bool>()), 1..40)
    ) {
        let h = active_session(Duration::ZERO);
        let log = Arc::new(EventLog::new());
        let mut last = 0u32;
        let mut seen = Vec::new();

        for (kind, reject) in ops {
            h.processor.set_reject_submissions(reject);
            let result = match kind {
                0 => h.session.start_repeating(log.clone()),
                1 => h.session.start_multi_frame_capture(log.clone()),
                _ => h.session.start_trigger(&CaptureRequest::new(), log.clone()),
            };
            match result {
                Ok(id) => {
                    prop_assert!(!reject);
                    prop_assert!(id.get() > last);
                    last = id.get();
                    seen.push(id);
                }
                Err(e) => {
                    prop_assert!(reject);
                    prop_assert!(e.is_submission_rejected());
                    last += 1;
                }
            }
        }

        let mut unique = seen.clone();
        unique.dedup();
        prop_assert_eq!(unique.len(), seen.len());
    }
}
