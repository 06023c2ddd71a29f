//! Run an extension session end to end against loopback collaborators.

use std::sync::Arc;
use std::time::Duration;

use efv_common::clock::{RateController, SensorClock};
use efv_common::config::{SessionDefaults, SimulationDefaults};
use efv_metadata::{CaptureRequest, ImageFormat, Rect, RequestKey, Size, StabilizationMode};
use efv_session::extender::{CameraCharacteristics, StreamConfiguration};
use efv_session::loopback::{LoopbackProcessor, LoopbackSurfaceProvider};
use efv_session::{
    raw_sequence_id, select_extender, CaptureCallback, CaptureEvent, ExtenderKind,
    OutputSurfaceConfig, RelayStats, SessionConfig, REJECTED_SEQUENCE_ID,
};
use serde::Serialize;
use tokio::sync::mpsc;

pub struct SimulateArgs {
    pub extension: ExtenderKind,
    pub simulation: SimulationDefaults,
    pub session: SessionDefaults,
    pub stabilization: Option<StabilizationMode>,
    pub auto_zoom: bool,
    pub padding_zoom: Option<f32>,
    pub max_padding_zoom: Option<f32>,
    pub still_every: u32,
    pub print_events: bool,
}

#[derive(Debug, Default, Serialize)]
struct EventTally {
    started: u64,
    process_started: u64,
    completed: u64,
    failed: u64,
    sequence_completed: u64,
    sequence_aborted: u64,
}

impl EventTally {
    fn record(&mut self, event: &CaptureEvent) {
        let counter = match event {
            CaptureEvent::Started { .. } => &mut self.started,
            CaptureEvent::ProcessStarted { .. } => &mut self.process_started,
            CaptureEvent::Completed { .. } => &mut self.completed,
            CaptureEvent::Failed { .. } => &mut self.failed,
            CaptureEvent::SequenceCompleted { .. } => &mut self.sequence_completed,
            CaptureEvent::SequenceAborted { .. } => &mut self.sequence_aborted,
        };
        *counter += 1;
    }
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    started_at: String,
    elapsed_secs: f64,
    frames: u32,
    parameters_applied: usize,
    stills_requested: u32,
    stills_rejected: u32,
    events: EventTally,
    relay: RelayStats,
    drop_rate_percent: f64,
    produced_frames: usize,
    released_frames: usize,
}

pub async fn run(args: SimulateArgs) -> anyhow::Result<()> {
    let sim = &args.simulation;
    let active_array = Rect::from_size(sim.active_array_width, sim.active_array_height);
    let preview_size = Size::new(sim.preview_width, sim.preview_height);
    let capture_size = Size::new(
        sim.active_array_width.max(1) as u32,
        sim.active_array_height.max(1) as u32,
    );

    let mut extender = select_extender(args.extension);
    tracing::info!(extension = extender.name(), "Loading extension");
    extender.initialize(
        "0",
        CameraCharacteristics {
            active_array,
            stream_configurations: vec![
                StreamConfiguration {
                    format: ImageFormat::Yuv420_888,
                    sizes: vec![preview_size, capture_size],
                },
                StreamConfiguration {
                    format: ImageFormat::Jpeg,
                    sizes: vec![capture_size],
                },
            ],
        },
    )?;

    let provider = Arc::new(LoopbackSurfaceProvider::new(Duration::from_millis(
        sim.forward_delay_ms,
    )));
    let mut session =
        extender.create_session(provider.clone(), SessionConfig::from(&args.session))?;

    let preview = OutputSurfaceConfig::new(
        provider.allocate_surface(),
        preview_size,
        ImageFormat::Yuv420_888,
    );
    let capture = OutputSurfaceConfig::new(
        provider.allocate_surface(),
        capture_size,
        ImageFormat::Jpeg,
    );
    let configuration = session.init_session("0", preview, capture)?;
    tracing::info!(outputs = configuration.outputs.len(), "Session configured");

    let processor = Arc::new(LoopbackProcessor::new());
    session.on_capture_session_start(processor.clone())?;
    let source = provider
        .latest_source()
        .ok_or_else(|| anyhow::anyhow!("No preview image source was allocated"))?;

    let parameters_applied = session.set_parameters(&build_parameters(&args))?;

    println!("Simulating eyes-free session");
    println!("  Preview: {preview_size} @ {}fps", sim.fps);
    println!("  Frames: {}", sim.frames);
    println!("  Parameters applied: {parameters_applied}");
    println!();

    let (tx, mut rx) = mpsc::unbounded_channel::<CaptureEvent>();
    let print_events = args.print_events;
    let printer = tokio::spawn(async move {
        let mut tally = EventTally::default();
        while let Some(event) = rx.recv().await {
            tally.record(&event);
            if print_events {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
                }
            }
        }
        tally
    });
    let callback: Arc<dyn CaptureCallback> = Arc::new(tx);

    let repeating = session.start_repeating(Arc::clone(&callback))?;
    tracing::info!(sequence_id = %repeating, "Preview streaming");

    let clock = SensorClock::start();
    let mut rate = RateController::new(sim.fps);
    let mut frames = 0u32;
    let mut stills_requested = 0u32;
    let mut stills_rejected = 0u32;

    while frames < sim.frames {
        let now = clock.timestamp_ns();
        if !rate.should_tick(now as u64) {
            let wait = rate.until_next_ns(now as u64);
            tokio::time::sleep(Duration::from_nanos(wait)).await;
            continue;
        }
        frames += 1;

        source.produce_frame(now);
        processor.fire_repeating_frame(now);
        processor.complete_pending(now);

        if args.still_every > 0 && frames % args.still_every == 0 {
            stills_requested += 1;
            let result = session.start_multi_frame_capture(Arc::clone(&callback));
            if raw_sequence_id(&result) == REJECTED_SEQUENCE_ID {
                stills_rejected += 1;
            }
        }
    }
    processor.complete_pending(clock.timestamp_ns());

    session.stop_repeating()?;
    session.on_capture_session_end()?;
    session.deinit_session();
    let relay = session.relay_stats();

    drop(callback);
    drop(session);
    drop(processor);
    let events = printer.await?;

    let report = SimulationReport {
        started_at: clock.epoch_wall().to_string(),
        elapsed_secs: clock.elapsed_secs(),
        frames,
        parameters_applied,
        stills_requested,
        stills_rejected,
        events,
        relay,
        drop_rate_percent: relay.drop_rate(),
        produced_frames: source.produced_frames(),
        released_frames: source.released_frames(),
    };

    if print_events {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    println!("Session finished in {:.2}s", report.elapsed_secs);
    println!(
        "  Events: {} started, {} completed, {} failed",
        report.events.started, report.events.completed, report.events.failed
    );
    println!(
        "  Stills: {} requested, {} rejected",
        report.stills_requested, report.stills_rejected
    );
    println!(
        "  Relay: {} forwarded, {} dropped ({:.1}%), {} failed",
        relay.forwarded, relay.dropped, report.drop_rate_percent, relay.failed
    );
    println!(
        "  Buffers: {} produced, {} released",
        report.produced_frames, report.released_frames
    );

    Ok(())
}

fn build_parameters(args: &SimulateArgs) -> CaptureRequest {
    let mut request = CaptureRequest::new();
    if let Some(mode) = args.stabilization {
        request.set(RequestKey::EfvStabilizationMode, mode.to_value());
    }
    if args.auto_zoom {
        request.set(RequestKey::EfvAutoZoom, true);
    }
    if let Some(factor) = args.padding_zoom {
        request.set(RequestKey::EfvPaddingZoomFactor, factor);
    }
    if let Some(factor) = args.max_padding_zoom {
        request.set(RequestKey::EfvMaxPaddingZoomFactor, factor);
    }
    request
}
