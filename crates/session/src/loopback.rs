//! In-memory collaborators.
//!
//! A request processor, surface provider, image source, and output writer
//! that run entirely in process. Tests drive them directly; the CLI uses
//! them to run a full session without a camera.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use efv_common::error::{EfvError, EfvResult};
use efv_metadata::{CaptureResult, ImageFormat, ResultBundle, ResultKey, Size};

use crate::callback::{CaptureCallback, CaptureEvent, SequenceId};
use crate::processor::{
    CaptureFailure, FailureReason, Request, RequestCallback, RequestProcessor, PREVIEW_OUTPUT_ID,
};
use crate::surface::{
    ImageAvailableListener, ImageBuffer, ImageSource, OutputWriter, SurfaceId, SurfaceProvider,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A request accepted by the loopback channel.
struct InFlight {
    channel_sequence_id: i32,
    request: Request,
    callback: Arc<dyn RequestCallback>,
}

/// Request channel that records submissions and replays capture events
/// on demand, on the calling thread.
#[derive(Default)]
pub struct LoopbackProcessor {
    reject: AtomicBool,
    next_channel_sequence: AtomicI32,
    frame_number: AtomicU64,
    stop_repeating_calls: AtomicUsize,
    abort_calls: AtomicUsize,
    submitted: Mutex<Vec<Request>>,
    repeating: Mutex<Option<InFlight>>,
    pending: Mutex<VecDeque<InFlight>>,
}

impl LoopbackProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following submission fail synchronously.
    pub fn set_reject_submissions(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Every request accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<Request> {
        lock(&self.submitted).clone()
    }

    pub fn has_repeating(&self) -> bool {
        lock(&self.repeating).is_some()
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn stop_repeating_calls(&self) -> usize {
        self.stop_repeating_calls.load(Ordering::SeqCst)
    }

    pub fn abort_calls(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    /// Produce one preview frame for the repeating request, if any.
    /// Returns false when no repeating request is installed.
    pub fn fire_repeating_frame(&self, timestamp_ns: i64) -> bool {
        let (request, callback) = match lock(&self.repeating).as_ref() {
            Some(flight) => (flight.request.clone(), Arc::clone(&flight.callback)),
            None => return false,
        };
        let frame_number = self.next_frame_number();
        callback.on_capture_started(&request, frame_number, timestamp_ns);
        callback.on_capture_completed(&request, &sample_result(timestamp_ns));
        true
    }

    /// Report one failed frame for the repeating request, if any.
    pub fn fail_repeating_frame(&self, reason: FailureReason) -> bool {
        let (request, callback) = match lock(&self.repeating).as_ref() {
            Some(flight) => (flight.request.clone(), Arc::clone(&flight.callback)),
            None => return false,
        };
        let frame_number = self.next_frame_number();
        callback.on_capture_failed(
            &request,
            CaptureFailure {
                frame_number,
                reason,
            },
        );
        true
    }

    /// Complete every pending one-shot request with a stamped result.
    pub fn complete_pending(&self, timestamp_ns: i64) -> usize {
        self.drain_pending(|flight, frame_number| {
            flight
                .callback
                .on_capture_started(&flight.request, frame_number, timestamp_ns);
            flight
                .callback
                .on_capture_completed(&flight.request, &sample_result(timestamp_ns));
        })
    }

    /// Complete every pending one-shot request with `result` as reported.
    pub fn complete_pending_with(&self, result: CaptureResult) -> usize {
        let timestamp_ns = result.sensor_timestamp().unwrap_or_default();
        self.drain_pending(|flight, frame_number| {
            flight
                .callback
                .on_capture_started(&flight.request, frame_number, timestamp_ns);
            flight.callback.on_capture_completed(&flight.request, &result);
        })
    }

    /// Fail every pending one-shot request.
    pub fn fail_pending(&self, reason: FailureReason) -> usize {
        self.drain_pending(|flight, frame_number| {
            flight.callback.on_capture_failed(
                &flight.request,
                CaptureFailure {
                    frame_number,
                    reason,
                },
            );
        })
    }

    /// Report a lost output buffer for every pending one-shot request.
    pub fn lose_buffer_pending(&self) -> usize {
        self.drain_pending(|flight, frame_number| {
            let output_id = flight
                .request
                .output_ids
                .first()
                .copied()
                .unwrap_or(PREVIEW_OUTPUT_ID);
            flight
                .callback
                .on_capture_buffer_lost(&flight.request, frame_number, output_id);
        })
    }

    fn drain_pending(&self, mut deliver: impl FnMut(&InFlight, u64)) -> usize {
        let drained: Vec<InFlight> = lock(&self.pending).drain(..).collect();
        for flight in &drained {
            let frame_number = self.next_frame_number();
            deliver(flight, frame_number);
            flight
                .callback
                .on_capture_sequence_completed(flight.channel_sequence_id, frame_number);
        }
        drained.len()
    }

    fn accept(&self, request: Request, callback: Box<dyn RequestCallback>) -> EfvResult<InFlight> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(EfvError::submission_rejected("loopback channel is rejecting requests"));
        }
        lock(&self.submitted).push(request.clone());
        Ok(InFlight {
            channel_sequence_id: self.next_channel_sequence.fetch_add(1, Ordering::SeqCst),
            request,
            callback: Arc::from(callback),
        })
    }

    fn next_frame_number(&self) -> u64 {
        self.frame_number.fetch_add(1, Ordering::SeqCst)
    }
}

impl RequestProcessor for LoopbackProcessor {
    fn submit(&self, request: Request, callback: Box<dyn RequestCallback>) -> EfvResult<i32> {
        let flight = self.accept(request, callback)?;
        let id = flight.channel_sequence_id;
        lock(&self.pending).push_back(flight);
        Ok(id)
    }

    fn set_repeating(
        &self,
        request: Request,
        callback: Box<dyn RequestCallback>,
    ) -> EfvResult<i32> {
        let flight = self.accept(request, callback)?;
        let id = flight.channel_sequence_id;
        let replaced = lock(&self.repeating).replace(flight);
        if let Some(old) = replaced {
            old.callback
                .on_capture_sequence_completed(old.channel_sequence_id, self.next_frame_number());
        }
        Ok(id)
    }

    fn stop_repeating(&self) {
        self.stop_repeating_calls.fetch_add(1, Ordering::SeqCst);
        let stopped = lock(&self.repeating).take();
        if let Some(flight) = stopped {
            flight
                .callback
                .on_capture_sequence_completed(flight.channel_sequence_id, self.next_frame_number());
        }
    }

    fn abort_captures(&self) {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        let repeating = lock(&self.repeating).take();
        let pending: Vec<InFlight> = lock(&self.pending).drain(..).collect();
        for flight in repeating.iter().chain(pending.iter()) {
            flight
                .callback
                .on_capture_sequence_aborted(flight.channel_sequence_id);
        }
    }
}

/// The low-level result a loopback sensor reports for one frame.
pub fn sample_result(timestamp_ns: i64) -> CaptureResult {
    CaptureResult::new()
        .with(ResultKey::SensorTimestamp, timestamp_ns)
        .with(ResultKey::SensorFrameDuration, 33_333_333i64)
        .with(ResultKey::ControlZoomRatio, 1.0f32)
        .with(ResultKey::ControlAfState, 2)
}

/// A frame buffer whose release is counted.
#[derive(Debug)]
pub struct LoopbackFrame {
    timestamp_ns: i64,
    size: Size,
    format: ImageFormat,
    releases: Arc<AtomicUsize>,
}

impl LoopbackFrame {
    pub fn new(timestamp_ns: i64, size: Size, format: ImageFormat, releases: Arc<AtomicUsize>) -> Self {
        Self {
            timestamp_ns,
            size,
            format,
            releases,
        }
    }
}

impl ImageBuffer for LoopbackFrame {
    fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    fn size(&self) -> Size {
        self.size
    }

    fn format(&self) -> ImageFormat {
        self.format
    }
}

impl Drop for LoopbackFrame {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Bounded image queue fed by [`LoopbackImageSource::produce_frame`].
pub struct LoopbackImageSource {
    surface_id: SurfaceId,
    size: Size,
    format: ImageFormat,
    max_images: usize,
    queue: Mutex<VecDeque<Box<dyn ImageBuffer>>>,
    listener: Mutex<Option<Arc<dyn ImageAvailableListener>>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    produced: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl LoopbackImageSource {
    fn new(surface_id: SurfaceId, size: Size, format: ImageFormat, max_images: usize) -> Self {
        Self {
            surface_id,
            size,
            format,
            max_images: max_images.max(1),
            queue: Mutex::new(VecDeque::new()),
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            produced: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a new frame and notify the listener on this thread.
    ///
    /// Returns false if the source is closed or full; the frame is released.
    pub fn produce_frame(&self, timestamp_ns: i64) -> bool {
        let frame = LoopbackFrame::new(
            timestamp_ns,
            self.size,
            self.format,
            Arc::clone(&self.released),
        );
        self.produced.fetch_add(1, Ordering::SeqCst);

        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        {
            let mut queue = lock(&self.queue);
            if queue.len() >= self.max_images {
                tracing::debug!(timestamp_ns, "Image source full, discarding frame");
                return false;
            }
            queue.push_back(Box::new(frame));
        }

        let listener = lock(&self.listener).clone();
        if let Some(listener) = listener {
            listener.on_image_available(self);
        }
        true
    }

    pub fn produced_frames(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn released_frames(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn queued_frames(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn has_listener(&self) -> bool {
        lock(&self.listener).is_some()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

impl ImageSource for LoopbackImageSource {
    fn surface_id(&self) -> SurfaceId {
        self.surface_id
    }

    fn acquire_next_image(&self) -> Option<Box<dyn ImageBuffer>> {
        lock(&self.queue).pop_front()
    }

    fn set_listener(&self, listener: Option<Arc<dyn ImageAvailableListener>>) {
        *lock(&self.listener) = listener;
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.queue).clear();
        lock(&self.listener).take();
    }
}

/// What a loopback output surface received.
#[derive(Debug, Default)]
pub struct LoopbackOutput {
    surface_id: SurfaceId,
    delay: Duration,
    queued: Mutex<Vec<i64>>,
    abandoned: AtomicBool,
    close_calls: AtomicUsize,
}

impl LoopbackOutput {
    /// Timestamps of every frame queued, in order.
    pub fn queued_timestamps(&self) -> Vec<i64> {
        lock(&self.queued).clone()
    }

    /// Make the surface refuse every further frame.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.surface_id
    }
}

struct LoopbackWriter {
    output: Arc<LoopbackOutput>,
}

impl OutputWriter for LoopbackWriter {
    fn queue_input_image(&mut self, image: &dyn ImageBuffer) -> EfvResult<()> {
        if self.output.abandoned.load(Ordering::SeqCst) {
            return Err(EfvError::surface(format!(
                "surface {} abandoned",
                self.output.surface_id
            )));
        }
        if !self.output.delay.is_zero() {
            std::thread::sleep(self.output.delay);
        }
        lock(&self.output.queued).push(image.timestamp_ns());
        Ok(())
    }

    fn close(&mut self) {
        self.output.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out loopback image sources and output writers and keeps a
/// handle to each for inspection.
pub struct LoopbackSurfaceProvider {
    next_surface: AtomicU64,
    forward_delay: Duration,
    fail_writer: AtomicBool,
    sources: Mutex<Vec<Arc<LoopbackImageSource>>>,
    outputs: Mutex<Vec<Arc<LoopbackOutput>>>,
}

impl Default for LoopbackSurfaceProvider {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl LoopbackSurfaceProvider {
    /// `forward_delay` is how long each output surface takes per frame.
    pub fn new(forward_delay: Duration) -> Self {
        Self {
            next_surface: AtomicU64::new(1000),
            forward_delay,
            fail_writer: AtomicBool::new(false),
            sources: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
        }
    }

    /// Make `open_writer` fail, as if the client surface were gone.
    pub fn set_fail_writer(&self, fail: bool) {
        self.fail_writer.store(fail, Ordering::SeqCst);
    }

    /// Allocate a surface id for a client-owned surface.
    pub fn allocate_surface(&self) -> SurfaceId {
        self.next_surface.fetch_add(1, Ordering::SeqCst)
    }

    pub fn latest_source(&self) -> Option<Arc<LoopbackImageSource>> {
        lock(&self.sources).last().cloned()
    }

    pub fn latest_output(&self) -> Option<Arc<LoopbackOutput>> {
        lock(&self.outputs).last().cloned()
    }

    pub fn source_count(&self) -> usize {
        lock(&self.sources).len()
    }
}

impl SurfaceProvider for LoopbackSurfaceProvider {
    fn create_image_source(
        &self,
        size: Size,
        format: ImageFormat,
        max_images: usize,
        _usage: u64,
    ) -> EfvResult<Arc<dyn ImageSource>> {
        let source = Arc::new(LoopbackImageSource::new(
            self.allocate_surface(),
            size,
            format,
            max_images,
        ));
        lock(&self.sources).push(Arc::clone(&source));
        Ok(source)
    }

    fn open_writer(
        &self,
        surface: SurfaceId,
        _format: ImageFormat,
        _max_images: usize,
    ) -> EfvResult<Box<dyn OutputWriter>> {
        if self.fail_writer.load(Ordering::SeqCst) {
            return Err(EfvError::surface(format!("surface {surface} is not valid")));
        }
        let output = Arc::new(LoopbackOutput {
            surface_id: surface,
            delay: self.forward_delay,
            ..LoopbackOutput::default()
        });
        lock(&self.outputs).push(Arc::clone(&output));
        Ok(Box::new(LoopbackWriter { output }))
    }
}

/// Records every callback it receives.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<CaptureEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CaptureEvent> {
        lock(&self.events).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    /// Events recorded for one sequence, in delivery order.
    pub fn for_sequence(&self, sequence_id: SequenceId) -> Vec<CaptureEvent> {
        lock(&self.events)
            .iter()
            .filter(|event| event.sequence_id() == sequence_id)
            .cloned()
            .collect()
    }

    /// Result bundles of every completed capture of one sequence.
    pub fn completed_results(&self, sequence_id: SequenceId) -> Vec<ResultBundle> {
        self.for_sequence(sequence_id)
            .into_iter()
            .filter_map(|event| match event {
                CaptureEvent::Completed { result, .. } => Some(result),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: CaptureEvent) {
        lock(&self.events).push(event);
    }
}

impl CaptureCallback for EventLog {
    fn on_capture_started(&self, sequence_id: SequenceId, timestamp_ns: i64) {
        self.push(CaptureEvent::Started {
            sequence_id,
            timestamp_ns,
        });
    }

    fn on_capture_process_started(&self, sequence_id: SequenceId) {
        self.push(CaptureEvent::ProcessStarted { sequence_id });
    }

    fn on_capture_completed(&self, timestamp_ns: i64, sequence_id: SequenceId, result: &ResultBundle) {
        self.push(CaptureEvent::Completed {
            sequence_id,
            timestamp_ns,
            result: result.clone(),
        });
    }

    fn on_capture_failed(&self, sequence_id: SequenceId, reason: FailureReason) {
        self.push(CaptureEvent::Failed {
            sequence_id,
            reason,
        });
    }

    fn on_capture_sequence_completed(&self, sequence_id: SequenceId) {
        self.push(CaptureEvent::SequenceCompleted { sequence_id });
    }

    fn on_capture_sequence_aborted(&self, sequence_id: SequenceId) {
        self.push(CaptureEvent::SequenceAborted { sequence_id });
    }
}
