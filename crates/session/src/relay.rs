//! Single-slot preview frame relay.
//!
//! Frames arrive from the internal image source and are forwarded to the
//! client's preview surface by a dedicated worker thread. At most one frame
//! is in flight: a frame that arrives while the worker is busy is released
//! immediately. The producer never blocks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use efv_common::error::{EfvError, EfvResult};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::surface::{ImageAvailableListener, ImageBuffer, ImageSource, SharedWriter};

/// Outcome of offering a frame to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The frame was handed to the worker.
    Accepted,
    /// The relay was busy or stopped; the frame was released.
    Dropped,
}

/// Counters collected over the relay's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Frames queued into the output surface.
    pub forwarded: u64,
    /// Frames released because another frame was in flight.
    pub dropped: u64,
    /// Frames the output surface refused.
    pub failed: u64,
}

impl RelayStats {
    /// Drop rate as a percentage of frames offered.
    pub fn drop_rate(&self) -> f64 {
        let total = self.forwarded + self.dropped + self.failed;
        if total == 0 {
            return 0.0;
        }
        self.dropped as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Default)]
struct Counters {
    forwarded: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

type FrameSender = mpsc::Sender<Box<dyn ImageBuffer>>;

/// Relays preview frames from an image source into a [`SharedWriter`].
pub struct FrameRelay {
    busy: Arc<AtomicBool>,
    sender: Mutex<Option<FrameSender>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl FrameRelay {
    /// Spawn the worker thread and return a relay ready to accept frames.
    pub fn start(writer: SharedWriter, thread_name: &str) -> EfvResult<Self> {
        let (sender, mut receiver) = mpsc::channel::<Box<dyn ImageBuffer>>(1);
        let busy = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let worker = {
            let busy = Arc::clone(&busy);
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name(thread_name.to_string())
                .spawn(move || {
                    tracing::debug!("Frame relay worker started");
                    while let Some(image) = receiver.blocking_recv() {
                        let forwarded = forward(&writer, image);
                        busy.store(false, Ordering::Release);
                        if forwarded {
                            counters.forwarded.fetch_add(1, Ordering::Release);
                        } else {
                            counters.failed.fetch_add(1, Ordering::Release);
                        }
                    }
                    tracing::debug!("Frame relay worker exiting");
                })
                .map_err(|e| EfvError::relay(format!("Failed to spawn relay worker: {e}")))?
        };

        tracing::info!(thread = thread_name, "Frame relay started");

        Ok(Self {
            busy,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            counters,
        })
    }

    /// Hand a frame to the worker, or release it if one is already in flight.
    pub fn offer(&self, image: Box<dyn ImageBuffer>) -> Offer {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                timestamp_ns = image.timestamp_ns(),
                "Dropping frame due to ongoing processing"
            );
            return Offer::Dropped;
        }

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sent = match sender.as_ref() {
            Some(tx) => tx.try_send(image).is_ok(),
            None => false,
        };
        if sent {
            Offer::Accepted
        } else {
            // Stopped worker: the rejected frame was released inside the error.
            self.busy.store(false, Ordering::Release);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Frame relay stopped, dropping frame");
            Offer::Dropped
        }
    }

    /// Whether a frame is currently being forwarded.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            forwarded: self.counters.forwarded.load(Ordering::Acquire),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Acquire),
        }
    }

    /// Stop accepting frames, let the in-flight frame finish, and join the
    /// worker. Safe to call more than once.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!("Frame relay worker panicked");
            }
            tracing::info!(stats = ?self.stats(), "Frame relay stopped");
        }
    }
}

impl ImageAvailableListener for FrameRelay {
    fn on_image_available(&self, source: &dyn ImageSource) {
        if let Some(image) = source.acquire_next_image() {
            self.offer(image);
        }
    }
}

impl Drop for FrameRelay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Queue `image` into the writer and release it. Returns whether it was queued.
fn forward(writer: &SharedWriter, image: Box<dyn ImageBuffer>) -> bool {
    let result = writer.queue(image.as_ref());
    drop(image);
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Output surface likely abandoned, dropping buffer");
            false
        }
    }
}
