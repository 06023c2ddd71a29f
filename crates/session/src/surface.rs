//! Image buffer, image source, and output surface contracts.
//!
//! Buffers are owned values: acquiring one from an [`ImageSource`] moves
//! it to the caller, and dropping it returns it to its producer. Ownership
//! guarantees every buffer is released exactly once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use efv_common::error::{EfvError, EfvResult};
use efv_metadata::{ImageFormat, Size};
use serde::{Deserialize, Serialize};

/// Opaque handle of a surface known to the capture stack.
pub type SurfaceId = u64;

/// An in-flight image buffer. Dropping it releases the buffer.
pub trait ImageBuffer: Send {
    fn timestamp_ns(&self) -> i64;

    fn size(&self) -> Size;

    fn format(&self) -> ImageFormat;
}

/// Notified on the producer's context whenever a new image is queued.
pub trait ImageAvailableListener: Send + Sync {
    fn on_image_available(&self, source: &dyn ImageSource);
}

/// A bounded queue of images produced by the camera.
pub trait ImageSource: Send + Sync {
    /// Surface the camera writes into.
    fn surface_id(&self) -> SurfaceId;

    /// Take ownership of the oldest queued image.
    fn acquire_next_image(&self) -> Option<Box<dyn ImageBuffer>>;

    fn set_listener(&self, listener: Option<Arc<dyn ImageAvailableListener>>);

    /// Release the source and every image still queued. Idempotent.
    fn close(&self);
}

/// Writes images into a client surface.
pub trait OutputWriter: Send {
    /// Queue a copy of `image` for presentation.
    fn queue_input_image(&mut self, image: &dyn ImageBuffer) -> EfvResult<()>;

    fn close(&mut self);
}

/// Describes one output endpoint offered at session initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSurfaceConfig {
    /// `None` when the client did not request this output.
    pub surface: Option<SurfaceId>,
    pub size: Size,
    pub format: ImageFormat,
    pub usage: u64,
}

impl OutputSurfaceConfig {
    pub fn new(surface: SurfaceId, size: Size, format: ImageFormat) -> Self {
        Self {
            surface: Some(surface),
            size,
            format,
            usage: 0,
        }
    }

    /// An output the client did not request.
    pub fn absent() -> Self {
        Self {
            surface: None,
            size: Size::new(0, 0),
            format: ImageFormat::Private,
            usage: 0,
        }
    }

    pub fn is_present(&self) -> bool {
        self.surface.is_some()
    }
}

/// Creates the buffers and writers a session needs.
pub trait SurfaceProvider: Send + Sync {
    fn create_image_source(
        &self,
        size: Size,
        format: ImageFormat,
        max_images: usize,
        usage: u64,
    ) -> EfvResult<Arc<dyn ImageSource>>;

    fn open_writer(
        &self,
        surface: SurfaceId,
        format: ImageFormat,
        max_images: usize,
    ) -> EfvResult<Box<dyn OutputWriter>>;
}

/// The preview output writer, shared by the session and the relay worker.
#[derive(Clone, Default)]
pub struct SharedWriter {
    inner: Arc<Mutex<Option<Box<dyn OutputWriter>>>>,
}

impl SharedWriter {
    pub fn install(&self, writer: Box<dyn OutputWriter>) {
        if let Some(mut previous) = self.lock().replace(writer) {
            previous.close();
        }
    }

    /// Queue an image, failing if the writer was released or rejects it.
    pub fn queue(&self, image: &dyn ImageBuffer) -> EfvResult<()> {
        match self.lock().as_mut() {
            Some(writer) => writer.queue_input_image(image),
            None => Err(EfvError::surface("output writer already released")),
        }
    }

    /// Close and drop the writer. Returns false if there was none.
    pub fn release(&self) -> bool {
        match self.lock().take() {
            Some(mut writer) => {
                writer.close();
                true
            }
            None => false,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn OutputWriter>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedWriter")
            .field("installed", &self.is_installed())
            .finish()
    }
}
