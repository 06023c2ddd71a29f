//! Extension selection and capability publication.

use std::sync::Arc;

use efv_common::error::{EfvError, EfvResult};
use efv_metadata::{ExtensionCapabilities, ImageFormat, Rect, Size};
use serde::{Deserialize, Serialize};

use crate::session::{ExtensionSession, SessionConfig, SessionState};
use crate::surface::SurfaceProvider;

/// Extension requested by the camera framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtenderKind {
    EyesFreeVideography,
    /// Any extension this service does not implement.
    Unsupported,
}

impl std::str::FromStr for ExtenderKind {
    type Err = EfvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eyes_free" | "eyes-free" | "eyes_free_videography" => Ok(Self::EyesFreeVideography),
            "unsupported" => Ok(Self::Unsupported),
            other => Err(EfvError::config(format!("unknown extension: {other}"))),
        }
    }
}

/// Output sizes a camera offers for one format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfiguration {
    pub format: ImageFormat,
    pub sizes: Vec<Size>,
}

/// The camera properties an extender is initialized with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraCharacteristics {
    pub active_array: Rect,
    pub stream_configurations: Vec<StreamConfiguration>,
}

impl CameraCharacteristics {
    /// Sizes for each of `formats` the camera lists, in the order given.
    pub fn filter_output_resolutions(&self, formats: &[ImageFormat]) -> Vec<StreamConfiguration> {
        formats
            .iter()
            .filter_map(|format| {
                self.stream_configurations
                    .iter()
                    .find(|config| config.format == *format)
                    .cloned()
            })
            .collect()
    }
}

/// An extension implementation offered to the camera framework.
pub trait AdvancedExtender: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_extension_available(&self, camera_id: &str) -> bool;

    fn initialize(&mut self, camera_id: &str, characteristics: CameraCharacteristics)
        -> EfvResult<()>;

    fn supported_preview_resolutions(&self) -> EfvResult<Vec<StreamConfiguration>>;

    fn supported_capture_resolutions(&self) -> EfvResult<Vec<StreamConfiguration>>;

    fn capabilities(&self) -> EfvResult<Arc<ExtensionCapabilities>>;

    fn create_session(
        &self,
        provider: Arc<dyn SurfaceProvider>,
        config: SessionConfig,
    ) -> EfvResult<ExtensionSession>;
}

/// Return the extender implementing `kind`.
pub fn select_extender(kind: ExtenderKind) -> Box<dyn AdvancedExtender> {
    match kind {
        ExtenderKind::EyesFreeVideography => Box::new(EyesFreeExtender::default()),
        ExtenderKind::Unsupported => Box::new(UnsupportedExtender),
    }
}

/// Eyes-free videography extender. Available on every camera.
#[derive(Debug, Default)]
pub struct EyesFreeExtender {
    camera_id: Option<String>,
    characteristics: Option<CameraCharacteristics>,
}

impl EyesFreeExtender {
    const PREVIEW_FORMATS: [ImageFormat; 2] = [ImageFormat::Yuv420_888, ImageFormat::Private];
    const CAPTURE_FORMATS: [ImageFormat; 2] = [ImageFormat::Yuv420_888, ImageFormat::Jpeg];

    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    fn characteristics(&self, operation: &'static str) -> EfvResult<&CameraCharacteristics> {
        self.characteristics
            .as_ref()
            .ok_or_else(|| EfvError::invalid_state(operation, SessionState::Uninitialized))
    }
}

impl AdvancedExtender for EyesFreeExtender {
    fn name(&self) -> &'static str {
        "eyes_free_videography"
    }

    fn is_extension_available(&self, _camera_id: &str) -> bool {
        true
    }

    fn initialize(
        &mut self,
        camera_id: &str,
        characteristics: CameraCharacteristics,
    ) -> EfvResult<()> {
        tracing::info!(
            camera_id,
            active_array = ?characteristics.active_array,
            "Initializing eyes-free extender"
        );
        self.camera_id = Some(camera_id.to_string());
        self.characteristics = Some(characteristics);
        Ok(())
    }

    fn supported_preview_resolutions(&self) -> EfvResult<Vec<StreamConfiguration>> {
        Ok(self
            .characteristics("supported_preview_resolutions")?
            .filter_output_resolutions(&Self::PREVIEW_FORMATS))
    }

    fn supported_capture_resolutions(&self) -> EfvResult<Vec<StreamConfiguration>> {
        Ok(self
            .characteristics("supported_capture_resolutions")?
            .filter_output_resolutions(&Self::CAPTURE_FORMATS))
    }

    fn capabilities(&self) -> EfvResult<Arc<ExtensionCapabilities>> {
        let characteristics = self.characteristics("capabilities")?;
        Ok(Arc::new(ExtensionCapabilities::eyes_free(
            characteristics.active_array,
        )))
    }

    fn create_session(
        &self,
        provider: Arc<dyn SurfaceProvider>,
        config: SessionConfig,
    ) -> EfvResult<ExtensionSession> {
        Ok(ExtensionSession::new(self.capabilities()?, provider, config))
    }
}

/// Placeholder for extensions this service does not implement.
#[derive(Debug, Default)]
pub struct UnsupportedExtender;

impl UnsupportedExtender {
    fn unsupported<T>() -> EfvResult<T> {
        Err(EfvError::unsupported("Extension not supported"))
    }
}

impl AdvancedExtender for UnsupportedExtender {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn is_extension_available(&self, _camera_id: &str) -> bool {
        false
    }

    fn initialize(&mut self, _camera_id: &str, _: CameraCharacteristics) -> EfvResult<()> {
        Self::unsupported()
    }

    fn supported_preview_resolutions(&self) -> EfvResult<Vec<StreamConfiguration>> {
        Self::unsupported()
    }

    fn supported_capture_resolutions(&self) -> EfvResult<Vec<StreamConfiguration>> {
        Self::unsupported()
    }

    fn capabilities(&self) -> EfvResult<Arc<ExtensionCapabilities>> {
        Self::unsupported()
    }

    fn create_session(
        &self,
        _provider: Arc<dyn SurfaceProvider>,
        _config: SessionConfig,
    ) -> EfvResult<ExtensionSession> {
        Self::unsupported()
    }
}
