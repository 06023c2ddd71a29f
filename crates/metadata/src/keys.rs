//! Request and result key vocabulary.
//!
//! Keys carry a stable dotted name used in logs and CLI output. Not every
//! key is published by the extension; which keys are usable is decided by
//! [`crate::ExtensionCapabilities`].

use serde::{Deserialize, Serialize};

/// A key that may appear in a capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKey {
    ControlZoomRatio,
    ControlAfMode,
    ControlAfRegions,
    ControlAfTrigger,
    JpegQuality,
    JpegOrientation,
    EfvPaddingZoomFactor,
    EfvAutoZoom,
    EfvMaxPaddingZoomFactor,
    EfvStabilizationMode,
    EfvTranslateViewport,
    EfvRotateViewport,
    ControlAeMode,
    FlashMode,
    NoiseReductionMode,
}

/// A key that may appear in a capture result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKey {
    ControlZoomRatio,
    ControlAfMode,
    ControlAfRegions,
    ControlAfTrigger,
    ControlAfState,
    JpegQuality,
    JpegOrientation,
    EfvPaddingRegion,
    EfvAutoZoom,
    EfvMaxPaddingZoomFactor,
    EfvAutoZoomPaddingRegion,
    EfvStabilizationMode,
    EfvTargetCoordinates,
    EfvPaddingZoomFactor,
    EfvTranslateViewport,
    EfvRotateViewport,
    SensorTimestamp,
    SensorFrameDuration,
}

impl RequestKey {
    /// Every request key known to the model.
    pub const ALL: [RequestKey; 15] = [
        RequestKey::ControlZoomRatio,
        RequestKey::ControlAfMode,
        RequestKey::ControlAfRegions,
        RequestKey::ControlAfTrigger,
        RequestKey::JpegQuality,
        RequestKey::JpegOrientation,
        RequestKey::EfvPaddingZoomFactor,
        RequestKey::EfvAutoZoom,
        RequestKey::EfvMaxPaddingZoomFactor,
        RequestKey::EfvStabilizationMode,
        RequestKey::EfvTranslateViewport,
        RequestKey::EfvRotateViewport,
        RequestKey::ControlAeMode,
        RequestKey::FlashMode,
        RequestKey::NoiseReductionMode,
    ];

    /// Stable dotted name.
    pub fn name(self) -> &'static str {
        match self {
            RequestKey::ControlZoomRatio => "control.zoomRatio",
            RequestKey::ControlAfMode => "control.afMode",
            RequestKey::ControlAfRegions => "control.afRegions",
            RequestKey::ControlAfTrigger => "control.afTrigger",
            RequestKey::JpegQuality => "jpeg.quality",
            RequestKey::JpegOrientation => "jpeg.orientation",
            RequestKey::EfvPaddingZoomFactor => "efv.paddingZoomFactor",
            RequestKey::EfvAutoZoom => "efv.autoZoom",
            RequestKey::EfvMaxPaddingZoomFactor => "efv.maxPaddingZoomFactor",
            RequestKey::EfvStabilizationMode => "efv.stabilizationMode",
            RequestKey::EfvTranslateViewport => "efv.translateViewport",
            RequestKey::EfvRotateViewport => "efv.rotateViewport",
            RequestKey::ControlAeMode => "control.aeMode",
            RequestKey::FlashMode => "flash.mode",
            RequestKey::NoiseReductionMode => "noiseReduction.mode",
        }
    }

    /// Look a key up by its dotted name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }
}

impl ResultKey {
    /// Every result key known to the model.
    pub const ALL: [ResultKey; 18] = [
        ResultKey::ControlZoomRatio,
        ResultKey::ControlAfMode,
        ResultKey::ControlAfRegions,
        ResultKey::ControlAfTrigger,
        ResultKey::ControlAfState,
        ResultKey::JpegQuality,
        ResultKey::JpegOrientation,
        ResultKey::EfvPaddingRegion,
        ResultKey::EfvAutoZoom,
        ResultKey::EfvMaxPaddingZoomFactor,
        ResultKey::EfvAutoZoomPaddingRegion,
        ResultKey::EfvStabilizationMode,
        ResultKey::EfvTargetCoordinates,
        ResultKey::EfvPaddingZoomFactor,
        ResultKey::EfvTranslateViewport,
        ResultKey::EfvRotateViewport,
        ResultKey::SensorTimestamp,
        ResultKey::SensorFrameDuration,
    ];

    /// Stable dotted name.
    pub fn name(self) -> &'static str {
        match self {
            ResultKey::ControlZoomRatio => "control.zoomRatio",
            ResultKey::ControlAfMode => "control.afMode",
            ResultKey::ControlAfRegions => "control.afRegions",
            ResultKey::ControlAfTrigger => "control.afTrigger",
            ResultKey::ControlAfState => "control.afState",
            ResultKey::JpegQuality => "jpeg.quality",
            ResultKey::JpegOrientation => "jpeg.orientation",
            ResultKey::EfvPaddingRegion => "efv.paddingRegion",
            ResultKey::EfvAutoZoom => "efv.autoZoom",
            ResultKey::EfvMaxPaddingZoomFactor => "efv.maxPaddingZoomFactor",
            ResultKey::EfvAutoZoomPaddingRegion => "efv.autoZoomPaddingRegion",
            ResultKey::EfvStabilizationMode => "efv.stabilizationMode",
            ResultKey::EfvTargetCoordinates => "efv.targetCoordinates",
            ResultKey::EfvPaddingZoomFactor => "efv.paddingZoomFactor",
            ResultKey::EfvTranslateViewport => "efv.translateViewport",
            ResultKey::EfvRotateViewport => "efv.rotateViewport",
            ResultKey::SensorTimestamp => "sensor.timestamp",
            ResultKey::SensorFrameDuration => "sensor.frameDuration",
        }
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::fmt::Display for ResultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
