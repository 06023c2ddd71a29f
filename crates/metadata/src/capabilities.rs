//! Vendor-published capability sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::keys::{RequestKey, ResultKey};

/// What a camera extension accepts and reports.
///
/// Static for the lifetime of a session: built once when the extender is
/// initialized for a camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionCapabilities {
    /// Keys a client may set on requests.
    pub request_keys: BTreeSet<RequestKey>,

    /// Keys that may appear in delivered results.
    pub result_keys: BTreeSet<ResultKey>,

    /// Sensor active pixel array.
    pub active_array: Rect,
}

impl ExtensionCapabilities {
    /// Capability sets of the eyes-free videography extension.
    pub fn eyes_free(active_array: Rect) -> Self {
        let request_keys = [
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
        ];
        let result_keys = [
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
        ];

        Self {
            request_keys: request_keys.into_iter().collect(),
            result_keys: result_keys.into_iter().collect(),
            active_array,
        }
    }

    pub fn supports_request_key(&self, key: RequestKey) -> bool {
        self.request_keys.contains(&key)
    }

    pub fn supports_result_key(&self, key: ResultKey) -> bool {
        self.result_keys.contains(&key)
    }
}
