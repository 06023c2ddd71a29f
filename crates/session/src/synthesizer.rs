//! Derived result synthesis.
//!
//! Turns a completed low-level capture result plus the parameters the
//! request was submitted with into the metadata bundle delivered to the
//! client. Composite keys only appear when their parameter combination was
//! present in the request snapshot.

use std::sync::Arc;

use efv_metadata::{
    CaptureResult, ExtensionCapabilities, MetadataValue, PointF, Rect, RequestKey,
    RequestSnapshot, ResultBundle, ResultKey, StabilizationMode,
};

/// Padding region reported while stabilization is locked.
pub const SAMPLE_PADDING_REGION: [i32; 4] = [5, 5, 5, 5];

/// Padding region reported while auto-zoom runs with locked stabilization.
pub const SAMPLE_AUTO_ZOOM_PADDING_REGION: [i32; 4] = [3, 3, 3, 3];

/// Half-width of the target square around the active array center.
pub const TARGET_HALF_EXTENT: i32 = 5;

/// Builds [`ResultBundle`]s for one session's capabilities.
#[derive(Debug, Clone)]
pub struct ResultSynthesizer {
    capabilities: Arc<ExtensionCapabilities>,
}

impl ResultSynthesizer {
    pub fn new(capabilities: Arc<ExtensionCapabilities>) -> Self {
        Self { capabilities }
    }

    /// Derive the client-facing bundle.
    ///
    /// Callers only invoke this for results that carry a sensor timestamp.
    pub fn synthesize(&self, snapshot: &RequestSnapshot, result: &CaptureResult) -> ResultBundle {
        let mut bundle = ResultBundle::new();

        for (key, value) in result.iter() {
            if self.capabilities.supports_result_key(key) {
                bundle.set(key, value.clone());
            }
        }

        let auto_zoom = snapshot
            .get(RequestKey::EfvAutoZoom)
            .and_then(MetadataValue::as_bool)
            .unwrap_or(false);
        if auto_zoom {
            bundle.set(ResultKey::EfvAutoZoom, true);
            if let Some(max) = snapshot.get(RequestKey::EfvMaxPaddingZoomFactor) {
                bundle.set(ResultKey::EfvMaxPaddingZoomFactor, max.clone());
            }
        }

        for (request_key, result_key) in [
            (RequestKey::EfvPaddingZoomFactor, ResultKey::EfvPaddingZoomFactor),
            (RequestKey::EfvTranslateViewport, ResultKey::EfvTranslateViewport),
            (RequestKey::EfvRotateViewport, ResultKey::EfvRotateViewport),
        ] {
            if let Some(value) = snapshot.get(request_key) {
                bundle.set(result_key, value.clone());
            }
        }

        let locked = snapshot
            .get(RequestKey::EfvStabilizationMode)
            .and_then(StabilizationMode::from_value)
            == Some(StabilizationMode::Locked);
        if locked {
            bundle.set(
                ResultKey::EfvPaddingRegion,
                MetadataValue::IntArray(SAMPLE_PADDING_REGION.to_vec()),
            );
            bundle.set(
                ResultKey::EfvTargetCoordinates,
                MetadataValue::Points(target_coordinates(&self.capabilities.active_array)),
            );
        }

        if auto_zoom && locked {
            bundle.set(
                ResultKey::EfvAutoZoomPaddingRegion,
                MetadataValue::IntArray(SAMPLE_AUTO_ZOOM_PADDING_REGION.to_vec()),
            );
        }

        bundle
    }
}

/// Corners of a small square centered on the active array, clockwise from
/// the top-left.
pub fn target_coordinates(active_array: &Rect) -> Vec<PointF> {
    let cx = active_array.width() / 2;
    let cy = active_array.height() / 2;
    let d = TARGET_HALF_EXTENT;
    [
        (cx - d, cy - d),
        (cx + d, cy - d),
        (cx + d, cy + d),
        (cx - d, cy + d),
    ]
    .into_iter()
    .map(|(x, y)| PointF::new(x as f32, y as f32))
    .collect()
}
