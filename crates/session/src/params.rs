//! Pending capture parameters.
//!
//! `setParameters` writes into the store; every submitted request takes a
//! snapshot. Both happen under one lock, so a snapshot sees either all or
//! none of a concurrent `set`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use efv_metadata::{
    CaptureRequest, ExtensionCapabilities, MetadataValue, RequestKey, RequestSnapshot,
};

/// Thread-safe table of pending request parameters.
#[derive(Debug)]
pub struct ParameterStore {
    capabilities: Arc<ExtensionCapabilities>,
    entries: Mutex<BTreeMap<RequestKey, MetadataValue>>,
}

impl ParameterStore {
    pub fn new(capabilities: Arc<ExtensionCapabilities>) -> Self {
        Self {
            capabilities,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Insert or overwrite every supported entry of `request`.
    ///
    /// Keys outside the published request set are ignored. Returns the
    /// number of entries applied.
    pub fn set(&self, request: &CaptureRequest) -> usize {
        let mut entries = self.lock();
        let mut applied = 0;
        for (key, value) in request.iter() {
            if self.capabilities.supports_request_key(key) {
                entries.insert(key, value.clone());
                applied += 1;
            } else {
                tracing::debug!(key = %key, "Ignoring unsupported request parameter");
            }
        }
        applied
    }

    /// Copy the current parameters into an immutable snapshot.
    pub fn snapshot(&self) -> RequestSnapshot {
        self.lock()
            .iter()
            .map(|(key, value)| (*key, value.clone()))
            .collect()
    }

    /// Drop every stored parameter.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<RequestKey, MetadataValue>> {
        // The map is never left half-written, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keep only the entries of `request` the extension publishes.
///
/// Used for trigger requests, which bypass the persistent store.
pub fn filter_supported(
    request: &CaptureRequest,
    capabilities: &ExtensionCapabilities,
) -> RequestSnapshot {
    request
        .iter()
        .filter(|(key, _)| capabilities.supports_request_key(*key))
        .map(|(key, value)| (key, value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use efv_metadata::{Rect, StabilizationMode};
    use std::thread;

    fn store() -> ParameterStore {
        ParameterStore::new(Arc::new(ExtensionCapabilities::eyes_free(
            Rect::from_size(4000, 3000),
        )))
    }

    #[test]
    fn test_set_ignores_unsupported_keys() {
        let store = store();
        let applied = store.set(
            &CaptureRequest::new()
                .with(RequestKey::EfvAutoZoom, true)
                .with(RequestKey::FlashMode, 1),
        );
        assert_eq!(applied, 1);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(RequestKey::EfvAutoZoom));
        assert!(!snapshot.contains(RequestKey::FlashMode));
    }

    #[test]
    fn test_set_overwrites_and_snapshot_does_not_mutate() {
        let store = store();
        store.set(&CaptureRequest::new().with(RequestKey::JpegQuality, 80));
        let before = store.snapshot();
        store.set(&CaptureRequest::new().with(RequestKey::JpegQuality, 95));
        let after = store.snapshot();

        assert_eq!(
            before.get(RequestKey::JpegQuality),
            Some(&MetadataValue::Int(80))
        );
        assert_eq!(
            after.get(RequestKey::JpegQuality),
            Some(&MetadataValue::Int(95))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear() {
        let store = store();
        store.set(&CaptureRequest::new().with(RequestKey::EfvRotateViewport, 10.0f32));
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_filter_supported_drops_unknown_keys() {
        let caps = ExtensionCapabilities::eyes_free(Rect::from_size(100, 100));
        let request = CaptureRequest::new()
            .with(RequestKey::ControlAfTrigger, 1)
            .with(RequestKey::ControlAeMode, 0);
        let snapshot = filter_supported(&request, &caps);
        let keys: Vec<_> = snapshot.keys().collect();
        assert_eq!(keys, vec![RequestKey::ControlAfTrigger]);
    }

    #[test]
    fn test_snapshot_never_mixes_concurrent_sets() {
        // Every set writes the same generation number to both keys; a
        // snapshot must never observe two different generations.
        let store = Arc::new(store());
        store.set(
            &CaptureRequest::new()
                .with(RequestKey::JpegQuality, 0)
                .with(RequestKey::JpegOrientation, 0),
        );

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for generation in 1..2000 {
                    store.set(
                        &CaptureRequest::new()
                            .with(RequestKey::JpegQuality, generation)
                            .with(RequestKey::JpegOrientation, generation),
                    );
                }
            })
        };

        for _ in 0..2000 {
            let snapshot = store.snapshot();
            assert_eq!(
                snapshot.get(RequestKey::JpegQuality),
                snapshot.get(RequestKey::JpegOrientation)
            );
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_structured_values_are_stored_verbatim() {
        let store = store();
        let mode = StabilizationMode::Locked.to_value();
        store.set(
            &CaptureRequest::new()
                .with(RequestKey::EfvStabilizationMode, mode.clone())
                .with(RequestKey::EfvTranslateViewport, MetadataValue::IntPair(4, -2)),
        );
        let snapshot = store.snapshot();
        assert_eq!(snapshot.get(RequestKey::EfvStabilizationMode), Some(&mode));
        assert_eq!(
            snapshot.get(RequestKey::EfvTranslateViewport),
            Some(&MetadataValue::IntPair(4, -2))
        );
    }
}
