//! Metadata values and the containers that carry them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{PointF, Rect};
use crate::keys::{RequestKey, ResultKey};

/// A capability-typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    IntPair(i32, i32),
    IntArray(Vec<i32>),
    Regions(Vec<Rect>),
    Points(Vec<PointF>),
}

impl MetadataValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            MetadataValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            MetadataValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Long(v)
    }
}

impl From<f32> for MetadataValue {
    fn from(v: f32) -> Self {
        MetadataValue::Float(v)
    }
}

/// Stabilization modes of the eyes-free extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilizationMode {
    Off,
    Gimbal,
    Locked,
}

impl StabilizationMode {
    /// Decode the integer carried by `efv.stabilizationMode`.
    pub fn from_value(value: &MetadataValue) -> Option<Self> {
        match value.as_int()? {
            0 => Some(StabilizationMode::Off),
            1 => Some(StabilizationMode::Gimbal),
            2 => Some(StabilizationMode::Locked),
            _ => None,
        }
    }

    pub fn to_value(self) -> MetadataValue {
        MetadataValue::Int(match self {
            StabilizationMode::Off => 0,
            StabilizationMode::Gimbal => 1,
            StabilizationMode::Locked => 2,
        })
    }
}

impl std::str::FromStr for StabilizationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(StabilizationMode::Off),
            "gimbal" => Ok(StabilizationMode::Gimbal),
            "locked" => Ok(StabilizationMode::Locked),
            other => Err(format!("unknown stabilization mode: {other}")),
        }
    }
}

/// An ordered key/value metadata map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata<K: Ord> {
    entries: BTreeMap<K, MetadataValue>,
}

/// Parameters supplied by a client with `setParameters` or a trigger.
pub type CaptureRequest = Metadata<RequestKey>;

/// A low-level result reported by the capture stack.
pub type CaptureResult = Metadata<ResultKey>;

/// Derived metadata delivered to the client for a completed capture.
pub type ResultBundle = Metadata<ResultKey>;

impl<K: Ord> Default for Metadata<K> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy> Metadata<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: K, value: impl Into<MetadataValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or overwrite a value.
    pub fn set(&mut self, key: K, value: impl Into<MetadataValue>) {
        self.entries.insert(key, value.into());
    }

    pub fn get(&self, key: K) -> Option<&MetadataValue> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &MetadataValue)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CaptureResult {
    /// The sensor timestamp, when the result carries a valid one.
    pub fn sensor_timestamp(&self) -> Option<i64> {
        self.get(ResultKey::SensorTimestamp)
            .and_then(MetadataValue::as_long)
    }
}

/// One captured request parameter.
pub type ParameterEntry = (RequestKey, MetadataValue);

/// An immutable, ordered copy of the parameters a request was built with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestSnapshot {
    entries: Vec<ParameterEntry>,
}

impl RequestSnapshot {
    pub fn entries(&self) -> &[ParameterEntry] {
        &self.entries
    }

    /// First value recorded for `key`.
    pub fn get(&self, key: RequestKey) -> Option<&MetadataValue> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, key: RequestKey) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = RequestKey> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ParameterEntry> for RequestSnapshot {
    fn from_iter<I: IntoIterator<Item = ParameterEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stabilization_mode_codes() {
        for mode in [
            StabilizationMode::Off,
            StabilizationMode::Gimbal,
            StabilizationMode::Locked,
        ] {
            assert_eq!(StabilizationMode::from_value(&mode.to_value()), Some(mode));
        }
        assert_eq!(StabilizationMode::from_value(&MetadataValue::Int(7)), None);
        assert_eq!(
            StabilizationMode::from_value(&MetadataValue::Bool(true)),
            None
        );
        assert_eq!("LOCKED".parse(), Ok(StabilizationMode::Locked));
    }

    #[test]
    fn test_metadata_overwrites_and_orders_keys() {
        let request = CaptureRequest::new()
            .with(RequestKey::EfvRotateViewport, 15.0f32)
            .with(RequestKey::EfvAutoZoom, true)
            .with(RequestKey::EfvAutoZoom, false);
        assert_eq!(request.len(), 2);
        assert_eq!(
            request.get(RequestKey::EfvAutoZoom),
            Some(&MetadataValue::Bool(false))
        );
        let keys: Vec<_> = request.keys().collect();
        assert_eq!(
            keys,
            vec![RequestKey::EfvAutoZoom, RequestKey::EfvRotateViewport]
        );
    }

    #[test]
    fn test_sensor_timestamp_requires_long() {
        let result = CaptureResult::new().with(ResultKey::SensorTimestamp, 1000i64);
        assert_eq!(result.sensor_timestamp(), Some(1000));
        let wrong_type = CaptureResult::new().with(ResultKey::SensorTimestamp, 1000i32);
        assert_eq!(wrong_type.sensor_timestamp(), None);
        assert_eq!(CaptureResult::new().sensor_timestamp(), None);
    }

    #[test]
    fn test_metadata_json_uses_key_names() {
        let bundle = ResultBundle::new().with(ResultKey::EfvAutoZoom, true);
        let json = serde_json::to_string(&bundle).unwrap();
        assert_eq!(json, r#"{"efv_auto_zoom":{"type":"bool","value":true}}"#);
    }

    #[test]
    fn test_snapshot_lookup() {
        let snapshot: RequestSnapshot = vec![
            (RequestKey::EfvAutoZoom, MetadataValue::Bool(true)),
            (RequestKey::JpegQuality, MetadataValue::Int(90)),
        ]
        .into_iter()
        .collect();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(RequestKey::JpegQuality));
        assert!(!snapshot.contains(RequestKey::FlashMode));
    }
}
