//! Data-layer protocol shared by the face and the companion.
//!
//! Both directions use a single channel path. A data item is a flat map of
//! typed values; a change notification carries the path, whether the item
//! changed or was deleted, and the item's map.
//!
//! Also defines the JSON frames used when the link runs over a WebSocket
//! relay (see `transport::ws`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Channel path for weather requests (face → companion) and updates
/// (companion → face).
pub const WEATHER_PATH: &str = "/weather";

pub const HIGH_KEY: &str = "high";
pub const LOW_KEY: &str = "low";
pub const WEATHER_ID_KEY: &str = "weatherId";
pub const UUID_KEY: &str = "uuid";

/// A single value inside a [`DataMap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Key/value payload of a data item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataMap(BTreeMap<String, DataValue>);

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_int(&mut self, key: &str, value: i64) {
        self.0.insert(key.to_string(), DataValue::Int(value));
    }

    pub fn put_string(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), DataValue::Text(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.0.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(DataValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Read a required 32-bit integer.
    pub fn get_i32(&self, key: &'static str) -> Result<i32, DecodeError> {
        match self.0.get(key) {
            Some(DataValue::Int(v)) => {
                i32::try_from(*v).map_err(|_| DecodeError::OutOfRange { key, value: *v })
            }
            Some(_) => Err(DecodeError::NotAnInteger(key)),
            None => Err(DecodeError::MissingKey(key)),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Whether a data item was written or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataEventKind {
    Changed,
    Deleted,
}

/// One change notification delivered by the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEvent {
    pub kind: DataEventKind,
    pub path: String,
    #[serde(default)]
    pub data: DataMap,
}

impl DataEvent {
    pub fn changed(path: impl Into<String>, data: DataMap) -> Self {
        Self {
            kind: DataEventKind::Changed,
            path: path.into(),
            data,
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            kind: DataEventKind::Deleted,
            path: path.into(),
            data: DataMap::new(),
        }
    }

    pub fn is_changed(&self) -> bool {
        self.kind == DataEventKind::Changed
    }
}

/// Change notifications are delivered in batches.
pub type DataEventBatch = Vec<DataEvent>;

// ---------------------------------------------------------------------------
// WebSocket relay frames
// ---------------------------------------------------------------------------

/// A JSON frame exchanged with a companion relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Write a data item (outbound).
    Put { path: String, data: DataMap },
    /// A batch of change notifications (inbound).
    DataChanged { events: Vec<DataEvent> },
}

impl Frame {
    /// Serialize to a JSON string for transmission.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_i32_reports_missing_and_mistyped_keys() {
        let mut map = DataMap::new();
        map.put_string(HIGH_KEY, "75");
        assert_eq!(map.get_i32(HIGH_KEY), Err(DecodeError::NotAnInteger(HIGH_KEY)));
        assert_eq!(map.get_i32(LOW_KEY), Err(DecodeError::MissingKey(LOW_KEY)));
    }

    #[test]
    fn get_i32_rejects_values_outside_i32() {
        let mut map = DataMap::new();
        map.put_int(HIGH_KEY, i64::from(i32::MAX) + 1);
        assert!(matches!(
            map.get_i32(HIGH_KEY),
            Err(DecodeError::OutOfRange { key: HIGH_KEY, .. })
        ));
    }

    #[test]
    fn inbound_frame_parses_from_relay_json() {
        let json = r#"{
            "type": "data_changed",
            "events": [
                {"kind": "changed", "path": "/weather", "data": {"high": 75, "low": 58, "weatherId": 802}},
                {"kind": "deleted", "path": "/weather"}
            ]
        }"#;
        let frame: Frame = serde_json::from_str(json).expect("parse frame");
        let Frame::DataChanged { events } = frame else {
            panic!("expected data_changed frame");
        };
        assert_eq!(events.len(), 2);
        assert!(events[0].is_changed());
        assert_eq!(events[0].data.get_i32(WEATHER_ID_KEY), Ok(802));
        assert_eq!(events[1].kind, DataEventKind::Deleted);
        assert!(events[1].data.is_empty());
    }

    #[test]
    fn put_frame_serializes_with_type_tag() {
        let mut data = DataMap::new();
        data.put_string(UUID_KEY, "abc");
        let json = Frame::Put {
            path: WEATHER_PATH.to_string(),
            data,
        }
        .to_json();
        assert!(json.contains(r#""type":"put""#), "got {json}");
        assert!(json.contains(r#""uuid":"abc""#), "got {json}");
    }
}
