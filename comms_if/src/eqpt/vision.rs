//! # Vision (tag tracker) datagram format
//!
//! The vision process streams JSON datagrams over UDP, each one a map of tag
//! ID to detection. Tag IDs arrive as JSON strings since JSON objects cannot
//! have integer keys, so parsing converts them to `u32` here rather than
//! leaking string keys into the rest of the software.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single tag detection as reported by the vision process.
///
/// Positions are in meters in the camera frame, yaw in radians about the
/// camera boresight. The quaternion is in `{x, y, z, w}` component order.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct TagDetection {
    /// Tag position along the camera X axis in meters
    pub x: f64,

    /// Tag position along the camera Y axis in meters
    pub y: f64,

    /// Tag range along the camera boresight in meters
    pub z: f64,

    /// Tag yaw about the boresight in radians
    pub yaw: f64,

    /// Index of the camera which produced this detection
    #[serde(default)]
    pub camera: u32,

    /// Full orientation of the tag relative to the camera
    pub quaternion: QuatWire,
}

/// Quaternion components as serialised by the vision process.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct QuatWire {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// A full vision datagram: all tags detected in one frame.
#[derive(Debug, Clone, Default)]
pub struct TagMessage {
    pub detections: HashMap<u32, TagDetection>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur when parsing a vision datagram.
#[derive(Debug, thiserror::Error)]
pub enum TagParseError {
    #[error("Datagram is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Tag key {0:?} is not an integer")]
    InvalidTagId(String),
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl TagMessage {
    /// Parse a raw UDP datagram into a tag message.
    ///
    /// Keys which do not parse as integers are an error rather than being
    /// silently dropped, since they indicate a vision process fault.
    pub fn from_json(raw: &str) -> Result<Self, TagParseError> {
        let string_keyed: HashMap<String, TagDetection> =
            serde_json::from_str(raw).map_err(TagParseError::InvalidJson)?;

        let mut detections = HashMap::with_capacity(string_keyed.len());

        for (key, det) in string_keyed {
            let id: u32 = key
                .parse()
                .map_err(|_| TagParseError::InvalidTagId(key.clone()))?;
            detections.insert(id, det);
        }

        Ok(Self { detections })
    }

    /// Get the detection for a particular tag, if it was seen this frame.
    pub fn get(&self, tag_id: u32) -> Option<&TagDetection> {
        self.detections.get(&tag_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_datagram() {
        let raw = r#"{
            "3": {
                "x": 0.0123, "y": -0.0045, "z": 0.182, "yaw": 0.41,
                "quaternion": {"x": 0.0, "y": 0.0, "z": 0.2034, "w": 0.9791}
            }
        }"#;

        let msg = TagMessage::from_json(raw).unwrap();
        let det = msg.get(3).expect("tag 3 missing");
        assert!((det.z - 0.182).abs() < 1e-12);
        assert!(msg.get(7).is_none());
    }

    #[test]
    fn test_parse_bad_key() {
        let raw = r#"{"banana": {"x": 0, "y": 0, "z": 0, "yaw": 0,
            "quaternion": {"x": 0, "y": 0, "z": 0, "w": 1}}}"#;
        assert!(matches!(
            TagMessage::from_json(raw),
            Err(TagParseError::InvalidTagId(_))
        ));
    }

    #[test]
    fn test_parse_not_json() {
        assert!(matches!(
            TagMessage::from_json("not json"),
            Err(TagParseError::InvalidJson(_))
        ));
    }
}
