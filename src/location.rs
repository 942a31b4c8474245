//! Inbound wire payload and the lat/lng range predicate.

use serde::{Deserialize, Serialize};

use crate::constants::MSG_TYPE_LOCATION;

/// A location update as it appears on the wire, both inbound and outbound.
///
/// Field names match the reference protocol (`userId`, `lat`, `lng`,
/// `accuracy`, `ts`) so a client implementation can be shared verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationMessage {
    /// Must equal `"location"`; any other tag (or a missing one with a
    /// different default) causes the frame to be discarded upstream.
    #[serde(rename = "type")]
    pub kind: String,
    /// Claimed user identifier. Overwritten by the session's authenticated
    /// identity before the message reaches the store.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Reported accuracy, in meters.
    pub accuracy: f64,
    /// Unix timestamp, seconds.
    pub ts: i64,
}

impl LocationMessage {
    /// Whether this message's type tag identifies it as a location update.
    #[must_use]
    pub fn is_location(&self) -> bool {
        self.kind == MSG_TYPE_LOCATION
    }
}

/// Whether `(lat, lng)` falls within the valid WGS84 range.
///
/// `lat` must be in `[-90, 90]` and `lng` in `[-180, 180]`, inclusive.
#[must_use]
pub fn valid_lat_lng(lat: f64, lng: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundary_values() {
        assert!(valid_lat_lng(90.0, 180.0));
        assert!(valid_lat_lng(-90.0, -180.0));
        assert!(valid_lat_lng(0.0, 0.0));
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(!valid_lat_lng(90.1, 0.0));
        assert!(!valid_lat_lng(-90.1, 0.0));
        assert!(!valid_lat_lng(0.0, 180.1));
        assert!(!valid_lat_lng(0.0, -180.1));
        assert!(!valid_lat_lng(f64::NAN, 0.0));
    }

    #[test]
    fn parses_reference_wire_shape() {
        let raw = r#"{"type":"location","userId":"a","lat":35.7,"lng":51.4,"accuracy":5,"ts":1}"#;
        let msg: LocationMessage = serde_json::from_str(raw).unwrap();
        assert!(msg.is_location());
        assert_eq!(msg.user_id, "a");
        assert!((msg.lat - 35.7).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_non_location_type() {
        let raw = r#"{"type":"ping","userId":"a","lat":0,"lng":0,"accuracy":0,"ts":1}"#;
        let msg: LocationMessage = serde_json::from_str(raw).unwrap();
        assert!(!msg.is_location());
    }
}
