//! Identifiers used to address appliances.
//!
//! - [`ApplianceId`] - Vendor-issued appliance identifier
//! - [`RoomPath`] - The location/room pair an appliance is registered under

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, vendor-issued identifier of an appliance.
///
/// # Examples
///
/// ```
/// use groheblue_core::ApplianceId;
///
/// let id = ApplianceId::new("1e7f471f-3b1e-40e5-a665-c1aaa898eae9");
/// assert_eq!(id.as_str(), "1e7f471f-3b1e-40e5-a665-c1aaa898eae9");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplianceId(String);

impl ApplianceId {
    /// Create a new appliance ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the appliance ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplianceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ApplianceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ApplianceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Location and room an appliance is registered under.
///
/// Together with the [`ApplianceId`] this forms the path of the command
/// endpoint: `locations/{location_id}/rooms/{room_id}/appliances/{id}/command`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomPath {
    /// Location identifier.
    pub location_id: String,

    /// Room identifier within the location.
    pub room_id: String,
}

impl RoomPath {
    /// Create a new room path.
    pub fn new(location_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            room_id: room_id.into(),
        }
    }
}

impl fmt::Display for RoomPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.location_id, self.room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appliance_id_conversions() {
        let from_str: ApplianceId = "abc".into();
        let from_string: ApplianceId = String::from("abc").into();
        assert_eq!(from_str, from_string);
        assert_eq!(from_str.to_string(), "abc");
    }

    #[test]
    fn test_room_path_display() {
        let room = RoomPath::new("12", "34");
        assert_eq!(room.to_string(), "12/34");
    }
}
