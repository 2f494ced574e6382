//! Dashboard snapshot and per-appliance projections.
//!
//! The dashboard payload is owned by the vendor. [`DashboardSnapshot`] keeps
//! it as raw JSON and offers read-only projections of the parts callers use:
//! appliance discovery ([`ApplianceSummary`]) and the latest measurements and
//! state flags of one appliance ([`ApplianceReading`]).
//!
//! Expected shape:
//!
//! ```text
//! locations[] -> { id, rooms[] -> { id, appliances[] -> {
//!     appliance_id, name, serial_number, version,
//!     data_latest: { measurement: {...} }, state: {...}, params: {...} } } }
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{ApplianceId, RoomPath};

/// Error type for dashboard projections.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// The snapshot does not list the appliance.
    #[error("appliance {appliance_id} not present in dashboard")]
    ApplianceNotFound { appliance_id: ApplianceId },

    /// A section of the appliance record has an unexpected shape.
    #[error("malformed {section} for appliance {appliance_id}: {message}")]
    Malformed {
        appliance_id: ApplianceId,
        section: &'static str,
        message: String,
    },
}

/// Full account state as returned by the dashboard endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashboardSnapshot(Value);

impl DashboardSnapshot {
    /// Wrap an already-parsed payload.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Parse a payload.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body).map(Self)
    }

    /// Whether the snapshot lists no locations at all.
    pub fn is_empty(&self) -> bool {
        array(&self.0, "locations").is_empty()
    }

    /// The raw payload.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Every appliance in the snapshot with the room it belongs to.
    pub fn appliances(&self) -> Vec<ApplianceSummary> {
        self.entries()
            .filter_map(|(room, record)| ApplianceSummary::from_record(room, record))
            .collect()
    }

    /// Find one appliance.
    pub fn locate(&self, appliance_id: &ApplianceId) -> Option<ApplianceSummary> {
        self.appliances()
            .into_iter()
            .find(|summary| &summary.appliance_id == appliance_id)
    }

    /// Latest measurements and state flags of one appliance.
    pub fn reading(&self, appliance_id: &ApplianceId) -> Result<ApplianceReading, DashboardError> {
        let (summary, record) = self
            .entries()
            .find_map(|(room, record)| {
                ApplianceSummary::from_record(room, record)
                    .filter(|summary| &summary.appliance_id == appliance_id)
                    .map(|summary| (summary, record))
            })
            .ok_or_else(|| DashboardError::ApplianceNotFound {
                appliance_id: appliance_id.clone(),
            })?;

        let measurement: Measurement = section(record, &["data_latest", "measurement"], appliance_id, "measurement")?;
        let state: ApplianceState = section(record, &["state"], appliance_id, "state")?;
        let params: ApplianceParams = section(record, &["params"], appliance_id, "params")?;

        Ok(ApplianceReading {
            summary,
            measurement,
            state,
            filter_type: params.filter_type.map(FilterType::from_code),
        })
    }

    fn entries(&self) -> impl Iterator<Item = (RoomPath, &Value)> {
        array(&self.0, "locations").iter().flat_map(|location| {
            let location_id = id_of(location.get("id"));
            array(location, "rooms").iter().flat_map(move |room| {
                let room_path = location_id
                    .clone()
                    .zip(id_of(room.get("id")))
                    .map(|(location_id, room_id)| RoomPath::new(location_id, room_id));
                array(room, "appliances")
                    .iter()
                    .filter_map(move |appliance| room_path.clone().map(|path| (path, appliance)))
            })
        })
    }
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Identifiers arrive as strings or numbers depending on the record.
fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode the object at `path` in `record`; a missing section decodes as empty.
fn section<T: DeserializeOwned + Default>(
    record: &Value,
    path: &[&str],
    appliance_id: &ApplianceId,
    name: &'static str,
) -> Result<T, DashboardError> {
    let mut value = record;
    for key in path {
        match value.get(*key) {
            Some(next) if !next.is_null() => value = next,
            _ => return Ok(T::default()),
        }
    }

    T::deserialize(value).map_err(|e| DashboardError::Malformed {
        appliance_id: appliance_id.clone(),
        section: name,
        message: e.to_string(),
    })
}

/// An appliance as listed in the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplianceSummary {
    /// Location and room the appliance is registered under.
    pub room: RoomPath,
    pub appliance_id: ApplianceId,
    pub name: Option<String>,
    pub serial_number: Option<String>,
    /// Firmware version.
    pub version: Option<String>,
}

impl ApplianceSummary {
    fn from_record(room: RoomPath, record: &Value) -> Option<Self> {
        let appliance_id = id_of(record.get("appliance_id"))?;
        let text = |key: &str| record.get(key).and_then(|v| id_of(Some(v)));

        Some(Self {
            room,
            appliance_id: ApplianceId::new(appliance_id),
            name: text("name"),
            serial_number: text("serial_number"),
            version: text("version"),
        })
    }
}

/// Latest measurements reported by an appliance.
///
/// Fields the appliance does not report are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurement {
    pub timestamp: Option<String>,
    /// Percent.
    pub remaining_co2: Option<f64>,
    /// Percent.
    pub remaining_filter: Option<f64>,
    pub remaining_co2_liters: Option<f64>,
    pub remaining_filter_liters: Option<f64>,
    pub cleaning_count: Option<u64>,
    pub date_of_cleaning: Option<String>,
    pub date_of_co2_replacement: Option<String>,
    pub date_of_filter_replacement: Option<String>,
    pub filter_change_count: Option<u64>,
    pub power_cut_count: Option<u64>,
    pub pump_count: Option<u64>,
    /// Minutes.
    pub pump_running_time: Option<u64>,
    /// Minutes.
    pub operating_time: Option<u64>,
    /// Minutes.
    pub time_since_last_withdrawal: Option<u64>,
    /// Minutes.
    pub water_running_time_still: Option<u64>,
    /// Minutes.
    pub water_running_time_carbonated: Option<u64>,
    /// Minutes.
    pub water_running_time_medium: Option<u64>,
}

/// Problem flags of an appliance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplianceState {
    #[serde(rename = "System_error_bitfield")]
    pub system_error_bitfield: Option<u64>,
    pub filter_empty: Option<bool>,
    pub co2_empty: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApplianceParams {
    filter_type: Option<u8>,
}

/// Installed filter cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterType {
    SSize,
    ActiveCarbon,
    UltraSafe,
    MagnesiumPlus,
    MSize,
    /// A code this client does not know.
    Unknown(u8),
}

impl FilterType {
    /// Decode the numeric filter code.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::SSize,
            2 => Self::ActiveCarbon,
            3 => Self::UltraSafe,
            4 => Self::MagnesiumPlus,
            5 => Self::MSize,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SSize => f.write_str("S_SIZE"),
            Self::ActiveCarbon => f.write_str("ACTIVE_CARBON"),
            Self::UltraSafe => f.write_str("ULTRA_SAFE"),
            Self::MagnesiumPlus => f.write_str("MAGNESIUM_PLUS"),
            Self::MSize => f.write_str("M_SIZE"),
            Self::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// Everything the dashboard says about one appliance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplianceReading {
    pub summary: ApplianceSummary,
    pub measurement: Measurement,
    pub state: ApplianceState,
    pub filter_type: Option<FilterType>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DashboardSnapshot {
        DashboardSnapshot::from_value(json!({
            "locations": [{
                "id": 48434,
                "rooms": [{
                    "id": 82374,
                    "appliances": [
                        {
                            "appliance_id": "app-1",
                            "name": "Kitchen",
                            "serial_number": "SN-001",
                            "version": "01.08.Z11.0400.0104",
                            "data_latest": {
                                "measurement": {
                                    "timestamp": "2024-05-01T10:00:00.000+02:00",
                                    "remaining_co2": 64,
                                    "remaining_filter": 87,
                                    "remaining_co2_liters": 120.5,
                                    "remaining_filter_liters": 2610,
                                    "cleaning_count": 3,
                                    "pump_count": 412,
                                    "operating_time": 60311
                                }
                            },
                            "state": {
                                "System_error_bitfield": 0,
                                "filter_empty": false,
                                "co2_empty": true
                            },
                            "params": { "filter_type": 4 }
                        },
                        { "appliance_id": "app-2", "name": "Office" }
                    ]
                }]
            }]
        }))
    }

    #[test]
    fn test_appliances_lists_room_paths() {
        let appliances = sample().appliances();
        assert_eq!(appliances.len(), 2);
        assert_eq!(appliances[0].room, RoomPath::new("48434", "82374"));
        assert_eq!(appliances[0].serial_number.as_deref(), Some("SN-001"));
        assert_eq!(appliances[1].appliance_id, ApplianceId::new("app-2"));
    }

    #[test]
    fn test_locate() {
        let snapshot = sample();
        assert!(snapshot.locate(&ApplianceId::new("app-2")).is_some());
        assert!(snapshot.locate(&ApplianceId::new("missing")).is_none());
    }

    #[test]
    fn test_reading_projects_measurement_and_state() {
        let reading = sample().reading(&ApplianceId::new("app-1")).unwrap();

        assert_eq!(reading.measurement.remaining_co2, Some(64.0));
        assert_eq!(reading.measurement.remaining_co2_liters, Some(120.5));
        assert_eq!(reading.measurement.cleaning_count, Some(3));
        assert_eq!(reading.measurement.date_of_cleaning, None);
        assert_eq!(reading.state.co2_empty, Some(true));
        assert_eq!(reading.state.system_error_bitfield, Some(0));
        assert_eq!(reading.filter_type, Some(FilterType::MagnesiumPlus));
    }

    #[test]
    fn test_reading_without_sections_is_empty() {
        let reading = sample().reading(&ApplianceId::new("app-2")).unwrap();
        assert_eq!(reading.measurement, Measurement::default());
        assert_eq!(reading.state, ApplianceState::default());
        assert_eq!(reading.filter_type, None);
    }

    #[test]
    fn test_reading_unknown_appliance() {
        let result = sample().reading(&ApplianceId::new("missing"));
        assert!(matches!(result, Err(DashboardError::ApplianceNotFound { .. })));
    }

    #[test]
    fn test_reading_malformed_section() {
        let snapshot = DashboardSnapshot::from_value(json!({
            "locations": [{ "id": 1, "rooms": [{ "id": 2, "appliances": [{
                "appliance_id": "app-1",
                "state": { "co2_empty": "maybe" }
            }]}]}]
        }));

        let result = snapshot.reading(&ApplianceId::new("app-1"));
        assert!(matches!(
            result,
            Err(DashboardError::Malformed { section: "state", .. })
        ));
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(DashboardSnapshot::default().is_empty());
        assert!(DashboardSnapshot::default().appliances().is_empty());
        assert!(DashboardSnapshot::from_json(r#"{"locations": []}"#).unwrap().is_empty());
        assert!(!sample().is_empty());
    }

    #[test]
    fn test_filter_type_names() {
        assert_eq!(FilterType::from_code(1).to_string(), "S_SIZE");
        assert_eq!(FilterType::from_code(9).to_string(), "UNKNOWN(9)");
    }
}
