//! Decoding of inverterd command payloads
//!
//! Telemetry fields arrive as `{value, unit}` objects. Only the fields the
//! monitor acts on are decoded; everything else in the payload is ignored.

use crate::error::{MonitorError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Battery flow reported by the inverter.
///
/// Decoding is exhaustive: a literal outside the known set is an error, never
/// a fallback value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerDirection {
    #[serde(rename = "Discharge")]
    Discharging,
    #[serde(rename = "Charge")]
    Charging,
    #[serde(rename = "Do nothing")]
    DoNothing,
}

impl fmt::Display for PowerDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerDirection::Discharging => "Discharge",
            PowerDirection::Charging => "Charge",
            PowerDirection::DoNothing => "Do nothing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Deserialize)]
struct Measured {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    grid_voltage: Measured,
    grid_freq: Measured,
    pv1_input_power: Measured,
    battery_voltage: Measured,
    ac_output_active_power: Measured,
    battery_power_direction: PowerDirection,
}

#[derive(Debug, Deserialize)]
struct RawRated {
    battery_under_voltage: Measured,
    battery_recharge_voltage: Measured,
    battery_redischarge_voltage: Measured,
}

/// Readings of one poll cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSample {
    pub ac_present: bool,
    pub solar_present: bool,
    pub battery_voltage: f64,
    pub load_watts: i64,
    pub power_direction: PowerDirection,
}

impl StatusSample {
    /// Decode the `data` object of a `get-status` response
    pub fn from_data(data: Value) -> Result<Self> {
        let raw: RawStatus = decode("get-status", data)?;
        Ok(Self {
            ac_present: raw.grid_voltage.value > 0.0 || raw.grid_freq.value > 0.0,
            solar_present: raw.pv1_input_power.value > 0.0,
            battery_voltage: raw.battery_voltage.value,
            load_watts: raw.ac_output_active_power.value.round() as i64,
            power_direction: raw.battery_power_direction,
        })
    }

    /// AC is connected and the battery is taking charge from it
    pub fn ac_charging(&self) -> bool {
        self.ac_present && self.power_direction == PowerDirection::Charging
    }
}

/// Rated values from `get-rated` the monitor keeps for the run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatedInfo {
    pub battery_under_voltage: f64,
    pub battery_recharge_voltage: f64,
    pub battery_redischarge_voltage: f64,
}

impl RatedInfo {
    pub fn from_data(data: Value) -> Result<Self> {
        let raw: RawRated = decode("get-rated", data)?;
        Ok(Self {
            battery_under_voltage: raw.battery_under_voltage.value,
            battery_recharge_voltage: raw.battery_recharge_voltage.value,
            battery_redischarge_voltage: raw.battery_redischarge_voltage.value,
        })
    }
}

/// Decode the `data` array of `get-allowed-ac-charging-currents`, ascending
pub fn allowed_currents_from_data(data: Value) -> Result<Vec<u32>> {
    let mut currents: Vec<u32> = decode("get-allowed-ac-charging-currents", data)?;
    currents.sort_unstable();
    currents.dedup();
    Ok(currents)
}

fn decode<T: DeserializeOwned>(command: &str, data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| MonitorError::decode(format!("{} payload: {}", command, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(grid_v: f64, freq: f64, pv: f64, direction: &str) -> Value {
        json!({
            "grid_voltage": {"value": grid_v, "unit": "V"},
            "grid_freq": {"value": freq, "unit": "Hz"},
            "pv1_input_power": {"value": pv, "unit": "W"},
            "battery_voltage": {"value": 52.3, "unit": "V"},
            "ac_output_active_power": {"value": 412, "unit": "W"},
            "battery_power_direction": direction,
            "battery_capacity": {"value": 80, "unit": "%"}
        })
    }

    #[test]
    fn decodes_status_fields() {
        let sample = StatusSample::from_data(status(230.1, 50.0, 0.0, "Charge")).unwrap();
        assert!(sample.ac_present);
        assert!(!sample.solar_present);
        assert!((sample.battery_voltage - 52.3).abs() < f64::EPSILON);
        assert_eq!(sample.load_watts, 412);
        assert_eq!(sample.power_direction, PowerDirection::Charging);
        assert!(sample.ac_charging());
    }

    #[test]
    fn ac_present_from_frequency_alone() {
        let sample = StatusSample::from_data(status(0.0, 49.9, 120.0, "Do nothing")).unwrap();
        assert!(sample.ac_present);
        assert!(sample.solar_present);
        assert_eq!(sample.power_direction, PowerDirection::DoNothing);
        assert!(!sample.ac_charging());

        let sample = StatusSample::from_data(status(0.0, 0.0, 0.0, "Discharge")).unwrap();
        assert!(!sample.ac_present);
        assert_eq!(sample.power_direction, PowerDirection::Discharging);
    }

    #[test]
    fn unknown_power_direction_is_an_error() {
        let err = StatusSample::from_data(status(230.0, 50.0, 0.0, "Charging")).unwrap_err();
        assert!(matches!(err, MonitorError::Decode { .. }));
    }

    #[test]
    fn missing_field_is_an_error() {
        let err = StatusSample::from_data(json!({"grid_voltage": {"value": 1}})).unwrap_err();
        assert!(matches!(err, MonitorError::Decode { .. }));
    }

    #[test]
    fn decodes_rated_and_allowed_currents() {
        let rated = RatedInfo::from_data(json!({
            "battery_under_voltage": {"value": 44.0, "unit": "V"},
            "battery_recharge_voltage": {"value": 46.0, "unit": "V"},
            "battery_redischarge_voltage": {"value": 54.0, "unit": "V"}
        }))
        .unwrap();
        assert!((rated.battery_under_voltage - 44.0).abs() < f64::EPSILON);
        assert!((rated.battery_redischarge_voltage - 54.0).abs() < f64::EPSILON);

        let currents = allowed_currents_from_data(json!([30, 2, 10, 20, 10])).unwrap();
        assert_eq!(currents, vec![2, 10, 20, 30]);
        assert!(allowed_currents_from_data(json!({"x": 1})).is_err());
    }
}
