use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the AC charging program currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargingState {
    /// No AC input
    #[default]
    NotCharging,
    /// AC is present but solar input takes precedence
    AcButSolar,
    /// AC is present but the battery is not taking charge
    AcWaiting,
    /// AC is present and charging the battery
    AcOk,
    /// The ramp ran out of currents; charging is considered complete
    AcDone,
}

/// Notifications produced by the charging program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargingEvent {
    AcChargingUnavailableBecauseSolar,
    AcChargingStarted,
    AcNotCharging,
    AcDisconnected,
    AcCurrentChanged,
    AcChargingFinished,
}

/// Battery voltage alarm level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatteryState {
    #[default]
    Normal,
    Low,
    Critical,
}

/// Battery voltages the inverter uses to switch between grid and battery
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChargingThresholds {
    pub recharge_voltage: f64,
    pub redischarge_voltage: f64,
}

/// Settings the monitor runs with, fixed once startup completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfiguration {
    pub min_ac_current: u32,
    pub max_ac_current: u32,
    pub battery_under_voltage: f64,
    pub charging_thresholds: ChargingThresholds,
}

/// Point-in-time view of the monitor, published after every poll cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub timestamp: String,
    pub charging_state: ChargingState,
    pub battery_state: BatteryState,
    pub active_current: Option<u32>,
    pub battery_voltage: Option<f64>,
    pub total_polls: u64,
    pub failed_polls: u64,
    pub overrun_count: u64,
}

impl MonitorSnapshot {
    pub(crate) fn initial() -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            charging_state: ChargingState::default(),
            battery_state: BatteryState::default(),
            active_current: None,
            battery_voltage: None,
            total_polls: 0,
            failed_polls: 0,
            overrun_count: 0,
        }
    }
}

impl fmt::Display for ChargingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChargingState::NotCharging => "NOT_CHARGING",
            ChargingState::AcButSolar => "AC_BUT_SOLAR",
            ChargingState::AcWaiting => "AC_WAITING",
            ChargingState::AcOk => "AC_OK",
            ChargingState::AcDone => "AC_DONE",
        };
        f.write_str(s)
    }
}

impl fmt::Display for ChargingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChargingEvent::AcChargingUnavailableBecauseSolar => {
                "AC_CHARGING_UNAVAILABLE_BECAUSE_SOLAR"
            }
            ChargingEvent::AcChargingStarted => "AC_CHARGING_STARTED",
            ChargingEvent::AcNotCharging => "AC_NOT_CHARGING",
            ChargingEvent::AcDisconnected => "AC_DISCONNECTED",
            ChargingEvent::AcCurrentChanged => "AC_CURRENT_CHANGED",
            ChargingEvent::AcChargingFinished => "AC_CHARGING_FINISHED",
        };
        f.write_str(s)
    }
}

impl fmt::Display for BatteryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatteryState::Normal => "NORMAL",
            BatteryState::Low => "LOW",
            BatteryState::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}
