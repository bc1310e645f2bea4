//! Battery voltage alarms

use super::types::BatteryState;
use crate::logging::{StructuredLogger, get_logger};

/// Below this voltage the battery is critically low
pub const CRITICAL_VOLTAGE: f64 = 45.0;
/// Below this voltage the battery is low
pub const LOW_VOLTAGE: f64 = 47.0;

/// Classify a battery voltage
pub fn classify(voltage: f64) -> BatteryState {
    if voltage < CRITICAL_VOLTAGE {
        BatteryState::Critical
    } else if voltage < LOW_VOLTAGE {
        BatteryState::Low
    } else {
        BatteryState::Normal
    }
}

/// A battery state change to report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryAlarm {
    pub state: BatteryState,
    pub voltage: f64,
    pub load_watts: i64,
}

/// Tracks battery state between polls and reports only changes
#[derive(Debug)]
pub struct BatteryAlarmMonitor {
    state: BatteryState,
    logger: StructuredLogger,
}

impl Default for BatteryAlarmMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl BatteryAlarmMonitor {
    pub fn new() -> Self {
        Self {
            state: BatteryState::Normal,
            logger: get_logger("battery"),
        }
    }

    pub fn state(&self) -> BatteryState {
        self.state
    }

    /// Classify the reading while running on battery
    pub fn evaluate(&mut self, voltage: f64, load_watts: i64) -> Option<BatteryAlarm> {
        self.transition(classify(voltage), voltage, load_watts)
    }

    /// AC is charging the battery, so there is nothing to alarm about
    pub fn reset(&mut self, voltage: f64, load_watts: i64) -> Option<BatteryAlarm> {
        self.transition(BatteryState::Normal, voltage, load_watts)
    }

    fn transition(
        &mut self,
        state: BatteryState,
        voltage: f64,
        load_watts: i64,
    ) -> Option<BatteryAlarm> {
        if state == self.state {
            return None;
        }
        self.logger.info(&format!(
            "battery {} -> {} at {:.2}V, load {}W",
            self.state, state, voltage, load_watts
        ));
        self.state = state;
        Some(BatteryAlarm {
            state,
            voltage,
            load_watts,
        })
    }
}
