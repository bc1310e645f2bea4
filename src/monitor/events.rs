//! Delivery of monitor events to the host application

use super::types::{BatteryState, ChargingEvent};
use crate::logging::get_logger;

pub type ChargingHandler = Box<dyn FnMut(ChargingEvent, Option<u32>) + Send>;
pub type BatteryHandler = Box<dyn FnMut(BatteryState, f64, i64) + Send>;
pub type ErrorHandler = Box<dyn FnMut(&str) + Send>;

/// The three callbacks the poll loop reports to.
///
/// Handlers run inline with the poll cycle, so a slow handler delays the
/// next poll.
pub struct EventDispatcher {
    on_charging: ChargingHandler,
    on_battery: BatteryHandler,
    on_error: ErrorHandler,
}

impl EventDispatcher {
    pub fn new<C, B, E>(on_charging: C, on_battery: B, on_error: E) -> Self
    where
        C: FnMut(ChargingEvent, Option<u32>) + Send + 'static,
        B: FnMut(BatteryState, f64, i64) + Send + 'static,
        E: FnMut(&str) + Send + 'static,
    {
        Self {
            on_charging: Box::new(on_charging),
            on_battery: Box::new(on_battery),
            on_error: Box::new(on_error),
        }
    }

    /// Handlers that only write to the log
    pub fn logging() -> Self {
        let charging = get_logger("events");
        let battery = charging.clone();
        let errors = charging.clone();
        Self::new(
            move |event, current| match current {
                Some(amps) => charging.info(&format!("charging event {} ({}A)", event, amps)),
                None => charging.info(&format!("charging event {}", event)),
            },
            move |state, voltage, load| {
                let message = format!("battery {} at {:.2}V, load {}W", state, voltage, load);
                match state {
                    BatteryState::Normal => battery.info(&message),
                    _ => battery.warn(&message),
                }
            },
            move |message| errors.error(message),
        )
    }

    pub fn charging(&mut self, event: ChargingEvent, current: Option<u32>) {
        (self.on_charging)(event, current)
    }

    pub fn battery(&mut self, state: BatteryState, voltage: f64, load_watts: i64) {
        (self.on_battery)(state, voltage, load_watts)
    }

    pub fn error(&mut self, message: &str) {
        (self.on_error)(message)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_handlers_receive_arguments() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let (a, b, c) = (seen.clone(), seen.clone(), seen.clone());
        let mut dispatcher = EventDispatcher::new(
            move |event, current| a.lock().unwrap().push(format!("{} {:?}", event, current)),
            move |state, v, load| b.lock().unwrap().push(format!("{} {} {}", state, v, load)),
            move |msg| c.lock().unwrap().push(msg.to_string()),
        );

        dispatcher.charging(ChargingEvent::AcCurrentChanged, Some(20));
        dispatcher.battery(BatteryState::Low, 46.5, 300);
        dispatcher.error("boom");

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["AC_CURRENT_CHANGED Some(20)", "LOW 46.5 300", "boom"]
        );
    }

    #[test]
    fn test_logging_handlers_do_not_panic() {
        let mut dispatcher = EventDispatcher::logging();
        dispatcher.charging(ChargingEvent::AcChargingStarted, None);
        dispatcher.battery(BatteryState::Critical, 44.0, 100);
        dispatcher.error("failure");
    }
}
