//! Inverter monitoring loop
//!
//! [`StatusPoller`] owns the two state machines and drives them from periodic
//! `get-status` samples. Both machines are plain values that return what
//! should happen; the poller performs the device commands and delivers events
//! through the [`EventDispatcher`].

pub mod battery;
pub mod charging;
pub mod events;
pub mod sample;
pub mod types;

pub use battery::{BatteryAlarm, BatteryAlarmMonitor};
pub use charging::{ChargingAction, ChargingController, ChargingProgram, RampBounds};
pub use events::EventDispatcher;
pub use sample::{PowerDirection, RatedInfo, StatusSample};
pub use types::{
    BatteryState, ChargingEvent, ChargingState, ChargingThresholds, MonitorConfiguration,
    MonitorSnapshot,
};

use crate::config::MonitorConfig;
use crate::device::{Command, DeviceClient};
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// Parallel unit addressed by current changes
const INVERTER_UNIT: u8 = 0;

/// Requests a running [`StatusPoller`] to stop.
///
/// The current cycle is allowed to finish; only the wait for the next tick is
/// cut short.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Periodic status poller
pub struct StatusPoller {
    client: Arc<dyn DeviceClient>,
    configuration: MonitorConfiguration,
    charging: ChargingController,
    battery: BatteryAlarmMonitor,
    dispatcher: EventDispatcher,
    poll_interval: Duration,
    stop_tx: Arc<watch::Sender<bool>>,
    snapshot_tx: watch::Sender<Arc<MonitorSnapshot>>,
    last_voltage: Option<f64>,
    total_polls: u64,
    failed_polls: u64,
    overrun_count: u64,
    logger: StructuredLogger,
}

impl StatusPoller {
    /// Query the inverter for its limits and build a poller.
    ///
    /// Any failure here is fatal: the monitor cannot run without knowing the
    /// allowed charging currents and rated voltages.
    pub async fn start(
        client: Arc<dyn DeviceClient>,
        settings: &MonitorConfig,
        dispatcher: EventDispatcher,
    ) -> Result<Self> {
        let logger = get_logger_with_context(
            LogContext::new("poller")
                .with_field("interval_ms", settings.poll_interval_ms.to_string()),
        );

        let allowed = sample::allowed_currents_from_data(
            fetch(client.as_ref(), Command::get_allowed_ac_charging_currents()).await?,
        )?;
        logger.info(&format!("allowed AC charging currents: {:?}", allowed));
        let bounds = RampBounds::new(allowed, settings.min_ac_current, settings.max_ac_current)?;

        let rated = RatedInfo::from_data(fetch(client.as_ref(), Command::get_rated()).await?)?;
        let configuration = MonitorConfiguration {
            min_ac_current: bounds.min(),
            max_ac_current: bounds.max(),
            battery_under_voltage: rated.battery_under_voltage,
            charging_thresholds: ChargingThresholds {
                recharge_voltage: rated.battery_recharge_voltage,
                redischarge_voltage: rated.battery_redischarge_voltage,
            },
        };
        logger.info(&format!(
            "ramp {:?}A, under voltage {:.1}V, recharge {:.1}V, redischarge {:.1}V",
            bounds.currents(),
            configuration.battery_under_voltage,
            configuration.charging_thresholds.recharge_voltage,
            configuration.charging_thresholds.redischarge_voltage
        ));

        let (stop_tx, _) = watch::channel(false);
        let (snapshot_tx, _) = watch::channel(Arc::new(MonitorSnapshot::initial()));

        Ok(Self {
            client,
            configuration,
            charging: ChargingController::new(bounds),
            battery: BatteryAlarmMonitor::new(),
            dispatcher,
            poll_interval: settings.poll_interval(),
            stop_tx: Arc::new(stop_tx),
            snapshot_tx,
            last_voltage: None,
            total_polls: 0,
            failed_polls: 0,
            overrun_count: 0,
            logger,
        })
    }

    pub fn configuration(&self) -> &MonitorConfiguration {
        &self.configuration
    }

    pub fn charging_state(&self) -> ChargingState {
        self.charging.state()
    }

    pub fn battery_state(&self) -> BatteryState {
        self.battery.state()
    }

    pub fn active_current(&self) -> Option<u32> {
        self.charging.active_current()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop_tx),
        }
    }

    /// Snapshots published after every poll cycle
    pub fn subscribe(&self) -> watch::Receiver<Arc<MonitorSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Poll until stopped
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info(&format!(
            "Starting status poller, interval {}ms",
            self.poll_interval.as_millis()
        ));

        let mut stop_rx = self.stop_tx.subscribe();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop_rx.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        self.logger.warn(&format!("Poll cycle skipped: {}", e));
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.logger.info(&format!(
            "Status poller stopped after {} polls ({} failed)",
            self.total_polls, self.failed_polls
        ));
        Ok(())
    }

    /// Run a single poll cycle.
    ///
    /// A failed status read leaves both state machines untouched and is
    /// returned to the caller; the loop in [`run`](Self::run) only logs it.
    pub async fn poll_once(&mut self) -> Result<()> {
        let started = Instant::now();
        let outcome = self.cycle().await;

        self.total_polls = self.total_polls.saturating_add(1);
        if outcome.is_err() {
            self.failed_polls = self.failed_polls.saturating_add(1);
        }
        if started.elapsed() > self.poll_interval {
            self.overrun_count = self.overrun_count.saturating_add(1);
        }
        self.publish();
        outcome
    }

    async fn cycle(&mut self) -> Result<()> {
        let client = Arc::clone(&self.client);
        let sample = StatusSample::from_data(fetch(client.as_ref(), Command::get_status()).await?)?;
        self.logger.trace(&format!("{:?}", sample));
        self.last_voltage = Some(sample.battery_voltage);

        let actions = self.charging.evaluate(
            sample.ac_present,
            sample.solar_present,
            sample.battery_voltage,
            sample.power_direction,
        );
        for action in actions {
            match action {
                ChargingAction::Emit(event) => self.dispatcher.charging(event, None),
                ChargingAction::SetMaxAcChargingCurrent(amps) => {
                    let command = Command::set_max_ac_charging_current(INVERTER_UNIT, amps);
                    match fetch(client.as_ref(), command).await {
                        Ok(_) => {
                            self.logger
                                .info(&format!("max AC charging current set to {}A", amps));
                            self.dispatcher
                                .charging(ChargingEvent::AcCurrentChanged, Some(amps));
                        }
                        Err(e) => {
                            let message =
                                format!("failed to set max AC charging current to {}A: {}", amps, e);
                            self.logger.error(&message);
                            self.dispatcher.error(&message);
                        }
                    }
                }
            }
        }

        let alarm = if sample.ac_charging() {
            self.battery.reset(sample.battery_voltage, sample.load_watts)
        } else {
            self.battery.evaluate(sample.battery_voltage, sample.load_watts)
        };
        if let Some(alarm) = alarm {
            self.dispatcher.battery(alarm.state, alarm.voltage, alarm.load_watts);
        }

        Ok(())
    }

    fn publish(&self) {
        let snapshot = MonitorSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            charging_state: self.charging.state(),
            battery_state: self.battery.state(),
            active_current: self.charging.active_current(),
            battery_voltage: self.last_voltage,
            total_polls: self.total_polls,
            failed_polls: self.failed_polls,
            overrun_count: self.overrun_count,
        };
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }
}

/// Execute a command and unwrap the payload of a successful response
async fn fetch(client: &dyn DeviceClient, command: Command) -> Result<Value> {
    client.execute(&command).await?.into_data(command.name)
}
