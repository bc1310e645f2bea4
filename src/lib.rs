//! # inverter-monitor - AC charging supervisor for inverterd
//!
//! Polls an inverter through an inverterd server and manages how hard the
//! battery is charged from AC: the maximum AC charging current is stepped
//! down as battery voltage rises, and battery voltage alarms are raised while
//! the inverter runs from battery.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration with defaults and validation
//! - `logging`: Structured logging and tracing
//! - `device`: Command interface to inverterd with reconnect-on-failure
//! - `monitor`: Charging and battery state machines plus the poll loop
//! - `error`: Error type shared by all modules

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod monitor;

// Re-export commonly used types
pub use config::Config;
pub use device::{Command, CommandResponse, DeviceClient, ReconnectingClient};
pub use error::{MonitorError, Result};
pub use monitor::{EventDispatcher, StatusPoller, StopHandle};
