//! Device command interface
//!
//! Everything the monitor asks of the inverter goes through a single
//! [`DeviceClient::execute`] call. [`ReconnectingClient`] is the production
//! implementation: it serializes concurrent callers over one [`Transport`] and
//! re-establishes the connection after a transport failure.

use crate::error::{MonitorError, Result};
use crate::logging::get_logger;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::Mutex;

pub mod inverterd;

pub use inverterd::InverterdTransport;

/// A named inverterd command with its positional arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: &'static str,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    pub fn arg<T: ToString>(mut self, value: T) -> Self {
        self.args.push(value.to_string());
        self
    }

    pub fn get_status() -> Self {
        Self::new("get-status")
    }

    pub fn get_rated() -> Self {
        Self::new("get-rated")
    }

    pub fn get_allowed_ac_charging_currents() -> Self {
        Self::new("get-allowed-ac-charging-currents")
    }

    /// Set the maximum AC charging current of the given parallel unit
    pub fn set_max_ac_charging_current(unit: u8, amps: u32) -> Self {
        Self::new("set-max-ac-charging-current").arg(unit).arg(amps)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Decoded reply to a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// `"ok"` on success, anything else is an error indicator
    pub result: String,

    /// Command payload; telemetry fields are usually `{value, unit}` objects
    #[serde(default)]
    pub data: Value,

    /// Optional human readable error detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            result: "ok".to_string(),
            data,
            message: None,
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            result: "error".to_string(),
            data: Value::Null,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == "ok"
    }

    /// Payload of a successful response, or a device error for `command`
    pub fn into_data(self, command: &str) -> Result<Value> {
        if self.is_ok() {
            Ok(self.data)
        } else {
            let detail = self
                .message
                .unwrap_or_else(|| format!("result={}", self.result));
            Err(MonitorError::device(command, detail))
        }
    }
}

/// The call-and-response contract the monitor depends on.
///
/// Implementations must tolerate concurrent callers and either return a fully
/// decoded response or fail; partial results are never produced.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn execute(&self, command: &Command) -> Result<CommandResponse>;
}

/// One connection to a command server
#[async_trait]
pub trait Transport: Send {
    /// (Re)open the connection, dropping any previous one
    async fn connect(&mut self) -> Result<()>;

    /// Send one command and read its full response
    async fn exec(&mut self, command: &Command) -> Result<CommandResponse>;
}

/// Serializing client with reconnect-on-failure.
///
/// Any transport-level failure of a command triggers exactly one reconnect
/// attempt; errors from that attempt are logged and dropped, and the original
/// failure is returned to the caller. Device-reported errors leave the
/// connection alone.
pub struct ReconnectingClient<T: Transport> {
    transport: Mutex<T>,
    logger: crate::logging::StructuredLogger,
}

impl<T: Transport> ReconnectingClient<T> {
    /// Wrap a transport that is not connected yet
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
            logger: get_logger("device"),
        }
    }

    /// Wrap a transport and open its first connection
    pub async fn connect(mut transport: T) -> Result<Self> {
        transport.connect().await?;
        Ok(Self::new(transport))
    }
}

#[async_trait]
impl<T: Transport> DeviceClient for ReconnectingClient<T> {
    async fn execute(&self, command: &Command) -> Result<CommandResponse> {
        let mut transport = self.transport.lock().await;
        match transport.exec(command).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_transport() => {
                self.logger
                    .warn(&format!("'{}' failed, reconnecting: {}", command, e));
                if let Err(reconnect_err) = transport.connect().await {
                    self.logger
                        .warn(&format!("Reconnect failed: {}", reconnect_err));
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
