//! inverterd line-protocol transport
//!
//! Requests are single CRLF-terminated lines. Every response starts with a
//! status line (`ok` or `err`), followed by body lines, and ends with an empty
//! line. The session is switched to JSON output right after connecting, so
//! bodies of successful `exec` calls are JSON documents.

use super::{Command, CommandResponse, Transport};
use crate::config::InverterdConfig;
use crate::error::{MonitorError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

const PROTOCOL_VERSION: u32 = 1;

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// TCP transport to an inverterd instance
pub struct InverterdTransport {
    address: String,
    connection: Option<Connection>,
    connection_timeout: Duration,
    operation_timeout: Duration,
    logger: StructuredLogger,
}

impl InverterdTransport {
    pub fn new(config: &InverterdConfig) -> Self {
        let address = config.address();
        let logger =
            get_logger_with_context(LogContext::new("inverterd").with_endpoint(address.clone()));
        Self {
            address,
            connection: None,
            connection_timeout: config.connect_timeout(),
            operation_timeout: config.operation_timeout(),
            logger,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn open(&self) -> Result<Connection> {
        let stream = match timeout(self.connection_timeout, TcpStream::connect(self.address.as_str())).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(MonitorError::transport(format!(
                    "Failed to connect to inverterd at {}: {}",
                    self.address, e
                )));
            }
            Err(_) => return Err(MonitorError::timeout("Connection timeout")),
        };
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let mut connection = Connection {
            reader: BufReader::new(read_half),
            writer: write_half,
        };

        let handshake = async {
            round_trip(&mut connection, &format!("v {}", PROTOCOL_VERSION)).await?;
            round_trip(&mut connection, "format json").await
        };
        match timeout(self.operation_timeout, handshake).await {
            Ok(Ok(_)) => Ok(connection),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MonitorError::timeout("Handshake timeout")),
        }
    }
}

#[async_trait]
impl Transport for InverterdTransport {
    async fn connect(&mut self) -> Result<()> {
        self.connection = None;
        self.logger
            .info(&format!("Connecting to inverterd at {}", self.address));

        match self.open().await {
            Ok(connection) => {
                self.connection = Some(connection);
                self.logger.info("Connected to inverterd");
                Ok(())
            }
            Err(e) => {
                self.logger.error(&format!("Connection failed: {}", e));
                Err(e)
            }
        }
    }

    async fn exec(&mut self, command: &Command) -> Result<CommandResponse> {
        let operation_timeout = self.operation_timeout;
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| MonitorError::transport("Not connected to inverterd"))?;

        self.logger.debug(&format!("exec {}", command));
        let line = format!("exec {}", command);
        let outcome = match timeout(operation_timeout, round_trip(connection, &line)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(MonitorError::timeout(format!(
                "'{}' got no response within {:?}",
                command, operation_timeout
            ))),
        };

        let body = match outcome {
            Ok(body) => body,
            Err(MonitorError::Device { message, .. }) => {
                return Err(MonitorError::device(command.name, message));
            }
            Err(e) => {
                // Stream position is unknown after a broken exchange
                self.connection = None;
                return Err(e);
            }
        };

        self.logger.trace(&format!("response: {}", body));
        serde_json::from_str::<CommandResponse>(&body).map_err(|e| {
            self.connection = None;
            MonitorError::transport(format!("Malformed response to '{}': {}", command, e))
        })
    }
}

/// Send one request line and collect the response body
async fn round_trip(connection: &mut Connection, request: &str) -> Result<String> {
    connection
        .writer
        .write_all(format!("{}\r\n", request).as_bytes())
        .await?;
    connection.writer.flush().await?;
    read_response(&mut connection.reader, request).await
}

async fn read_response<R>(reader: &mut R, request: &str) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut status: Option<String> = None;
    let mut body: Vec<String> = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(MonitorError::transport("Connection closed by inverterd"));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if status.is_none() {
            status = Some(trimmed.to_string());
            continue;
        }
        if trimmed.is_empty() {
            break;
        }
        body.push(trimmed.to_string());
    }

    let body = body.join("\n");
    match status.as_deref() {
        Some("ok") => Ok(body),
        Some("err") => Err(MonitorError::device(request, body)),
        Some(other) => Err(MonitorError::transport(format!(
            "Unexpected status line '{}'",
            other
        ))),
        None => Err(MonitorError::transport("Empty response")),
    }
}
