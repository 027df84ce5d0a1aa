use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Protocol default bitrate.
pub const DEFAULT_BITRATE: u32 = 115_200;

/// Default read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Serial port transport (8N1, no flow control).
///
/// On Unix the port is opened exclusively, so a second session on the same
/// path fails until this one is closed or dropped.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    timeout: Duration,
}

impl SerialTransport {
    /// Open `path` at `bitrate` with the given timeout.
    pub fn open(path: &str, bitrate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, bitrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: path.to_string(),
                source,
            })?;

        info!(port = path, bitrate, "opened serial port");
        Ok(Self {
            port: Some(port),
            name: path.to_string(),
            timeout,
        })
    }

    /// Wrap an already-open port.
    pub fn from_port(port: Box<dyn SerialPort>, name: impl Into<String>) -> Self {
        let timeout = port.timeout();
        Self {
            port: Some(port),
            name: name.into(),
            timeout,
        }
    }

    fn port_mut(&mut self) -> std::io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotConnected, "transport closed"))
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port_mut()?.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port_mut()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port_mut()?.flush()
    }
}

impl Transport for SerialTransport {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let name = self.name.clone();
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        port.set_timeout(timeout)
            .map_err(|source| TransportError::Configure { port: name, source })?;
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_input(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        port.clear(ClearBuffer::Input)
            .map_err(|e| TransportError::Io(e.into()))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.name, "closed serial port");
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .field("open", &self.port.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}
