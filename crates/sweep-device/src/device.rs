use std::time::Instant;

use bytes::Bytes;
use sweep_frame::protocol::parse_digits;
use sweep_frame::{
    Command, Expect, Frame, FrameError, FrameStream, Mnemonic, SampleRate, MAX_MOTOR_SPEED_HZ,
    MIN_MOTOR_SPEED_HZ,
};
use sweep_transport::{SerialTransport, Transport};
use tracing::{debug, info, warn};

use crate::accumulator::ScanAccumulator;
use crate::config::DeviceConfig;
use crate::error::{DeviceError, Result};
use crate::info::{DeviceInfo, VersionInfo};
use crate::scan::Scan;

/// A session with one device.
///
/// Owns the transport exclusively. Operations block until the device answers
/// or the transport times out; the session is meant for one caller at a time.
/// Dropping the session stops scanning (best effort) and releases the port.
pub struct Device<T: Transport> {
    stream: FrameStream<T>,
    config: DeviceConfig,
    accumulator: ScanAccumulator,
    scanning: bool,
    motor_speed: Option<i32>,
    sample_rate: Option<i32>,
    closed: bool,
}

impl Device<Box<dyn Transport>> {
    /// Open the serial port at `port` and start a session.
    pub fn open(port: &str, config: DeviceConfig) -> Result<Self> {
        let transport = SerialTransport::open(port, config.bitrate, config.timeout).map_err(
            |source| DeviceError::Unreachable {
                port: port.to_string(),
                source,
            },
        )?;
        Self::new(Box::new(transport), config)
    }

    /// Open with the protocol default bitrate and settings.
    pub fn open_default(port: &str) -> Result<Self> {
        Self::open(port, DeviceConfig::default())
    }
}

impl<T: Transport> Device<T> {
    /// Start a session on an already-open transport.
    ///
    /// Stops any scan left running by a previous session, flushes stale
    /// input and, when configured, checks the firmware protocol version.
    pub fn new(mut transport: T, config: DeviceConfig) -> Result<Self> {
        transport.set_timeout(config.timeout)?;
        let stream = FrameStream::with_config(transport, config.frame);
        let mut device = Self {
            stream,
            config,
            accumulator: ScanAccumulator::new(),
            scanning: false,
            motor_speed: None,
            sample_rate: None,
            closed: false,
        };

        device.halt_stale_stream()?;
        if device.config.verify_version {
            let version = device.version_info().map_err(|err| {
                DeviceError::ProtocolMismatch(format!("no usable version reply: {err}"))
            })?;
            if !version.is_supported() {
                return Err(DeviceError::ProtocolMismatch(format!(
                    "unsupported protocol version {} (model {})",
                    version.protocol_version(),
                    version.model
                )));
            }
            debug!(
                model = %version.model,
                protocol = %version.protocol_version(),
                firmware = %version.firmware_version(),
                "device identified"
            );
        }

        info!(port = device.port(), "device session ready");
        Ok(device)
    }

    fn response_deadline(&self) -> Instant {
        Instant::now() + self.config.response_timeout
    }

    fn halt_stale_stream(&mut self) -> Result<()> {
        self.stream.send(&Command::new(Mnemonic::StopScan))?;
        let deadline = self.response_deadline();
        match self
            .stream
            .read_frame_before(Expect::Response(Mnemonic::StopScan), deadline)
        {
            Ok(_) => {}
            Err(err @ (FrameError::Timeout | FrameError::CorruptFrame { .. })) => {
                debug!(%err, "no clean stop acknowledgement on connect");
            }
            Err(err) => return Err(err.into()),
        }
        self.stream.clear_input()?;
        Ok(())
    }

    /// Send `command` and wait for its acknowledgement.
    fn request(&mut self, command: Command) -> Result<Bytes> {
        self.stream.send(&command)?;
        let deadline = self.response_deadline();
        match self
            .stream
            .read_frame_before(Expect::Response(command.mnemonic), deadline)?
        {
            Frame::Ack { payload, .. } => {
                debug!(mnemonic = %command.mnemonic, payload = ?payload, "command acknowledged");
                Ok(payload)
            }
            Frame::DeviceError(fault) => Err(DeviceError::DeviceFault(fault)),
            other => Err(DeviceError::UnexpectedFrame {
                expected: command.mnemonic,
                got: other.kind(),
            }),
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.scanning {
            return Err(DeviceError::ScanningActive);
        }
        Ok(())
    }

    /// Whether the motor speed has stabilised.
    pub fn motor_ready(&mut self) -> Result<bool> {
        self.ensure_idle()?;
        let payload = self.request(Command::new(Mnemonic::MotorReady))?;
        Ok(payload.as_ref() == b"00")
    }

    /// Poll until the motor is ready or `motor_ready_timeout` expires.
    pub fn wait_until_motor_ready(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.config.motor_ready_timeout;
        loop {
            if self.motor_ready()? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DeviceError::MotorNotReady(self.config.motor_ready_timeout));
            }
            std::thread::sleep(self.config.motor_ready_poll_interval);
        }
    }

    /// Start streaming scan data. A no-op when already scanning.
    pub fn start_scanning(&mut self) -> Result<()> {
        if self.scanning {
            debug!("start_scanning: already scanning");
            return Ok(());
        }
        self.wait_until_motor_ready()?;
        self.request(Command::new(Mnemonic::StartScan))?;
        self.accumulator.reset();
        self.scanning = true;
        info!(port = self.port(), "scanning started");
        Ok(())
    }

    /// Stop streaming scan data. A no-op when not scanning.
    ///
    /// Sample frames still in flight ahead of the acknowledgement are
    /// discarded.
    pub fn stop_scanning(&mut self) -> Result<()> {
        if !self.scanning {
            debug!("stop_scanning: not scanning");
            return Ok(());
        }
        self.stream.send(&Command::new(Mnemonic::StopScan))?;
        let deadline = self.response_deadline();
        loop {
            match self
                .stream
                .read_frame_before(Expect::Response(Mnemonic::StopScan), deadline)
            {
                Ok(Frame::Ack { .. }) => break,
                Ok(Frame::DeviceError(fault)) => return Err(DeviceError::DeviceFault(fault)),
                Ok(other) => {
                    return Err(DeviceError::UnexpectedFrame {
                        expected: Mnemonic::StopScan,
                        got: other.kind(),
                    })
                }
                // Sample bytes can mimic the acknowledgement tag; keep looking.
                Err(FrameError::CorruptFrame { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        self.scanning = false;
        self.accumulator.reset();
        self.stream.clear_input()?;
        info!(port = self.port(), "scanning stopped");
        Ok(())
    }

    /// Motor speed in Hz. Served from cache when known; unavailable while
    /// scanning.
    pub fn motor_speed(&mut self) -> Result<i32> {
        self.ensure_idle()?;
        if let Some(hz) = self.motor_speed {
            return Ok(hz);
        }
        let payload = self.request(Command::new(Mnemonic::MotorInfo))?;
        let hz = parse_digits(&payload)
            .map(|hz| hz as i32)
            .ok_or_else(|| malformed(Mnemonic::MotorInfo, &payload))?;
        self.motor_speed = Some(hz);
        Ok(hz)
    }

    /// Set the motor speed, 1..=10 Hz.
    ///
    /// Waits for the motor to settle first. Out-of-range values are rejected
    /// without touching the device.
    pub fn set_motor_speed(&mut self, hz: i32) -> Result<()> {
        if !(MIN_MOTOR_SPEED_HZ..=MAX_MOTOR_SPEED_HZ).contains(&hz) {
            return Err(DeviceError::InvalidParameter(format!(
                "motor speed {hz} Hz outside {MIN_MOTOR_SPEED_HZ}..={MAX_MOTOR_SPEED_HZ}"
            )));
        }
        self.ensure_idle()?;
        self.wait_until_motor_ready()?;
        self.motor_speed = None;
        self.request(Command::set_motor_speed(hz as u8))?;
        self.motor_speed = Some(hz);
        debug!(hz, "motor speed set");
        Ok(())
    }

    /// Nominal sample rate in Hz. Served from cache when known; unavailable
    /// while scanning.
    pub fn sample_rate(&mut self) -> Result<i32> {
        self.ensure_idle()?;
        if let Some(hz) = self.sample_rate {
            return Ok(hz);
        }
        let payload = self.request(Command::new(Mnemonic::SampleRateInfo))?;
        let code: [u8; 2] = payload
            .as_ref()
            .try_into()
            .map_err(|_| malformed(Mnemonic::SampleRateInfo, &payload))?;
        let hz = SampleRate::from_code(code)
            .ok_or_else(|| malformed(Mnemonic::SampleRateInfo, &payload))?
            .hz();
        self.sample_rate = Some(hz);
        Ok(hz)
    }

    /// Set the nominal sample rate: 500, 750 or 1000 Hz.
    ///
    /// The achieved rate may run up to ~100 Hz above nominal.
    pub fn set_sample_rate(&mut self, hz: i32) -> Result<()> {
        let rate = SampleRate::from_hz(hz).ok_or_else(|| {
            DeviceError::InvalidParameter(format!(
                "sample rate {hz} Hz not one of 500, 750, 1000"
            ))
        })?;
        self.ensure_idle()?;
        self.wait_until_motor_ready()?;
        self.sample_rate = None;
        self.request(Command::set_sample_rate(rate))?;
        self.sample_rate = Some(hz);
        debug!(hz, "sample rate set");
        Ok(())
    }

    /// Reset the device. It sends no acknowledgement.
    pub fn reset(&mut self) -> Result<()> {
        self.stream.send(&Command::new(Mnemonic::Reset))?;
        self.scanning = false;
        self.motor_speed = None;
        self.sample_rate = None;
        self.accumulator.reset();
        self.stream.clear_input()?;
        info!(port = self.port(), "device reset");
        Ok(())
    }

    /// Block until one complete revolution is assembled.
    ///
    /// A timeout keeps the partial revolution so the next call continues it.
    /// Corrupt frames and device faults abandon it; the next call starts at
    /// the following boundary.
    pub fn get_scan(&mut self) -> Result<Scan> {
        if !self.scanning {
            return Err(DeviceError::NotScanning);
        }
        loop {
            match self.stream.read_frame(Expect::Sample) {
                Ok(Frame::Sample(sample)) => {
                    if let Some(scan) = self.accumulator.push(sample) {
                        debug!(samples = scan.len(), "scan complete");
                        return Ok(scan);
                    }
                }
                Ok(Frame::DeviceError(fault)) => {
                    self.accumulator.reset();
                    return Err(DeviceError::DeviceFault(fault));
                }
                Ok(other) => {
                    self.accumulator.reset();
                    return Err(DeviceError::UnexpectedFrame {
                        expected: Mnemonic::StartScan,
                        got: other.kind(),
                    });
                }
                Err(FrameError::Timeout) => return Err(FrameError::Timeout.into()),
                Err(err) => {
                    self.accumulator.reset();
                    return Err(err.into());
                }
            }
        }
    }

    /// Firmware identification (`IV`).
    pub fn version_info(&mut self) -> Result<VersionInfo> {
        self.ensure_idle()?;
        let payload = self.request(Command::new(Mnemonic::VersionInfo))?;
        VersionInfo::parse(&payload)
    }

    /// Live device settings (`ID`). Refreshes the cached motor speed and
    /// sample rate.
    pub fn device_info(&mut self) -> Result<DeviceInfo> {
        self.ensure_idle()?;
        let payload = self.request(Command::new(Mnemonic::DeviceInfo))?;
        let info = DeviceInfo::parse(&payload)?;
        self.motor_speed = Some(info.motor_speed);
        self.sample_rate = Some(info.sample_rate);
        Ok(info)
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Port identifier.
    pub fn port(&self) -> &str {
        self.stream.get_ref().name()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Stop scanning if active and release the transport.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.scanning {
            if let Err(err) = self.stop_scanning() {
                warn!(port = self.port(), %err, "failed to stop scanning during close");
            }
        }
        self.stream.get_mut().close();
        debug!(port = self.port(), "device closed");
    }
}

impl<T: Transport> Drop for Device<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Transport> std::fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("port", &self.port())
            .field("scanning", &self.scanning)
            .field("motor_speed", &self.motor_speed)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

fn malformed(mnemonic: Mnemonic, payload: &[u8]) -> DeviceError {
    DeviceError::ProtocolMismatch(format!(
        "malformed {mnemonic} value {:?}",
        String::from_utf8_lossy(payload)
    ))
}
