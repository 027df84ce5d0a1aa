//! In-process stand-in for the device firmware.
//!
//! A [`SimulatedPort`] lets sessions and their callers run without hardware:
//! [`SimulatedPort::connect`] opens a [`Device`] on it the way
//! [`Device::open`] does on a serial port. The simulated transport decodes
//! host commands with the real codec and answers them the way the firmware
//! does.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use sweep_frame::protocol::{
    parse_digits, two_digits, STATUS_INVALID_PARAMETER, STATUS_MOTOR_STATIONARY,
    STATUS_MOTOR_UNSTABLE,
};
use sweep_frame::{
    decode_frame, encode_param_response, encode_sample, encode_status_response,
    encode_value_response, Command, Expect, Frame, Mnemonic, SamplePacket, SampleRate,
    MAX_MOTOR_SPEED_HZ, STATUS_OK,
};
use sweep_transport::{Result as TransportResult, Transport, TransportError, DEFAULT_TIMEOUT};
use tracing::{debug, trace};

use crate::config::DeviceConfig;
use crate::device::Device;
use crate::error::{DeviceError, Result};

/// Prefix of simulated transport names.
const NAME_PREFIX: &str = "sim://";

/// One revolution in raw angle units (degrees << 4).
const FULL_TURN_RAW: u32 = 360 << 4;

/// Behaviour of a simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Motor speed after power-on or reset, in Hz.
    pub motor_speed: i32,
    /// Sample rate after power-on or reset.
    pub sample_rate: SampleRate,
    /// Time the motor needs to settle after a speed change.
    pub motor_ready_delay: Duration,
    /// Synthesize revolutions while scanning when no scripted data is queued.
    pub auto_generate: bool,
    pub model: String,
    pub protocol: [u8; 2],
    pub firmware: [u8; 2],
    pub hardware: u8,
    pub serial_number: String,
    pub bitrate: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            motor_speed: 5,
            sample_rate: SampleRate::Hz500,
            motor_ready_delay: Duration::ZERO,
            auto_generate: true,
            model: "SWEEP".to_string(),
            protocol: *b"10",
            firmware: *b"17",
            hardware: b'1',
            serial_number: "00000001".to_string(),
            bitrate: 115_200,
        }
    }
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    open: bool,
    scanning: bool,
    motor_speed: i32,
    sample_rate: SampleRate,
    motor_settles_at: Instant,
    auto_generate: bool,
    input: BytesMut,
    output: VecDeque<u8>,
    scripted: VecDeque<u8>,
    forced: HashMap<Mnemonic, u8>,
    lost: HashSet<Mnemonic>,
    commands: Vec<Command>,
    reads: usize,
    revolution: u32,
}

impl SimState {
    fn new(config: SimConfig) -> Self {
        Self {
            open: false,
            scanning: false,
            motor_speed: config.motor_speed,
            sample_rate: config.sample_rate,
            motor_settles_at: Instant::now(),
            auto_generate: config.auto_generate,
            input: BytesMut::new(),
            output: VecDeque::new(),
            scripted: VecDeque::new(),
            forced: HashMap::new(),
            lost: HashSet::new(),
            commands: Vec::new(),
            reads: 0,
            revolution: 0,
            config,
        }
    }

    fn motor_ready(&self) -> bool {
        Instant::now() >= self.motor_settles_at
    }

    fn samples_per_revolution(&self) -> u32 {
        (self.sample_rate.hz() / self.motor_speed.max(1)).max(1) as u32
    }

    /// Status for a status-bearing response: a forced fault, else `fallback`.
    fn status(&mut self, mnemonic: Mnemonic, fallback: [u8; 2]) -> [u8; 2] {
        match self.forced.remove(&mnemonic) {
            Some(code) => two_digits(code),
            None => fallback,
        }
    }

    fn handle(&mut self, command: Command) {
        if self.lost.remove(&command.mnemonic) {
            debug!(mnemonic = %command.mnemonic, "simulated line lost command");
            return;
        }
        debug!(mnemonic = %command.mnemonic, "simulated device received command");
        self.commands.push(command);

        let mnemonic = command.mnemonic;
        let mut out = BytesMut::new();
        match mnemonic {
            Mnemonic::StartScan => {
                let fallback = if self.motor_speed == 0 {
                    two_digits(STATUS_MOTOR_STATIONARY)
                } else if !self.motor_ready() {
                    two_digits(STATUS_MOTOR_UNSTABLE)
                } else {
                    STATUS_OK
                };
                let status = self.status(mnemonic, fallback);
                if status == STATUS_OK {
                    self.scanning = true;
                }
                encode_status_response(mnemonic, status, &mut out);
            }
            Mnemonic::StopScan => {
                let status = self.status(mnemonic, STATUS_OK);
                if status == STATUS_OK {
                    self.scanning = false;
                }
                encode_status_response(mnemonic, status, &mut out);
            }
            Mnemonic::MotorReady => {
                let value: &[u8] = if self.motor_ready() { b"00" } else { b"01" };
                encode_value_response(mnemonic, value, &mut out);
            }
            Mnemonic::MotorInfo => {
                encode_value_response(mnemonic, &two_digits(self.motor_speed as u8), &mut out);
            }
            Mnemonic::SetMotorSpeed => {
                let param = command.param.unwrap_or(*b"??");
                let requested = parse_digits(&param)
                    .map(|hz| hz as i32)
                    .filter(|hz| (0..=MAX_MOTOR_SPEED_HZ).contains(hz));
                let fallback = match requested {
                    Some(_) => STATUS_OK,
                    None => two_digits(STATUS_INVALID_PARAMETER),
                };
                let status = self.status(mnemonic, fallback);
                if let (true, Some(hz)) = (status == STATUS_OK, requested) {
                    self.motor_speed = hz;
                    self.motor_settles_at = Instant::now() + self.config.motor_ready_delay;
                }
                encode_param_response(mnemonic, param, status, &mut out);
            }
            Mnemonic::SampleRateInfo => {
                encode_value_response(mnemonic, &self.sample_rate.code(), &mut out);
            }
            Mnemonic::SetSampleRate => {
                let param = command.param.unwrap_or(*b"??");
                let requested = SampleRate::from_code(param);
                let fallback = match requested {
                    Some(_) => STATUS_OK,
                    None => two_digits(STATUS_INVALID_PARAMETER),
                };
                let status = self.status(mnemonic, fallback);
                if let (true, Some(rate)) = (status == STATUS_OK, requested) {
                    self.sample_rate = rate;
                }
                encode_param_response(mnemonic, param, status, &mut out);
            }
            Mnemonic::VersionInfo => {
                let value = format!(
                    "{:<5.5}{}{}{}{:0>8.8}",
                    self.config.model,
                    String::from_utf8_lossy(&self.config.protocol),
                    String::from_utf8_lossy(&self.config.firmware),
                    char::from(self.config.hardware),
                    self.config.serial_number,
                );
                encode_value_response(mnemonic, value.as_bytes(), &mut out);
            }
            Mnemonic::DeviceInfo => {
                let value = format!(
                    "{:06}{}11{:02}{:04}",
                    self.config.bitrate.min(999_999),
                    if self.scanning { '1' } else { '0' },
                    self.motor_speed,
                    self.sample_rate.hz(),
                );
                encode_value_response(mnemonic, value.as_bytes(), &mut out);
            }
            Mnemonic::Reset => {
                self.scanning = false;
                self.motor_speed = self.config.motor_speed;
                self.sample_rate = self.config.sample_rate;
                self.motor_settles_at = Instant::now() + self.config.motor_ready_delay;
                self.output.clear();
                self.scripted.clear();
                self.forced.clear();
            }
        }
        self.output.extend(&out[..]);
    }

    fn refill(&mut self) {
        if !self.scripted.is_empty() {
            self.output.append(&mut self.scripted);
        } else if self.auto_generate {
            self.generate_revolution();
        }
    }

    fn generate_revolution(&mut self) {
        let samples = self.samples_per_revolution();
        let mut buf = BytesMut::new();
        for i in 0..samples {
            let packet = SamplePacket::new(
                (i * FULL_TURN_RAW / samples) as u16,
                (100 + (self.revolution * 13 + i * 7) % 900) as u16,
                (i * 3 % 256) as u8,
                i == 0,
            );
            encode_sample(&packet, &mut buf);
        }
        trace!(revolution = self.revolution, samples, "generated revolution");
        self.revolution = self.revolution.wrapping_add(1);
        self.output.extend(&buf[..]);
    }
}

/// A simulated serial port. Clones share the same device.
#[derive(Clone)]
pub struct SimulatedPort {
    name: Arc<str>,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPort {
    /// A fresh, unregistered device with default behaviour.
    pub fn new(name: &str) -> Self {
        Self::with_config(name, SimConfig::default())
    }

    /// A fresh, unregistered device.
    pub fn with_config(name: &str, config: SimConfig) -> Self {
        Self {
            name: Arc::from(name),
            state: Arc::new(Mutex::new(SimState::new(config))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open the port. Fails with `Busy` while another transport holds it.
    pub fn open(&self) -> TransportResult<SimulatedTransport> {
        let mut state = self.lock();
        if state.open {
            return Err(TransportError::Busy {
                port: format!("{NAME_PREFIX}{}", self.name),
            });
        }
        state.open = true;
        state.input.clear();
        debug!(port = %self.name, "opened simulated port");
        Ok(SimulatedTransport {
            port: self.clone(),
            name: format!("{NAME_PREFIX}{}", self.name),
            timeout: DEFAULT_TIMEOUT,
            closed: false,
        })
    }

    /// Open the port and start a session on it.
    ///
    /// Fails with [`DeviceError::Unreachable`] while another transport holds
    /// the port, like [`Device::open`] on a busy serial port.
    pub fn connect(&self, config: DeviceConfig) -> Result<Device<Box<dyn Transport>>> {
        let transport = self.open().map_err(|source| DeviceError::Unreachable {
            port: format!("{NAME_PREFIX}{}", self.name),
            source,
        })?;
        Device::new(Box::new(transport), config)
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn is_scanning(&self) -> bool {
        self.lock().scanning
    }

    pub fn motor_speed(&self) -> i32 {
        self.lock().motor_speed
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.lock().sample_rate
    }

    /// Samples per generated revolution at the current settings.
    pub fn samples_per_revolution(&self) -> usize {
        self.lock().samples_per_revolution() as usize
    }

    /// Append raw bytes to the device output immediately.
    pub fn inject_bytes(&self, bytes: &[u8]) {
        self.lock().output.extend(bytes);
    }

    /// Queue raw bytes that are released only while scanning.
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.lock().scripted.extend(bytes);
    }

    /// Queue sample frames that are released only while scanning.
    pub fn queue_samples(&self, packets: impl IntoIterator<Item = SamplePacket>) {
        let mut buf = BytesMut::new();
        for packet in packets {
            encode_sample(&packet, &mut buf);
        }
        self.queue_bytes(&buf);
    }

    /// Enable or disable synthesized revolutions.
    pub fn set_auto_generate(&self, enabled: bool) {
        self.lock().auto_generate = enabled;
    }

    /// Answer the next `mnemonic` command with status `code`.
    pub fn force_status(&self, mnemonic: Mnemonic, code: u8) {
        self.lock().forced.insert(mnemonic, code);
    }

    /// Drop the next `mnemonic` command as if it never reached the device.
    pub fn lose_next(&self, mnemonic: Mnemonic) {
        self.lock().lost.insert(mnemonic);
    }

    /// Settling time applied to later motor speed changes.
    pub fn set_motor_ready_delay(&self, delay: Duration) {
        let mut state = self.lock();
        state.config.motor_ready_delay = delay;
        state.motor_settles_at = Instant::now() + delay;
    }

    /// Every command received so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// Number of read calls made by transports on this port.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SimulatedPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedPort")
            .field("name", &self.name)
            .finish()
    }
}

/// Transport side of a [`SimulatedPort`].
///
/// Reads return whatever the device has produced; when nothing is pending
/// they fail with `TimedOut` at once instead of waiting out the timeout.
#[derive(Debug)]
pub struct SimulatedTransport {
    port: SimulatedPort,
    name: String,
    timeout: Duration,
    closed: bool,
}

impl SimulatedTransport {
    pub fn port(&self) -> &SimulatedPort {
        &self.port
    }

    fn not_connected() -> io::Error {
        io::Error::new(ErrorKind::NotConnected, "transport closed")
    }
}

impl Read for SimulatedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(Self::not_connected());
        }
        let mut state = self.port.lock();
        state.reads += 1;
        if state.output.is_empty() && state.scanning {
            state.refill();
        }
        if state.output.is_empty() {
            return Err(io::Error::new(ErrorKind::TimedOut, "no data from simulated device"));
        }

        let n = buf.len().min(state.output.len());
        for (slot, byte) in buf.iter_mut().zip(state.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(Self::not_connected());
        }
        let mut state = self.port.lock();
        state.input.extend_from_slice(buf);
        loop {
            match decode_frame(&mut state.input, Expect::Command) {
                Ok(Some(Frame::Command(command))) => state.handle(command),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(err) => trace!(%err, "simulated device ignored malformed command"),
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Err(Self::not_connected());
        }
        Ok(())
    }
}

impl Transport for SimulatedTransport {
    fn set_timeout(&mut self, timeout: Duration) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_input(&mut self) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.port.lock().output.clear();
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.port.lock();
        state.open = false;
        state.input.clear();
        debug!(port = %self.name, "closed simulated port");
    }

    fn is_open(&self) -> bool {
        !self.closed
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(transport: &mut SimulatedTransport, command: &[u8]) -> Vec<u8> {
        transport.write_all(command).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while let Ok(n) = transport.read(&mut buf) {
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn port_is_exclusive() {
        let port = SimulatedPort::new("exclusive");
        let mut first = port.open().unwrap();
        assert!(matches!(port.open(), Err(TransportError::Busy { .. })));

        first.close();
        assert!(!port.is_open());
        assert!(port.open().is_ok());
    }

    #[test]
    fn answers_queries() {
        let port = SimulatedPort::new("queries");
        let mut transport = port.open().unwrap();

        assert_eq!(exchange(&mut transport, b"MI\n"), b"MI05\n");
        assert_eq!(exchange(&mut transport, b"LI\n"), b"LI01\n");
        assert_eq!(exchange(&mut transport, b"MZ\n"), b"MZ00\n");
        assert_eq!(
            exchange(&mut transport, b"IV\n"),
            b"IVSWEEP1017100000001\n"
        );
        assert_eq!(exchange(&mut transport, b"ID\n"), b"ID115200011050500\n");
    }

    #[test]
    fn rejects_invalid_parameters() {
        let port = SimulatedPort::new("params");
        let mut transport = port.open().unwrap();

        assert_eq!(exchange(&mut transport, b"MS07\n"), b"MS07\n00P\n");
        assert_eq!(port.motor_speed(), 7);
        assert_eq!(exchange(&mut transport, b"MS11\n"), b"MS11\n11R\n");
        assert_eq!(port.motor_speed(), 7);
        assert_eq!(exchange(&mut transport, b"LR04\n"), b"LR04\n11R\n");
        assert_eq!(exchange(&mut transport, b"LR03\n"), b"LR03\n00P\n");
        assert_eq!(port.sample_rate(), SampleRate::Hz1000);
    }

    #[test]
    fn streams_revolutions_while_scanning() {
        let port = SimulatedPort::new("stream");
        let mut transport = port.open().unwrap();

        transport.write_all(b"DS\n").unwrap();
        let mut buf = vec![0u8; 6 + 7 * 100];
        let mut filled = 0;
        while filled < buf.len() {
            filled += transport.read(&mut buf[filled..]).unwrap();
        }
        assert_eq!(&buf[..6], b"DS00P\n");
        assert_eq!(buf[6] & 0x01, 0x01);
        assert_eq!(buf[13] & 0x01, 0x00);
        assert_eq!(port.samples_per_revolution(), 100);
    }

    #[test]
    fn forced_status_applies_once() {
        let port = SimulatedPort::new("forced");
        let mut transport = port.open().unwrap();
        port.force_status(Mnemonic::StopScan, 13);

        assert_eq!(exchange(&mut transport, b"DX\n"), b"DX13T\n");
        assert_eq!(exchange(&mut transport, b"DX\n"), b"DX00P\n");
    }

    #[test]
    fn reset_is_silent() {
        let port = SimulatedPort::new("reset");
        let mut transport = port.open().unwrap();
        exchange(&mut transport, b"MS03\n");

        assert!(exchange(&mut transport, b"RR\n").is_empty());
        assert_eq!(port.motor_speed(), 5);
        assert_eq!(port.commands().len(), 2);
    }

    #[test]
    fn lost_command_gets_no_answer() {
        let port = SimulatedPort::new("lossy");
        let mut transport = port.open().unwrap();
        port.lose_next(Mnemonic::MotorInfo);

        assert!(exchange(&mut transport, b"MI\n").is_empty());
        assert!(port.commands().is_empty());
        assert_eq!(exchange(&mut transport, b"MI\n"), b"MI05\n");
    }

    #[test]
    fn connect_reports_busy_port_as_unreachable() {
        let port = SimulatedPort::new("connect-busy");
        let _device = port.connect(DeviceConfig::default()).unwrap();

        let err = port.connect(DeviceConfig::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DeviceUnreachable);
        assert!(err.to_string().contains("sim://connect-busy"));
    }
}
