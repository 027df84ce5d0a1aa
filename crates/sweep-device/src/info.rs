//! Identification and status reports (`IV`, `ID`).

use sweep_frame::protocol::parse_digits;
use sweep_frame::PROTOCOL_MAJOR;

use crate::error::{DeviceError, Result};

const VERSION_PAYLOAD_LEN: usize = 18;
const DEVICE_INFO_PAYLOAD_LEN: usize = 15;

/// Firmware identification from `IV`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionInfo {
    pub model: String,
    pub protocol_major: u8,
    pub protocol_minor: u8,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub hardware_version: u8,
    pub serial_number: String,
}

impl VersionInfo {
    /// Parse the 18-byte `IV` payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() != VERSION_PAYLOAD_LEN {
            return Err(mismatch("IV", payload));
        }
        Ok(Self {
            model: text(&payload[0..5]),
            protocol_major: digit(payload[5], "IV", payload)?,
            protocol_minor: digit(payload[6], "IV", payload)?,
            firmware_major: digit(payload[7], "IV", payload)?,
            firmware_minor: digit(payload[8], "IV", payload)?,
            hardware_version: digit(payload[9], "IV", payload)?,
            serial_number: text(&payload[10..18]),
        })
    }

    /// Whether this driver can talk to the firmware.
    pub fn is_supported(&self) -> bool {
        self.protocol_major == PROTOCOL_MAJOR
    }

    pub fn protocol_version(&self) -> String {
        format!("{}.{}", self.protocol_major, self.protocol_minor)
    }

    pub fn firmware_version(&self) -> String {
        format!("{}.{}", self.firmware_major, self.firmware_minor)
    }
}

/// Live device settings from `ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    pub bitrate: u32,
    pub laser_state: char,
    pub mode: char,
    pub diagnostic: char,
    /// Motor speed in Hz.
    pub motor_speed: i32,
    /// Nominal sample rate in Hz.
    pub sample_rate: i32,
}

impl DeviceInfo {
    /// Parse the 15-byte `ID` payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() != DEVICE_INFO_PAYLOAD_LEN {
            return Err(mismatch("ID", payload));
        }
        let number = |range: std::ops::Range<usize>| {
            parse_digits(&payload[range]).ok_or_else(|| mismatch("ID", payload))
        };
        Ok(Self {
            bitrate: number(0..6)?,
            laser_state: char::from(payload[6]),
            mode: char::from(payload[7]),
            diagnostic: char::from(payload[8]),
            motor_speed: number(9..11)? as i32,
            sample_rate: number(11..15)? as i32,
        })
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

fn digit(byte: u8, what: &str, payload: &[u8]) -> Result<u8> {
    if byte.is_ascii_digit() {
        Ok(byte - b'0')
    } else {
        Err(mismatch(what, payload))
    }
}

fn mismatch(what: &str, payload: &[u8]) -> DeviceError {
    DeviceError::ProtocolMismatch(format!(
        "malformed {what} payload {:?}",
        String::from_utf8_lossy(payload)
    ))
}
