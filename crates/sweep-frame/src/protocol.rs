//! Wire constants for the device firmware.
//!
//! Host commands are ASCII: a two-letter mnemonic, an optional two-digit
//! parameter and a line feed. Responses echo the mnemonic. This table is the
//! hardware contract and must not drift from the firmware.

/// Frame terminator.
pub const LF: u8 = b'\n';

/// Status bytes meaning "command accepted".
pub const STATUS_OK: [u8; 2] = *b"00";

/// Firmware status: parameter rejected.
pub const STATUS_INVALID_PARAMETER: u8 = 11;
/// Firmware status: motor speed has not stabilised yet.
pub const STATUS_MOTOR_UNSTABLE: u8 = 12;
/// Firmware status: motor is stationary.
pub const STATUS_MOTOR_STATIONARY: u8 = 13;

/// Size of one data sample frame.
pub const SAMPLE_FRAME_LEN: usize = 7;
/// Size of a status-only response (`DS`, `DX`).
pub const HEADER_RESPONSE_LEN: usize = 6;
/// Size of a parameter echo response (`MS`, `LR`).
pub const PARAM_RESPONSE_LEN: usize = 9;

/// Bit 0 of the sample status byte: first sample of a revolution.
pub const SYNC_BIT: u8 = 0x01;
/// Bits 1..7 of the sample status byte: device error flags.
pub const ERROR_MASK: u8 = 0xFE;

/// Slowest accepted motor speed in Hz.
pub const MIN_MOTOR_SPEED_HZ: i32 = 1;
/// Fastest accepted motor speed in Hz.
pub const MAX_MOTOR_SPEED_HZ: i32 = 10;

/// Protocol major version this driver speaks.
pub const PROTOCOL_MAJOR: u8 = 1;

/// Command mnemonics understood by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    /// `DS`: start data acquisition.
    StartScan,
    /// `DX`: stop data acquisition.
    StopScan,
    /// `MZ`: query whether the motor speed has stabilised.
    MotorReady,
    /// `MI`: query motor speed.
    MotorInfo,
    /// `MS`: set motor speed.
    SetMotorSpeed,
    /// `LI`: query sample rate.
    SampleRateInfo,
    /// `LR`: set sample rate.
    SetSampleRate,
    /// `IV`: version information.
    VersionInfo,
    /// `ID`: device information.
    DeviceInfo,
    /// `RR`: reset the device.
    Reset,
}

/// Layout of the response the device sends for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// No response at all.
    None,
    /// `tag[2] status[2] sum LF`.
    Header,
    /// `tag[2] param[2] LF status[2] sum LF`.
    Param,
    /// `tag[2] value[len - 3] LF`, no checksum.
    Value { len: usize },
}

impl Mnemonic {
    pub const ALL: [Mnemonic; 10] = [
        Mnemonic::StartScan,
        Mnemonic::StopScan,
        Mnemonic::MotorReady,
        Mnemonic::MotorInfo,
        Mnemonic::SetMotorSpeed,
        Mnemonic::SampleRateInfo,
        Mnemonic::SetSampleRate,
        Mnemonic::VersionInfo,
        Mnemonic::DeviceInfo,
        Mnemonic::Reset,
    ];

    /// The two ASCII bytes on the wire.
    pub const fn bytes(self) -> [u8; 2] {
        match self {
            Mnemonic::StartScan => *b"DS",
            Mnemonic::StopScan => *b"DX",
            Mnemonic::MotorReady => *b"MZ",
            Mnemonic::MotorInfo => *b"MI",
            Mnemonic::SetMotorSpeed => *b"MS",
            Mnemonic::SampleRateInfo => *b"LI",
            Mnemonic::SetSampleRate => *b"LR",
            Mnemonic::VersionInfo => *b"IV",
            Mnemonic::DeviceInfo => *b"ID",
            Mnemonic::Reset => *b"RR",
        }
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.bytes() == bytes)
    }

    /// Whether the command carries a two-digit parameter.
    pub const fn has_param(self) -> bool {
        matches!(self, Mnemonic::SetMotorSpeed | Mnemonic::SetSampleRate)
    }

    pub const fn response(self) -> ResponseShape {
        match self {
            Mnemonic::StartScan | Mnemonic::StopScan => ResponseShape::Header,
            Mnemonic::SetMotorSpeed | Mnemonic::SetSampleRate => ResponseShape::Param,
            Mnemonic::MotorReady | Mnemonic::MotorInfo | Mnemonic::SampleRateInfo => {
                ResponseShape::Value { len: 5 }
            }
            Mnemonic::VersionInfo => ResponseShape::Value { len: 21 },
            Mnemonic::DeviceInfo => ResponseShape::Value { len: 18 },
            Mnemonic::Reset => ResponseShape::None,
        }
    }

    /// Total response length in bytes, zero when the device stays silent.
    pub const fn response_len(self) -> usize {
        match self.response() {
            ResponseShape::None => 0,
            ResponseShape::Header => HEADER_RESPONSE_LEN,
            ResponseShape::Param => PARAM_RESPONSE_LEN,
            ResponseShape::Value { len } => len,
        }
    }

    /// Wire text, for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Mnemonic::StartScan => "DS",
            Mnemonic::StopScan => "DX",
            Mnemonic::MotorReady => "MZ",
            Mnemonic::MotorInfo => "MI",
            Mnemonic::SetMotorSpeed => "MS",
            Mnemonic::SampleRateInfo => "LI",
            Mnemonic::SetSampleRate => "LR",
            Mnemonic::VersionInfo => "IV",
            Mnemonic::DeviceInfo => "ID",
            Mnemonic::Reset => "RR",
        }
    }
}

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nominal sample rates the firmware accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleRate {
    Hz500,
    Hz750,
    Hz1000,
}

impl SampleRate {
    pub fn from_hz(hz: i32) -> Option<Self> {
        match hz {
            500 => Some(SampleRate::Hz500),
            750 => Some(SampleRate::Hz750),
            1000 => Some(SampleRate::Hz1000),
            _ => None,
        }
    }

    pub const fn hz(self) -> i32 {
        match self {
            SampleRate::Hz500 => 500,
            SampleRate::Hz750 => 750,
            SampleRate::Hz1000 => 1000,
        }
    }

    /// Parameter code used by `LR` and reported by `LI`.
    pub const fn code(self) -> [u8; 2] {
        match self {
            SampleRate::Hz500 => *b"01",
            SampleRate::Hz750 => *b"02",
            SampleRate::Hz1000 => *b"03",
        }
    }

    pub fn from_code(code: [u8; 2]) -> Option<Self> {
        match &code {
            b"01" => Some(SampleRate::Hz500),
            b"02" => Some(SampleRate::Hz750),
            b"03" => Some(SampleRate::Hz1000),
            _ => None,
        }
    }
}

/// Checksum over the two status bytes of a response.
pub const fn status_checksum(status: [u8; 2]) -> u8 {
    ((status[0].wrapping_add(status[1])) & 0x3F) + 0x30
}

/// Checksum over the first six bytes of a sample frame.
pub fn sample_checksum(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().map(|&b| u32::from(b)).sum();
    (sum % 255) as u8
}

/// Two ASCII digits for `value` (0..=99).
pub fn two_digits(value: u8) -> [u8; 2] {
    let value = value.min(99);
    [b'0' + value / 10, b'0' + value % 10]
}

/// Parse a run of ASCII digits.
pub fn parse_digits(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    bytes.iter().try_fold(0u32, |acc, &b| {
        if b.is_ascii_digit() {
            acc.checked_mul(10)?.checked_add(u32::from(b - b'0'))
        } else {
            None
        }
    })
}

/// Human-readable meaning of a firmware status code.
pub fn status_description(code: u8) -> &'static str {
    match code {
        0 => "ok",
        STATUS_INVALID_PARAMETER => "invalid parameter",
        STATUS_MOTOR_UNSTABLE => "motor speed not stabilised",
        STATUS_MOTOR_STATIONARY => "motor stationary",
        _ => "device fault",
    }
}
