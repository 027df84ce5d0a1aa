use std::fmt;
use std::time::Duration;

use sweep_frame::{DeviceFault, FrameError, FrameKind, Mnemonic};
use sweep_transport::TransportError;

/// Stable error taxonomy.
///
/// Callers branch on the kind rather than on message text. The numeric codes
/// are part of the C ABI and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    /// The transport could not be opened.
    DeviceUnreachable = 1,
    /// No bytes or acknowledgement within the deadline.
    Timeout = 2,
    /// A frame failed checksum or structural validation.
    CorruptFrame = 3,
    /// The device reported an internal error.
    DeviceFault = 4,
    /// Unexpected frame kind or protocol version.
    ProtocolMismatch = 5,
    /// Caller-supplied value outside the accepted set or range.
    InvalidParameter = 6,
    /// Scan requested while scanning is inactive.
    NotScanning = 7,
    /// Sample index outside the scan.
    IndexOutOfRange = 8,
    /// Configuration requested while scanning is active.
    ScanningActive = 9,
    /// Destroyed, foreign or null handle.
    InvalidHandle = 10,
    /// I/O failure on an open transport.
    Transport = 11,
    /// Internal failure, including a caught panic.
    Internal = 12,
}

impl ErrorKind {
    /// Whether retrying the same operation may succeed.
    pub fn is_recoverable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::CorruptFrame)
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DeviceUnreachable => "device unreachable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CorruptFrame => "corrupt frame",
            ErrorKind::DeviceFault => "device fault",
            ErrorKind::ProtocolMismatch => "protocol mismatch",
            ErrorKind::InvalidParameter => "invalid parameter",
            ErrorKind::NotScanning => "not scanning",
            ErrorKind::IndexOutOfRange => "index out of range",
            ErrorKind::ScanningActive => "scanning active",
            ErrorKind::InvalidHandle => "invalid handle",
            ErrorKind::Transport => "transport",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The port could not be opened.
    #[error("device unreachable at {port}: {source}")]
    Unreachable {
        port: String,
        #[source]
        source: TransportError,
    },

    /// Transport-level error on an open port.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The motor did not settle in time.
    #[error("motor not ready after {0:?}")]
    MotorNotReady(Duration),

    /// The device rejected a command or flagged a sample.
    #[error("device fault: {0}")]
    DeviceFault(DeviceFault),

    /// The device speaks an incompatible protocol or sent malformed values.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// A frame of the wrong kind arrived.
    #[error("unexpected {got:?} frame while waiting for {expected}")]
    UnexpectedFrame { expected: Mnemonic, got: FrameKind },

    /// A caller-supplied value was rejected before any I/O.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("device is not scanning")]
    NotScanning,

    #[error("device is scanning; stop scanning first")]
    ScanningActive,

    #[error("sample index {index} out of range for scan of {len} samples")]
    IndexOutOfRange { index: usize, len: usize },
}

impl DeviceError {
    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::Unreachable { .. } => ErrorKind::DeviceUnreachable,
            DeviceError::Transport(_) => ErrorKind::Transport,
            DeviceError::Frame(err) => match err {
                FrameError::Timeout => ErrorKind::Timeout,
                FrameError::CorruptFrame { .. } => ErrorKind::CorruptFrame,
                FrameError::NoResponse(_) => ErrorKind::Internal,
                FrameError::Io(_) | FrameError::ConnectionClosed => ErrorKind::Transport,
            },
            DeviceError::MotorNotReady(_) => ErrorKind::Timeout,
            DeviceError::DeviceFault(_) => ErrorKind::DeviceFault,
            DeviceError::ProtocolMismatch(_) | DeviceError::UnexpectedFrame { .. } => {
                ErrorKind::ProtocolMismatch
            }
            DeviceError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            DeviceError::NotScanning => ErrorKind::NotScanning,
            DeviceError::ScanningActive => ErrorKind::ScanningActive,
            DeviceError::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
