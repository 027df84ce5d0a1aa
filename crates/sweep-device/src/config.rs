use std::time::Duration;

use sweep_frame::FrameConfig;
use sweep_transport::{DEFAULT_BITRATE, DEFAULT_TIMEOUT};

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Serial bitrate.
    pub bitrate: u32,
    /// Transport read/write timeout. This is the only bound on a blocking
    /// `get_scan`.
    pub timeout: Duration,
    /// Overall bound on waiting for one acknowledgement, however much
    /// unrelated data the device sends meanwhile.
    pub response_timeout: Duration,
    /// Query `IV` during construction and reject foreign protocol versions.
    pub verify_version: bool,
    /// How long to wait for the motor to settle before scan or motor commands.
    pub motor_ready_timeout: Duration,
    /// Delay between motor-ready polls.
    pub motor_ready_poll_interval: Duration,
    /// Receive buffer sizing.
    pub frame: FrameConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            timeout: DEFAULT_TIMEOUT,
            response_timeout: Duration::from_secs(2),
            verify_version: true,
            motor_ready_timeout: Duration::from_secs(8),
            motor_ready_poll_interval: Duration::from_millis(20),
            frame: FrameConfig::default(),
        }
    }
}

impl DeviceConfig {
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_verify_version(mut self, verify: bool) -> Self {
        self.verify_version = verify;
        self
    }

    pub fn with_motor_ready_timeout(mut self, timeout: Duration) -> Self {
        self.motor_ready_timeout = timeout;
        self
    }

    pub fn with_motor_ready_poll_interval(mut self, interval: Duration) -> Self {
        self.motor_ready_poll_interval = interval;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }
}
