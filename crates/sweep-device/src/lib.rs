//! Device sessions for the sweep LiDAR.
//!
//! Open a session, configure the motor and sample rate, then pull complete
//! revolutions with [`Device::get_scan`]. Everything is blocking; the
//! transport timeout bounds every read and the response timeout every
//! acknowledgement wait.

pub mod accumulator;
pub mod config;
pub mod device;
pub mod error;
pub mod info;
pub mod scan;
pub mod sim;
pub mod version;

pub use accumulator::{AccumulatorState, ScanAccumulator, MAX_SCAN_SAMPLES};
pub use config::DeviceConfig;
pub use device::Device;
pub use error::{DeviceError, ErrorKind, Result};
pub use info::{DeviceInfo, VersionInfo};
pub use scan::Scan;
pub use sim::{SimConfig, SimulatedPort, SimulatedTransport};
pub use sweep_frame::Sample;
pub use version::{is_abi_compatible, version, VERSION, VERSION_MAJOR, VERSION_MINOR};
