//! Driver for rotating serial LiDAR rangefinders.
//!
//! Open a [`Device`], start scanning and pull one full revolution at a time:
//!
//! ```no_run
//! use sweep::Device;
//!
//! let mut device = Device::open_default("/dev/ttyUSB0")?;
//! device.start_scanning()?;
//! let scan = device.get_scan()?;
//! for sample in &scan {
//!     println!("{} m°: {} cm", sample.angle, sample.distance);
//! }
//! # Ok::<(), sweep::DeviceError>(())
//! ```
//!
//! # Crate Structure
//!
//! - [`transport`]: serial byte transport
//! - [`frame`]: wire protocol codec and frame stream
//! - [`device`]: device session, scan assembly and the simulated device
//!
//! The C ABI lives in the `sweep-ffi` crate.

/// Re-export transport types.
pub mod transport {
    pub use sweep_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sweep_frame::*;
}

/// Re-export device types.
pub mod device {
    pub use sweep_device::*;
}

pub use sweep_device::{
    is_abi_compatible, version, Device, DeviceConfig, DeviceError, ErrorKind, Result, Sample,
    Scan,
};
