//! Blocking serial transport for the sweep LiDAR driver.
//!
//! This is the lowest layer: a byte pipe with a read timeout. The protocol
//! layers above never touch the operating system directly; everything they
//! need goes through the [`Transport`] trait, so a simulated device can stand
//! in for real hardware.

pub mod error;
pub mod serial;
pub mod traits;

pub use error::{Result, TransportError};
pub use serial::{SerialTransport, DEFAULT_BITRATE, DEFAULT_TIMEOUT};
pub use traits::Transport;
