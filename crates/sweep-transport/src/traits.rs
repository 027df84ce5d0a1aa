use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A blocking byte transport to one device.
///
/// Reads follow `std::io::Read` semantics with one addition: when no byte
/// arrives within [`Transport::timeout`], `read` fails with
/// `ErrorKind::TimedOut`. Short reads are normal and are not errors.
/// After [`Transport::close`], reads and writes fail with
/// `ErrorKind::NotConnected`.
pub trait Transport: Read + Write + Send {
    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Current read/write timeout.
    fn timeout(&self) -> Duration;

    /// Discard bytes received but not yet read.
    fn clear_input(&mut self) -> Result<()>;

    /// Release the underlying handle. Calling this more than once is a no-op.
    fn close(&mut self);

    /// Whether the transport is still open.
    fn is_open(&self) -> bool;

    /// Port identifier for diagnostics.
    fn name(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_timeout(timeout)
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
