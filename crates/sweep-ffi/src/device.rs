use std::os::raw::c_char;
use std::sync::{Arc, Mutex};

use sweep_device::{Device, DeviceConfig};
use sweep_transport::Transport;
use tracing::warn;

use crate::error;
use crate::registry::{lock, HandleTable};
use crate::scan;
use crate::transport;
use crate::types::{SweepDevice, SweepError, SweepScan};

type SharedDevice = Mutex<Device<Box<dyn Transport>>>;

static DEVICES: Mutex<HandleTable<SharedDevice>> = Mutex::new(HandleTable::new());

fn lookup(handle: SweepDevice) -> Option<Arc<SharedDevice>> {
    lock(&DEVICES).get(handle.0)
}

/// Run `f` against the session behind `handle`.
///
/// Only the session itself is locked while `f` runs, so independent devices
/// never wait on each other.
fn with_device<T>(
    handle: SweepDevice,
    out: *mut SweepError,
    on_error: T,
    f: impl FnOnce(&mut Device<Box<dyn Transport>>) -> sweep_device::Result<T>,
) -> T {
    let Some(shared) = lookup(handle) else {
        error::report_invalid_handle(out, "device");
        return on_error;
    };
    let mut device = lock(&shared);
    match f(&mut device) {
        Ok(value) => value,
        Err(err) => {
            error::report_device_error(out, &err);
            on_error
        }
    }
}

/// Hand an already-open session to C callers.
///
/// For hosts that build the transport themselves; the returned handle is
/// released with [`sweep_device_destruct`] like any other.
pub fn register_device(device: Device<Box<dyn Transport>>) -> SweepDevice {
    SweepDevice(lock(&DEVICES).insert(Mutex::new(device)))
}

unsafe fn construct(port: *const c_char, config: DeviceConfig, out: *mut SweepError) -> SweepDevice {
    let port = {
        // SAFETY: We validate null and UTF-8 in helper.
        match unsafe { transport::required_str_arg(port, "port", out) } {
            Some(v) => v,
            None => return SweepDevice::NULL,
        }
    };

    match Device::open(port, config) {
        Ok(device) => register_device(device),
        Err(err) => {
            error::report_device_error(out, &err);
            SweepDevice::NULL
        }
    }
}

/// Open `port` at the default bitrate.
///
/// # Safety
/// `port` must be a valid NUL-terminated C string. `error` must be null or
/// point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_device_construct_simple(
    port: *const c_char,
    error: *mut SweepError,
) -> SweepDevice {
    crate::ffi_boundary(error, SweepDevice::NULL, || {
        // SAFETY: Forwarded caller contract.
        unsafe { construct(port, DeviceConfig::default(), error) }
    })
}

/// Open `port` at `bitrate`.
///
/// # Safety
/// `port` must be a valid NUL-terminated C string. `error` must be null or
/// point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_device_construct(
    port: *const c_char,
    bitrate: i32,
    error: *mut SweepError,
) -> SweepDevice {
    crate::ffi_boundary(error, SweepDevice::NULL, || {
        let Some(bitrate) = transport::bitrate_arg(bitrate, error) else {
            return SweepDevice::NULL;
        };
        let config = DeviceConfig::default().with_bitrate(bitrate);
        // SAFETY: Forwarded caller contract.
        unsafe { construct(port, config, error) }
    })
}

/// Stop scanning if active and release the port. Destroying a handle twice
/// is ignored.
#[no_mangle]
pub extern "C" fn sweep_device_destruct(device: SweepDevice) {
    crate::ffi_boundary(std::ptr::null_mut(), (), || {
        let removed = lock(&DEVICES).remove(device.0);
        match removed {
            // The session closes when the last in-flight call releases it.
            Some(shared) => drop(shared),
            None => warn!(handle = device.0, "ignoring destruct of invalid device handle"),
        }
    });
}

/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_device_start_scanning(device: SweepDevice, error: *mut SweepError) {
    crate::ffi_boundary(error, (), || {
        with_device(device, error, (), |d| d.start_scanning())
    });
}

/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_device_stop_scanning(device: SweepDevice, error: *mut SweepError) {
    crate::ffi_boundary(error, (), || {
        with_device(device, error, (), |d| d.stop_scanning())
    });
}

/// Motor speed in Hz, or -1 on error.
///
/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_device_get_motor_speed(
    device: SweepDevice,
    error: *mut SweepError,
) -> i32 {
    crate::ffi_boundary(error, -1, || {
        with_device(device, error, -1, |d| d.motor_speed())
    })
}

/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_device_set_motor_speed(
    device: SweepDevice,
    hz: i32,
    error: *mut SweepError,
) {
    crate::ffi_boundary(error, (), || {
        with_device(device, error, (), |d| d.set_motor_speed(hz))
    });
}

/// Nominal sample rate in Hz, or -1 on error.
///
/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_device_get_sample_rate(
    device: SweepDevice,
    error: *mut SweepError,
) -> i32 {
    crate::ffi_boundary(error, -1, || {
        with_device(device, error, -1, |d| d.sample_rate())
    })
}

/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_device_set_sample_rate(
    device: SweepDevice,
    hz: i32,
    error: *mut SweepError,
) {
    crate::ffi_boundary(error, (), || {
        with_device(device, error, (), |d| d.set_sample_rate(hz))
    });
}

/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_device_reset(device: SweepDevice, error: *mut SweepError) {
    crate::ffi_boundary(error, (), || with_device(device, error, (), |d| d.reset()));
}

/// Block until one full revolution is available.
///
/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_device_get_scan(
    device: SweepDevice,
    error: *mut SweepError,
) -> SweepScan {
    crate::ffi_boundary(error, SweepScan::NULL, || {
        with_device(device, error, SweepScan::NULL, |d| {
            d.get_scan().map(scan::register)
        })
    })
}
