//! sweep-ffi: C-ABI exports for the sweep LiDAR driver.
//!
//! Every handle is an opaque 64-bit value; 0 is null. Fallible entry points
//! take a trailing `sweep_error_s *` that is written only on failure and must
//! be released with [`sweep_error_destruct`].

mod device;
mod error;
mod registry;
mod scan;
mod transport;
mod types;

use std::os::raw::c_char;
use std::panic::AssertUnwindSafe;

use tracing::warn;

pub use device::{
    register_device, sweep_device_construct, sweep_device_construct_simple,
    sweep_device_destruct, sweep_device_get_motor_speed, sweep_device_get_sample_rate,
    sweep_device_get_scan, sweep_device_reset, sweep_device_set_motor_speed,
    sweep_device_set_sample_rate, sweep_device_start_scanning, sweep_device_stop_scanning,
};
pub use scan::{
    sweep_scan_destruct, sweep_scan_get_angle, sweep_scan_get_distance,
    sweep_scan_get_number_of_samples, sweep_scan_get_signal_strength,
};
pub use types::{
    SweepDevice, SweepError, SweepScan, SWEEP_ERROR_CORRUPT_FRAME, SWEEP_ERROR_DEVICE_FAULT,
    SWEEP_ERROR_DEVICE_UNREACHABLE, SWEEP_ERROR_INDEX_OUT_OF_RANGE, SWEEP_ERROR_INTERNAL,
    SWEEP_ERROR_INVALID_HANDLE, SWEEP_ERROR_INVALID_PARAMETER, SWEEP_ERROR_NOT_SCANNING,
    SWEEP_ERROR_PROTOCOL_MISMATCH, SWEEP_ERROR_SCANNING_ACTIVE, SWEEP_ERROR_TIMEOUT,
    SWEEP_ERROR_TRANSPORT,
};

fn ffi_boundary<T>(error: *mut SweepError, on_panic: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error::report_panic(error);
            on_panic
        }
    }
}

/// Library version as `MAJOR << 16 | MINOR`.
#[no_mangle]
pub extern "C" fn sweep_get_version() -> i32 {
    ffi_boundary(std::ptr::null_mut(), -1, || {
        i32::try_from(sweep_device::version()).unwrap_or(i32::MAX)
    })
}

/// Whether a caller built against `caller_version` can use this library.
#[no_mangle]
pub extern "C" fn sweep_is_abi_compatible(caller_version: i32) -> bool {
    ffi_boundary(std::ptr::null_mut(), false, || {
        u32::try_from(caller_version).is_ok_and(sweep_device::is_abi_compatible)
    })
}

/// Message text of `error`, or null for an invalid handle.
///
/// The string is owned by the error and valid until [`sweep_error_destruct`].
#[no_mangle]
pub extern "C" fn sweep_error_message(error: SweepError) -> *const c_char {
    ffi_boundary(std::ptr::null_mut(), std::ptr::null(), || {
        error::message_ptr(error)
    })
}

/// Stable kind code of `error` (`SWEEP_ERROR_*`).
#[no_mangle]
pub extern "C" fn sweep_error_kind(error: SweepError) -> i32 {
    ffi_boundary(std::ptr::null_mut(), SWEEP_ERROR_INTERNAL, || {
        error::kind(error).map_or(SWEEP_ERROR_INVALID_HANDLE, |kind| kind.code())
    })
}

/// Release `error`. Destroying a handle twice is ignored.
#[no_mangle]
pub extern "C" fn sweep_error_destruct(error: SweepError) {
    ffi_boundary(std::ptr::null_mut(), (), || {
        if !error::destroy(error) {
            warn!(handle = error.0, "ignoring destruct of invalid error handle");
        }
    });
}

#[cfg(test)]
mod tests {
    use std::ffi::{CStr, CString};
    use std::os::raw::c_char;

    use super::*;

    #[test]
    fn version_matches_package() {
        let version = sweep_get_version();
        assert_eq!(version >> 16, env!("CARGO_PKG_VERSION_MAJOR").parse::<i32>().unwrap());
        assert!(sweep_is_abi_compatible(version));
        assert!(!sweep_is_abi_compatible(version + (1 << 16)));
        assert!(!sweep_is_abi_compatible(-1));
    }

    #[test]
    fn error_lifecycle() {
        let mut err = SweepError::NULL;
        // SAFETY: Null port is rejected before dereference; `err` is a valid slot.
        let device = unsafe { sweep_device_construct_simple(std::ptr::null(), &mut err) };
        assert!(device.is_null());
        assert!(!err.is_null());
        assert_eq!(sweep_error_kind(err), SWEEP_ERROR_INVALID_PARAMETER);

        let ptr = sweep_error_message(err);
        assert!(!ptr.is_null());
        // SAFETY: The message lives until the error is destroyed.
        let text = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap();
        assert!(text.contains("port"));

        sweep_error_destruct(err);
        assert!(sweep_error_message(err).is_null());
        assert_eq!(sweep_error_kind(err), SWEEP_ERROR_INVALID_HANDLE);
        sweep_error_destruct(err);
    }

    #[test]
    fn null_error_slot_discards_errors() {
        let port = CString::new("/dev/sweep-ffi-null-error-slot").unwrap();
        // SAFETY: `port` is a valid C string; a null error slot is allowed.
        let device = unsafe { sweep_device_construct(port.as_ptr(), 0, std::ptr::null_mut()) };
        assert!(device.is_null());
    }

    #[test]
    fn non_positive_bitrate_is_invalid() {
        let port = CString::new("/dev/sweep-ffi-bad-bitrate").unwrap();
        let mut err = SweepError::NULL;
        // SAFETY: Valid C string and error slot.
        let device = unsafe { sweep_device_construct(port.as_ptr(), -9600, &mut err) };
        assert!(device.is_null());
        assert_eq!(sweep_error_kind(err), SWEEP_ERROR_INVALID_PARAMETER);
        sweep_error_destruct(err);
    }

    #[test]
    fn invalid_utf8_port_is_rejected() {
        let bytes = [0xffu8, 0xfe, 0];
        let mut err = SweepError::NULL;
        // SAFETY: `bytes` is NUL-terminated.
        let device =
            unsafe { sweep_device_construct_simple(bytes.as_ptr().cast::<c_char>(), &mut err) };
        assert!(device.is_null());
        assert_eq!(sweep_error_kind(err), SWEEP_ERROR_INVALID_PARAMETER);
        sweep_error_destruct(err);
    }
}
