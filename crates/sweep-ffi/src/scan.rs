use std::sync::{Arc, Mutex};

use sweep_device::{ErrorKind, Scan};
use tracing::warn;

use crate::error;
use crate::registry::{lock, HandleTable};
use crate::types::{SweepError, SweepScan};

static SCANS: Mutex<HandleTable<Scan>> = Mutex::new(HandleTable::new());

pub(crate) fn register(scan: Scan) -> SweepScan {
    SweepScan(lock(&SCANS).insert(scan))
}

fn with_scan(
    handle: SweepScan,
    out: *mut SweepError,
    f: impl FnOnce(&Scan) -> sweep_device::Result<i32>,
) -> i32 {
    let Some(scan): Option<Arc<Scan>> = lock(&SCANS).get(handle.0) else {
        error::report_invalid_handle(out, "scan");
        return -1;
    };
    match f(&scan) {
        Ok(value) => value,
        Err(err) => {
            error::report_device_error(out, &err);
            -1
        }
    }
}

/// Like [`with_scan`] for per-sample accessors; a negative index is out of range.
fn with_sample(
    handle: SweepScan,
    index: i32,
    out: *mut SweepError,
    f: impl FnOnce(&Scan, usize) -> sweep_device::Result<i32>,
) -> i32 {
    with_scan(handle, out, |scan| match usize::try_from(index) {
        Ok(index) => f(scan, index),
        Err(_) => Ok(negative_index(out, index)),
    })
}

fn negative_index(out: *mut SweepError, index: i32) -> i32 {
    error::report(
        out,
        ErrorKind::IndexOutOfRange,
        format!("sample index {index} is negative"),
    );
    -1
}

/// Destroying a handle twice is ignored.
#[no_mangle]
pub extern "C" fn sweep_scan_destruct(scan: SweepScan) {
    crate::ffi_boundary(std::ptr::null_mut(), (), || {
        if lock(&SCANS).remove(scan.0).is_none() {
            warn!(handle = scan.0, "ignoring destruct of invalid scan handle");
        }
    });
}

/// Number of samples, or -1 for an invalid handle.
///
/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_scan_get_number_of_samples(
    scan: SweepScan,
    error: *mut SweepError,
) -> i32 {
    crate::ffi_boundary(error, -1, || {
        with_scan(scan, error, |s| {
            Ok(i32::try_from(s.len()).unwrap_or(i32::MAX))
        })
    })
}

/// Angle of sample `index` in milli-degrees, or -1 on error.
///
/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_scan_get_angle(
    scan: SweepScan,
    index: i32,
    error: *mut SweepError,
) -> i32 {
    crate::ffi_boundary(error, -1, || {
        with_sample(scan, index, error, |s, i| s.angle(i))
    })
}

/// Distance of sample `index` in centimetres, or -1 on error.
///
/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_scan_get_distance(
    scan: SweepScan,
    index: i32,
    error: *mut SweepError,
) -> i32 {
    crate::ffi_boundary(error, -1, || {
        with_sample(scan, index, error, |s, i| s.distance(i))
    })
}

/// Signal strength of sample `index` (0..=255), or -1 on error.
///
/// # Safety
/// `error` must be null or point to a writable `sweep_error_s`.
#[no_mangle]
pub unsafe extern "C" fn sweep_scan_get_signal_strength(
    scan: SweepScan,
    index: i32,
    error: *mut SweepError,
) -> i32 {
    crate::ffi_boundary(error, -1, || {
        with_sample(scan, index, error, |s, i| {
            s.signal_strength(i).map(i32::from)
        })
    })
}
