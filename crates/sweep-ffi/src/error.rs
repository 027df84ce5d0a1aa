use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::Mutex;

use sweep_device::{DeviceError, ErrorKind};
use tracing::debug;

use crate::registry::{lock, HandleTable};
use crate::types::SweepError;

pub(crate) struct ErrorRecord {
    pub(crate) kind: ErrorKind,
    pub(crate) message: CString,
}

static ERRORS: Mutex<HandleTable<ErrorRecord>> = Mutex::new(HandleTable::new());

/// Hand an error to the caller through `out`. A null `out` discards it.
pub(crate) fn report(out: *mut SweepError, kind: ErrorKind, message: impl Into<String>) {
    let message = message.into();
    debug!(%kind, %message, "reporting error across FFI");
    if out.is_null() {
        return;
    }

    let sanitized = message.replace('\0', "?");
    let message = CString::new(sanitized).unwrap_or_default();
    let handle = lock(&ERRORS).insert(ErrorRecord { kind, message });

    // SAFETY: Non-null `out` is a writable error slot per the caller contract.
    unsafe {
        *out = SweepError(handle);
    }
}

pub(crate) fn report_device_error(out: *mut SweepError, err: &DeviceError) {
    report(out, err.kind(), err.to_string());
}

pub(crate) fn report_invalid_handle(out: *mut SweepError, what: &str) {
    report(
        out,
        ErrorKind::InvalidHandle,
        format!("{what} handle is null, foreign or already destroyed"),
    );
}

pub(crate) fn report_panic(out: *mut SweepError) {
    report(out, ErrorKind::Internal, "panic across FFI boundary");
}

/// Message text for `error`, or null for an invalid handle.
///
/// The pointer stays valid until the error is destroyed.
pub(crate) fn message_ptr(error: SweepError) -> *const c_char {
    match lock(&ERRORS).get(error.0) {
        // The record outlives the table lock: the table keeps its own `Arc`
        // until `sweep_error_destruct`.
        Some(record) => record.message.as_ptr(),
        None => std::ptr::null(),
    }
}

pub(crate) fn kind(error: SweepError) -> Option<ErrorKind> {
    lock(&ERRORS).get(error.0).map(|record| record.kind)
}

pub(crate) fn destroy(error: SweepError) -> bool {
    lock(&ERRORS).remove(error.0).is_some()
}
