use std::ffi::CStr;
use std::os::raw::c_char;

use sweep_device::ErrorKind;

use crate::error;
use crate::types::SweepError;

/// Convert a required C string argument into UTF-8 `&str`.
///
/// # Safety
/// `value` must be null or point to a valid NUL-terminated C string.
pub(crate) unsafe fn required_str_arg<'a>(
    value: *const c_char,
    name: &str,
    out: *mut SweepError,
) -> Option<&'a str> {
    if value.is_null() {
        error::report(out, ErrorKind::InvalidParameter, format!("{name} cannot be null"));
        return None;
    }

    let as_cstr = {
        // SAFETY: The caller guarantees `value` points to a valid NUL-terminated C string.
        unsafe { CStr::from_ptr(value) }
    };

    match as_cstr.to_str() {
        Ok(v) => Some(v),
        Err(_) => {
            error::report(
                out,
                ErrorKind::InvalidParameter,
                format!("{name} must be valid UTF-8"),
            );
            None
        }
    }
}

/// Convert a C bitrate argument, rejecting non-positive values.
pub(crate) fn bitrate_arg(bitrate: i32, out: *mut SweepError) -> Option<u32> {
    match u32::try_from(bitrate) {
        Ok(rate) if rate > 0 => Some(rate),
        _ => {
            error::report(
                out,
                ErrorKind::InvalidParameter,
                format!("bitrate {bitrate} must be positive"),
            );
            None
        }
    }
}
