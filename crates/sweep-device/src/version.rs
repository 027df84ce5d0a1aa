//! Library version and ABI compatibility.

const fn parse_u32(text: &str) -> u32 {
    let bytes = text.as_bytes();
    let mut value = 0u32;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}

pub const VERSION_MAJOR: u32 = parse_u32(env!("CARGO_PKG_VERSION_MAJOR"));
pub const VERSION_MINOR: u32 = parse_u32(env!("CARGO_PKG_VERSION_MINOR"));

/// `MAJOR << 16 | MINOR`.
pub const VERSION: u32 = (VERSION_MAJOR << 16) | VERSION_MINOR;

/// Runtime library version.
pub fn version() -> u32 {
    VERSION
}

/// Whether code built against `caller_version` can use this library.
///
/// Only the major version must agree.
pub fn is_abi_compatible(caller_version: u32) -> bool {
    caller_version >> 16 == VERSION_MAJOR
}
