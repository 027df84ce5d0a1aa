use sweep_device::ErrorKind;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub u64);

        impl $name {
            pub const NULL: Self = Self(0);

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

handle_type!(
    /// Opaque device session handle (`sweep_device_s`).
    SweepDevice
);
handle_type!(
    /// Opaque scan handle (`sweep_scan_s`).
    SweepScan
);
handle_type!(
    /// Opaque error handle (`sweep_error_s`).
    SweepError
);

pub const SWEEP_ERROR_DEVICE_UNREACHABLE: i32 = ErrorKind::DeviceUnreachable as i32;
pub const SWEEP_ERROR_TIMEOUT: i32 = ErrorKind::Timeout as i32;
pub const SWEEP_ERROR_CORRUPT_FRAME: i32 = ErrorKind::CorruptFrame as i32;
pub const SWEEP_ERROR_DEVICE_FAULT: i32 = ErrorKind::DeviceFault as i32;
pub const SWEEP_ERROR_PROTOCOL_MISMATCH: i32 = ErrorKind::ProtocolMismatch as i32;
pub const SWEEP_ERROR_INVALID_PARAMETER: i32 = ErrorKind::InvalidParameter as i32;
pub const SWEEP_ERROR_NOT_SCANNING: i32 = ErrorKind::NotScanning as i32;
pub const SWEEP_ERROR_INDEX_OUT_OF_RANGE: i32 = ErrorKind::IndexOutOfRange as i32;
pub const SWEEP_ERROR_SCANNING_ACTIVE: i32 = ErrorKind::ScanningActive as i32;
pub const SWEEP_ERROR_INVALID_HANDLE: i32 = ErrorKind::InvalidHandle as i32;
pub const SWEEP_ERROR_TRANSPORT: i32 = ErrorKind::Transport as i32;
pub const SWEEP_ERROR_INTERNAL: i32 = ErrorKind::Internal as i32;
