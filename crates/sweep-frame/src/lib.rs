//! Framing for the LiDAR serial protocol.
//!
//! The host speaks ASCII commands, the device answers with fixed-size
//! responses and, while scanning, an unmarked stream of 7-byte sample frames:
//!
//! ```text
//! host   → DS\n
//! device ← DS 00 P \n                          (status response)
//! device ← [flags][angle LE][dist LE][sig][sum] (sample, repeated)
//! ```
//!
//! Responses are located by their mnemonic echo. Sample frames carry only a
//! checksum, so [`FrameDecoder`] realigns after corruption by dropping one
//! byte and waiting for two consecutive frames that validate.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod stream;

pub use codec::{
    angle_raw_to_millidegrees, decode_frame, encode_command, encode_param_response, encode_sample,
    encode_status_response, encode_value_response, millidegrees_to_angle_raw, Command,
    DeviceFault, Expect, Frame, FrameDecoder, FrameKind, Sample, SamplePacket,
};
pub use error::{FrameError, Result};
pub use protocol::{
    Mnemonic, ResponseShape, SampleRate, MAX_MOTOR_SPEED_HZ, MIN_MOTOR_SPEED_HZ, PROTOCOL_MAJOR,
    SAMPLE_FRAME_LEN, STATUS_OK,
};
pub use stream::{FrameConfig, FrameStream};
