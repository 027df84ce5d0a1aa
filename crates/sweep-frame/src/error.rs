use crate::protocol::Mnemonic;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A complete frame failed checksum or structural validation.
    ///
    /// The decoder has already dropped exactly one byte; decoding again
    /// resynchronizes on the next frame boundary.
    #[error("corrupt {what} frame: {detail}")]
    CorruptFrame { what: &'static str, detail: String },

    /// No byte arrived within the transport timeout.
    #[error("timed out waiting for frame")]
    Timeout,

    /// A response was requested for a command the device never answers.
    #[error("command {0} has no response")]
    NoResponse(Mnemonic),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
