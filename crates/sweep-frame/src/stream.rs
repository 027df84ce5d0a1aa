use std::io::{ErrorKind, Read, Write};
use std::time::Instant;

use bytes::BytesMut;
use sweep_transport::{Transport, TransportError};
use tracing::trace;

use crate::codec::{encode_command, Command, Expect, Frame, FrameDecoder};
use crate::error::{FrameError, Result};

/// Buffer sizing for a [`FrameStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Bytes requested from the transport per read.
    pub read_chunk_size: usize,
    /// Initial capacity of the receive buffer.
    pub initial_capacity: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 512,
            initial_capacity: 4 * 1024,
        }
    }
}

/// Sends commands and reads complete frames over any `Read + Write` stream.
///
/// Handles partial reads internally, so callers always get complete frames.
/// A transport read timeout surfaces as [`FrameError::Timeout`] and keeps any
/// partially received bytes for the next call.
pub struct FrameStream<T> {
    inner: T,
    buf: BytesMut,
    out: BytesMut,
    decoder: FrameDecoder,
    config: FrameConfig,
}

impl<T: Read + Write> FrameStream<T> {
    /// Create a new frame stream with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame stream with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(config.initial_capacity),
            out: BytesMut::with_capacity(8),
            decoder: FrameDecoder::new(),
            config,
        }
    }

    /// Encode and send one command (blocking).
    pub fn send(&mut self, command: &Command) -> Result<()> {
        self.out.clear();
        encode_command(command, &mut self.out);
        trace!(mnemonic = %command.mnemonic, "sending command");

        let mut offset = 0usize;
        while offset < self.out.len() {
            match self.inner.write(&self.out[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => return Err(FrameError::Timeout),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => return Err(FrameError::Timeout),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Read the next complete frame of the expected kind (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self, expect: Expect) -> Result<Frame> {
        self.read_frame_inner(expect, None)
    }

    /// Like [`read_frame`](Self::read_frame), but fails with
    /// [`FrameError::Timeout`] once `deadline` passes, even while the peer
    /// keeps sending bytes that are not the expected frame.
    pub fn read_frame_before(&mut self, expect: Expect, deadline: Instant) -> Result<Frame> {
        self.read_frame_inner(expect, Some(deadline))
    }

    fn read_frame_inner(&mut self, expect: Expect, deadline: Option<Instant>) -> Result<Frame> {
        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buf, expect)? {
                return Ok(frame);
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                trace!(buffered = self.buf.len(), "frame deadline passed");
                return Err(FrameError::Timeout);
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => return Err(FrameError::Timeout),
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Drop everything received but not yet decoded.
    pub fn discard_buffered(&mut self) {
        if !self.buf.is_empty() {
            trace!(discarded = self.buf.len(), "discarding buffered bytes");
        }
        self.buf.clear();
        self.decoder.reset();
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the stream and return the inner transport.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame stream configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Transport> FrameStream<T> {
    /// Discard buffered bytes on both sides of the transport.
    pub fn clear_input(&mut self) -> Result<()> {
        self.discard_buffered();
        self.inner.clear_input().map_err(transport_to_frame_error)
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}

fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) => FrameError::Io(io),
        TransportError::Closed => FrameError::ConnectionClosed,
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::{encode_sample, encode_status_response, SamplePacket};
    use crate::protocol::{Mnemonic, STATUS_OK};

    /// In-memory duplex: reads from `rx`, collects writes in `tx`.
    struct Duplex {
        rx: Cursor<Vec<u8>>,
        tx: Vec<u8>,
    }

    impl Duplex {
        fn new(rx: Vec<u8>) -> Self {
            Self {
                rx: Cursor::new(rx),
                tx: Vec::new(),
            }
        }
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.rx.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn send_writes_command_bytes() {
        let mut stream = FrameStream::new(Duplex::new(Vec::new()));
        stream.send(&Command::new(Mnemonic::StopScan)).unwrap();
        stream.send(&Command::set_motor_speed(4)).unwrap();
        assert_eq!(stream.get_ref().tx, b"DX\nMS04\n");
    }

    #[test]
    fn read_response_then_samples() {
        let mut wire = BytesMut::new();
        encode_status_response(Mnemonic::StartScan, STATUS_OK, &mut wire);
        encode_sample(&SamplePacket::new(0, 120, 50, true), &mut wire);
        encode_sample(&SamplePacket::new(16, 130, 60, false), &mut wire);

        let mut stream = FrameStream::new(Duplex::new(wire.to_vec()));
        let ack = stream
            .read_frame(Expect::Response(Mnemonic::StartScan))
            .unwrap();
        assert!(matches!(ack, Frame::Ack { mnemonic: Mnemonic::StartScan, .. }));

        let first = stream.read_frame(Expect::Sample).unwrap();
        let second = stream.read_frame(Expect::Sample).unwrap();
        assert!(matches!(first, Frame::Sample(s) if s.sync && s.distance == 120));
        assert!(matches!(second, Frame::Sample(s) if !s.sync && s.angle == 1000));
    }

    #[test]
    fn partial_read_handling() {
        let mut wire = BytesMut::new();
        encode_sample(&SamplePacket::new(32, 7, 9, false), &mut wire);

        let cfg = FrameConfig {
            read_chunk_size: 1,
            ..FrameConfig::default()
        };
        let mut stream = FrameStream::with_config(Duplex::new(wire.to_vec()), cfg);
        let frame = stream.read_frame(Expect::Sample).unwrap();
        assert!(matches!(frame, Frame::Sample(s) if s.distance == 7));
        assert_eq!(stream.config().read_chunk_size, 1);
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut stream = FrameStream::new(Duplex::new(b"DS0".to_vec()));
        let err = stream
            .read_frame(Expect::Response(Mnemonic::StartScan))
            .unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn timeout_keeps_partial_bytes() {
        let mut stream = FrameStream::new(TimeoutThenData {
            chunks: vec![b"DX0".to_vec(), Vec::new(), b"0P\n".to_vec()],
        });

        let err = stream
            .read_frame(Expect::Response(Mnemonic::StopScan))
            .unwrap_err();
        assert!(matches!(err, FrameError::Timeout));
        assert_eq!(stream.buffered(), 3);

        let frame = stream
            .read_frame(Expect::Response(Mnemonic::StopScan))
            .unwrap();
        assert!(matches!(frame, Frame::Ack { mnemonic: Mnemonic::StopScan, .. }));
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_status_response(Mnemonic::StopScan, STATUS_OK, &mut wire);

        let mut stream = FrameStream::new(InterruptedThenData {
            interrupted: false,
            inner: Duplex::new(wire.to_vec()),
        });
        let frame = stream
            .read_frame(Expect::Response(Mnemonic::StopScan))
            .unwrap();
        assert!(matches!(frame, Frame::Ack { .. }));
    }

    #[test]
    fn discard_buffered_drops_pending_bytes() {
        let mut stream = FrameStream::new(TimeoutThenData {
            chunks: vec![b"gar".to_vec(), Vec::new()],
        });
        assert!(stream.read_frame(Expect::Sample).is_err());
        assert_eq!(stream.buffered(), 3);

        stream.discard_buffered();
        assert_eq!(stream.buffered(), 0);
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut stream = FrameStream::new(ZeroWriter);
        let err = stream.send(&Command::new(Mnemonic::Reset)).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn deadline_bounds_wait_on_chatty_peer() {
        let mut stream = FrameStream::new(Endless);
        let deadline = Instant::now() + std::time::Duration::from_millis(50);
        let err = stream
            .read_frame_before(Expect::Response(Mnemonic::StopScan), deadline)
            .unwrap_err();
        assert!(matches!(err, FrameError::Timeout));
        assert!(Instant::now() >= deadline);
    }

    /// Never idle, never sends a response tag.
    struct Endless;

    impl Read for Endless {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            buf.fill(b'z');
            Ok(buf.len())
        }
    }

    impl Write for Endless {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Yields each chunk in turn; an empty chunk reports a timeout.
    struct TimeoutThenData {
        chunks: Vec<Vec<u8>>,
    }

    impl Read for TimeoutThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            if chunk.is_empty() {
                return Err(std::io::Error::from(ErrorKind::TimedOut));
            }
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    impl Write for TimeoutThenData {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Duplex,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    impl Write for InterruptedThenData {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.inner.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Read for ZeroWriter {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
