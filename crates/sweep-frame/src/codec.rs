use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::error::{FrameError, Result};
use crate::protocol::{
    parse_digits, sample_checksum, status_checksum, two_digits, Mnemonic, ResponseShape,
    SampleRate, ERROR_MASK, LF, SAMPLE_FRAME_LEN, STATUS_OK, SYNC_BIT,
};

/// Bytes the resynchronizing decoder may skip before it stops insisting on
/// two consecutive valid sample frames.
const MAX_RESYNC_SKIP: usize = 4096;

/// One ranging reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Angle in milli-degrees, `[0, 360000)`.
    pub angle: i32,
    /// Distance in centimetres. Zero means no return.
    pub distance: i32,
    /// Signal strength, 0..=255.
    pub signal_strength: u8,
    /// First sample of a new revolution.
    pub sync: bool,
}

impl Sample {
    /// Build a sample from its wire fields.
    pub fn from_wire(angle_raw: u16, distance: u16, signal_strength: u8, sync: bool) -> Self {
        Self {
            angle: angle_raw_to_millidegrees(angle_raw),
            distance: i32::from(distance),
            signal_strength,
            sync,
        }
    }

    /// Whether the device saw a return for this sample.
    pub fn is_valid(&self) -> bool {
        self.distance > 0
    }

    pub fn angle_degrees(&self) -> f64 {
        f64::from(self.angle) / 1000.0
    }
}

/// Convert the firmware's fixed-point angle (4 fractional bits, degrees).
pub fn angle_raw_to_millidegrees(raw: u16) -> i32 {
    i32::from(raw) * 1000 / 16
}

/// Inverse of [`angle_raw_to_millidegrees`], wrapping into one revolution.
pub fn millidegrees_to_angle_raw(millidegrees: i32) -> u16 {
    (i64::from(millidegrees.rem_euclid(360_000)) * 16 / 1000) as u16
}

/// A data sample as laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePacket {
    /// Sync bit plus error flags.
    pub flags: u8,
    pub angle_raw: u16,
    pub distance: u16,
    pub signal_strength: u8,
}

impl SamplePacket {
    pub fn new(angle_raw: u16, distance: u16, signal_strength: u8, sync: bool) -> Self {
        Self {
            flags: if sync { SYNC_BIT } else { 0 },
            angle_raw,
            distance,
            signal_strength,
        }
    }
}

/// A host → device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub mnemonic: Mnemonic,
    pub param: Option<[u8; 2]>,
}

impl Command {
    pub const fn new(mnemonic: Mnemonic) -> Self {
        Self {
            mnemonic,
            param: None,
        }
    }

    pub const fn with_param(mnemonic: Mnemonic, param: [u8; 2]) -> Self {
        Self {
            mnemonic,
            param: Some(param),
        }
    }

    /// `MS` with a two-digit speed in Hz.
    pub fn set_motor_speed(hz: u8) -> Self {
        Self::with_param(Mnemonic::SetMotorSpeed, two_digits(hz))
    }

    /// `LR` with the code for `rate`.
    pub fn set_sample_rate(rate: SampleRate) -> Self {
        Self::with_param(Mnemonic::SetSampleRate, rate.code())
    }

    /// The total wire size of this command.
    pub fn wire_size(&self) -> usize {
        3 + self.param.map_or(0, |p| p.len())
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_command(self, &mut buf);
        buf.freeze()
    }
}

/// A fault reported by the device itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    /// A command response carried a non-`00` status.
    Status { mnemonic: Mnemonic, code: u8 },
    /// A data sample carried error flags.
    Sample { flags: u8 },
}

impl std::fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFault::Status { mnemonic, code } => write!(
                f,
                "{mnemonic} rejected with status {code:02} ({})",
                crate::protocol::status_description(*code)
            ),
            DeviceFault::Sample { flags } => write!(f, "sample error flags {flags:#04x}"),
        }
    }
}

/// A decoded unit of wire data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Host command (seen by the device side).
    Command(Command),
    /// Accepted response. `payload` holds the echoed parameter or the
    /// queried value, and is empty for status-only responses.
    Ack { mnemonic: Mnemonic, payload: Bytes },
    /// One data sample.
    Sample(Sample),
    /// Device-reported fault.
    DeviceError(DeviceFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Command,
    Ack,
    Sample,
    DeviceError,
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Command(_) => FrameKind::Command,
            Frame::Ack { .. } => FrameKind::Ack,
            Frame::Sample(_) => FrameKind::Sample,
            Frame::DeviceError(_) => FrameKind::DeviceError,
        }
    }
}

/// What the next frame on the stream should be.
///
/// The protocol is not self-describing: a response is identified by the
/// command that caused it, and sample frames carry no marker at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Command,
    Response(Mnemonic),
    Sample,
}

/// Encode a command into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────┬──────┐
/// │ Mnemonic (2) │ Param (0 or 2)   │ LF   │
/// │ ASCII        │ ASCII digits     │ 0x0A │
/// └──────────────┴──────────────────┴──────┘
/// ```
pub fn encode_command(command: &Command, dst: &mut BytesMut) {
    dst.reserve(command.wire_size());
    dst.put_slice(&command.mnemonic.bytes());
    if let Some(param) = command.param {
        dst.put_slice(&param);
    }
    dst.put_u8(LF);
}

/// Encode a status-only response (`DS`, `DX`).
pub fn encode_status_response(mnemonic: Mnemonic, status: [u8; 2], dst: &mut BytesMut) {
    dst.put_slice(&mnemonic.bytes());
    dst.put_slice(&status);
    dst.put_u8(status_checksum(status));
    dst.put_u8(LF);
}

/// Encode a parameter echo response (`MS`, `LR`).
pub fn encode_param_response(
    mnemonic: Mnemonic,
    param: [u8; 2],
    status: [u8; 2],
    dst: &mut BytesMut,
) {
    dst.put_slice(&mnemonic.bytes());
    dst.put_slice(&param);
    dst.put_u8(LF);
    dst.put_slice(&status);
    dst.put_u8(status_checksum(status));
    dst.put_u8(LF);
}

/// Encode a value response (`MZ`, `MI`, `LI`, `IV`, `ID`).
pub fn encode_value_response(mnemonic: Mnemonic, value: &[u8], dst: &mut BytesMut) {
    dst.put_slice(&mnemonic.bytes());
    dst.put_slice(value);
    dst.put_u8(LF);
}

/// Encode one data sample.
///
/// Wire format (little-endian):
/// ```text
/// ┌───────────┬───────────┬──────────────┬────────┬──────────┐
/// │ Flags (1) │ Angle (2) │ Distance (2) │ Signal │ Checksum │
/// │ sync|err  │ deg << 4  │ cm           │ (1)    │ sum%255  │
/// └───────────┴───────────┴──────────────┴────────┴──────────┘
/// ```
pub fn encode_sample(packet: &SamplePacket, dst: &mut BytesMut) {
    let mut raw = [0u8; SAMPLE_FRAME_LEN];
    raw[0] = packet.flags;
    raw[1..3].copy_from_slice(&packet.angle_raw.to_le_bytes());
    raw[3..5].copy_from_slice(&packet.distance.to_le_bytes());
    raw[5] = packet.signal_strength;
    raw[6] = sample_checksum(&raw[..6]);
    dst.put_slice(&raw);
}

/// Decode the next frame of the expected kind from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. Bytes in front of a
/// response or command boundary are discarded. A complete frame that fails
/// validation yields [`FrameError::CorruptFrame`] after dropping exactly one
/// byte.
pub fn decode_frame(src: &mut BytesMut, expect: Expect) -> Result<Option<Frame>> {
    match expect {
        Expect::Sample => decode_sample(src),
        Expect::Response(mnemonic) => decode_response(src, mnemonic),
        Expect::Command => decode_command(src),
    }
}

fn corrupt<T>(src: &mut BytesMut, what: &'static str, detail: String) -> Result<T> {
    warn!(what, %detail, "corrupt frame, dropping one byte");
    src.advance(1);
    Err(FrameError::CorruptFrame { what, detail })
}

fn decode_sample(src: &mut BytesMut) -> Result<Option<Frame>> {
    if src.len() < SAMPLE_FRAME_LEN {
        return Ok(None); // Need more data
    }

    let expected = sample_checksum(&src[..SAMPLE_FRAME_LEN - 1]);
    let actual = src[SAMPLE_FRAME_LEN - 1];
    if actual != expected {
        return corrupt(
            src,
            "sample",
            format!("checksum {actual:#04x}, expected {expected:#04x}"),
        );
    }

    let flags = src[0];
    let angle_raw = u16::from_le_bytes([src[1], src[2]]);
    let distance = u16::from_le_bytes([src[3], src[4]]);
    let signal_strength = src[5];
    src.advance(SAMPLE_FRAME_LEN);

    if flags & ERROR_MASK != 0 {
        return Ok(Some(Frame::DeviceError(DeviceFault::Sample {
            flags: flags & ERROR_MASK,
        })));
    }

    Ok(Some(Frame::Sample(Sample::from_wire(
        angle_raw,
        distance,
        signal_strength,
        flags & SYNC_BIT != 0,
    ))))
}

/// Advance `src` to the first occurrence of `tag`. Returns false when the
/// tag is not (yet) present.
fn align_to_tag(src: &mut BytesMut, tag: [u8; 2]) -> bool {
    match src.windows(2).position(|w| w == tag) {
        Some(0) => true,
        Some(pos) => {
            trace!(discarded = pos, "skipping bytes before response");
            src.advance(pos);
            true
        }
        None => {
            // A trailing first byte may be the start of the tag.
            let keep = usize::from(src.last() == Some(&tag[0]));
            let discard = src.len() - keep;
            if discard > 0 {
                trace!(discarded = discard, "no response boundary in buffer");
                src.advance(discard);
            }
            false
        }
    }
}

fn decode_response(src: &mut BytesMut, mnemonic: Mnemonic) -> Result<Option<Frame>> {
    let len = mnemonic.response_len();
    if len == 0 {
        return Err(FrameError::NoResponse(mnemonic));
    }
    if !align_to_tag(src, mnemonic.bytes()) || src.len() < len {
        return Ok(None); // Need more data
    }

    match parse_response(mnemonic, &src[..len]) {
        Ok(frame) => {
            src.advance(len);
            Ok(Some(frame))
        }
        Err(detail) => corrupt(src, "response", detail),
    }
}

fn parse_response(mnemonic: Mnemonic, bytes: &[u8]) -> std::result::Result<Frame, String> {
    match mnemonic.response() {
        ResponseShape::Header => {
            if bytes[5] != LF {
                return Err(format!("{mnemonic} response missing terminator"));
            }
            let status = [bytes[2], bytes[3]];
            verify_status(mnemonic, status, bytes[4])?;
            Ok(status_frame(mnemonic, status, Bytes::new()))
        }
        ResponseShape::Param => {
            if bytes[4] != LF || bytes[8] != LF {
                return Err(format!("{mnemonic} response missing terminator"));
            }
            let status = [bytes[5], bytes[6]];
            verify_status(mnemonic, status, bytes[7])?;
            Ok(status_frame(
                mnemonic,
                status,
                Bytes::copy_from_slice(&bytes[2..4]),
            ))
        }
        ResponseShape::Value { len } => {
            if bytes[len - 1] != LF {
                return Err(format!("{mnemonic} response missing terminator"));
            }
            let value = &bytes[2..len - 1];
            let well_formed = match mnemonic {
                Mnemonic::MotorReady | Mnemonic::MotorInfo | Mnemonic::SampleRateInfo => {
                    value.iter().all(u8::is_ascii_digit)
                }
                _ => value.iter().all(|b| b.is_ascii_graphic() || *b == b' '),
            };
            if !well_formed {
                return Err(format!("{mnemonic} response value is malformed"));
            }
            Ok(Frame::Ack {
                mnemonic,
                payload: Bytes::copy_from_slice(value),
            })
        }
        ResponseShape::None => Err(format!("{mnemonic} has no response")),
    }
}

fn verify_status(mnemonic: Mnemonic, status: [u8; 2], sum: u8) -> std::result::Result<(), String> {
    let expected = status_checksum(status);
    if sum != expected {
        return Err(format!(
            "{mnemonic} status checksum {sum:#04x}, expected {expected:#04x}"
        ));
    }
    Ok(())
}

fn status_frame(mnemonic: Mnemonic, status: [u8; 2], payload: Bytes) -> Frame {
    if status == STATUS_OK {
        return Frame::Ack { mnemonic, payload };
    }
    let code = parse_digits(&status).map_or(99, |c| c.min(99) as u8);
    debug!(%mnemonic, code, "device rejected command");
    Frame::DeviceError(DeviceFault::Status { mnemonic, code })
}

fn is_mnemonic_lead(byte: u8) -> bool {
    Mnemonic::ALL.iter().any(|m| m.bytes()[0] == byte)
}

fn decode_command(src: &mut BytesMut) -> Result<Option<Frame>> {
    match src
        .windows(2)
        .position(|w| Mnemonic::from_bytes([w[0], w[1]]).is_some())
    {
        Some(0) => {}
        Some(pos) => src.advance(pos),
        None => {
            let keep = usize::from(src.last().is_some_and(|b| is_mnemonic_lead(*b)));
            let discard = src.len() - keep;
            src.advance(discard);
            return Ok(None);
        }
    }

    let Some(mnemonic) = Mnemonic::from_bytes([src[0], src[1]]) else {
        return Ok(None);
    };
    let len = if mnemonic.has_param() { 5 } else { 3 };
    if src.len() < len {
        return Ok(None); // Need more data
    }
    if src[len - 1] != LF {
        return corrupt(src, "command", format!("{mnemonic} missing terminator"));
    }

    let param = if mnemonic.has_param() {
        let param = [src[2], src[3]];
        if !param.iter().all(u8::is_ascii_digit) {
            return corrupt(src, "command", format!("{mnemonic} parameter is not numeric"));
        }
        Some(param)
    } else {
        None
    };

    src.advance(len);
    Ok(Some(Frame::Command(Command { mnemonic, param })))
}

/// Stateful decoder that recovers from corrupt sample frames.
///
/// Sample frames have no start marker, so after a checksum failure the
/// decoder drops one byte (surfacing a single `CorruptFrame`) and then
/// silently slides forward until two consecutive 7-byte windows validate.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    resyncing: bool,
    skipped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next frame, resynchronizing sample alignment as needed.
    pub fn decode(&mut self, src: &mut BytesMut, expect: Expect) -> Result<Option<Frame>> {
        if expect != Expect::Sample {
            self.reset();
            return decode_frame(src, expect);
        }

        if self.resyncing && !self.realign(src) {
            return Ok(None); // Need more data
        }

        match decode_sample(src) {
            Err(err) => {
                self.resyncing = true;
                Err(err)
            }
            other => other,
        }
    }

    /// Whether the decoder is hunting for sample alignment.
    pub fn is_resyncing(&self) -> bool {
        self.resyncing
    }

    /// Forget any resync state.
    pub fn reset(&mut self) {
        self.resyncing = false;
        self.skipped = 0;
    }

    fn realign(&mut self, src: &mut BytesMut) -> bool {
        while src.len() >= 2 * SAMPLE_FRAME_LEN {
            if self.skipped >= MAX_RESYNC_SKIP {
                warn!(skipped = self.skipped, "giving up on strict sample realignment");
                self.reset();
                return true;
            }
            if window_aligned(&src[..SAMPLE_FRAME_LEN])
                && window_aligned(&src[SAMPLE_FRAME_LEN..2 * SAMPLE_FRAME_LEN])
            {
                debug!(skipped = self.skipped, "sample stream resynchronized");
                self.reset();
                return true;
            }
            src.advance(1);
            self.skipped += 1;
        }
        false
    }
}

fn window_aligned(window: &[u8]) -> bool {
    window[SAMPLE_FRAME_LEN - 1] == sample_checksum(&window[..SAMPLE_FRAME_LEN - 1])
        && window[0] & ERROR_MASK == 0
}
