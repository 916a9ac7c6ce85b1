//! A byte-oriented view over a single MIDI message as stored in a track.

use crate::{
    meta::{self, MetaMessage},
    prelude::*,
    primitive::{decode_varlen, push_varlen_len},
};
use core::fmt;

/// The number of data bytes that follow a channel status, indexed by its high nibble.
const DATA_LEN_BY_STATUS: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 2, 2, 2, 2, 1, 1, 2, 0];

/// The number of data bytes of a channel message with the given status.
#[inline]
pub(crate) fn channel_data_len(status: u8) -> usize {
    DATA_LEN_BY_STATUS[(status >> 4) as usize] as usize
}

/// A single message of a track, stored as its canonical raw bytes.
///
/// - Channel messages always carry their status byte (running status only exists on the wire).
/// - Meta messages are stored as `0xFF, type, VLQ(length), payload`.
/// - Sysex packets and escapes are stored as `0xF0 | 0xF7, VLQ(length), payload`.
///
/// A `Message` can only be built through validating constructors, so the raw bytes are always
/// well framed and [`kind`](#method.kind) never fails.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Message {
    raw: Vec<u8>,
    /// Offset of the payload (the data after status, type and length).
    head: u8,
}

/// A typed projection of a [`Message`](struct.Message.html).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MessageKind<'a> {
    /// A message associated to a MIDI channel carrying musical data.
    Channel {
        /// The MIDI channel, `0..=15`.
        channel: u8,
        /// The message type and associated data.
        message: ChannelMessage,
    },
    /// A meta message, only found in files.
    Meta(MetaMessage<'a>),
    /// A system exclusive packet introduced by `0xF0`.
    ///
    /// The data does not include the `0xF0` prefix. A complete message ends with `0xF7`, while
    /// the first packet of a split message does not.
    SysEx(&'a [u8]),
    /// A packet introduced by `0xF7`: either the continuation of a split sysex message or an
    /// escape sequence carrying arbitrary bytes. See [`SysexState`](struct.SysexState.html).
    Escape(&'a [u8]),
}

/// A MIDI channel message, without its channel.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ChannelMessage {
    /// Stop playing a note.
    NoteOff {
        /// The MIDI key to stop playing.
        key: u8,
        /// The velocity with which to stop playing it.
        vel: u8,
    },
    /// Start playing a note.
    NoteOn {
        /// The key to start playing.
        key: u8,
        /// The velocity with which to press it.
        ///
        /// By convention a `NoteOn` message with a velocity of 0 is a `NoteOff`.
        vel: u8,
    },
    /// Modify the pressure of a single held note (polyphonic aftertouch).
    Aftertouch {
        /// The key to modify.
        key: u8,
        /// The new pressure.
        vel: u8,
    },
    /// Modify the value of a MIDI controller.
    Controller {
        /// The controller to modify.
        controller: u8,
        /// The value to set it to.
        value: u8,
    },
    /// Change the program (instrument) of the channel.
    ProgramChange {
        /// The new program.
        program: u8,
    },
    /// Modify the pressure of the whole channel at once.
    ChannelAftertouch {
        /// The new pressure.
        vel: u8,
    },
    /// Set the pitch bend of the whole channel.
    PitchBend {
        /// The new pitch bend value.
        bend: PitchBend,
    },
}
impl ChannelMessage {
    /// The high nibble of the status byte of this message type.
    pub fn status_nibble(&self) -> u8 {
        match self {
            ChannelMessage::NoteOff { .. } => 0x8,
            ChannelMessage::NoteOn { .. } => 0x9,
            ChannelMessage::Aftertouch { .. } => 0xA,
            ChannelMessage::Controller { .. } => 0xB,
            ChannelMessage::ProgramChange { .. } => 0xC,
            ChannelMessage::ChannelAftertouch { .. } => 0xD,
            ChannelMessage::PitchBend { .. } => 0xE,
        }
    }

    /// The data bytes of this message and how many of them are used.
    fn data(&self) -> ([u8; 2], usize) {
        match *self {
            ChannelMessage::NoteOff { key, vel }
            | ChannelMessage::NoteOn { key, vel }
            | ChannelMessage::Aftertouch { key, vel } => ([key, vel], 2),
            ChannelMessage::Controller { controller, value } => ([controller, value], 2),
            ChannelMessage::ProgramChange { program } => ([program, 0], 1),
            ChannelMessage::ChannelAftertouch { vel } => ([vel, 0], 1),
            ChannelMessage::PitchBend { bend } => {
                //Little-endian, unlike everything else in a file
                let raw = bend.raw();
                ([(raw & 0x7F) as u8, (raw >> 7) as u8], 2)
            }
        }
    }

    /// Decode a channel message from its status byte and data bytes.
    ///
    /// `status` must be in `0x80..=0xEF` and data bytes must already be 7-bit.
    fn decode(status: u8, data: &[u8]) -> (u8, ChannelMessage) {
        let d0 = data.first().copied().unwrap_or(0);
        let d1 = data.get(1).copied().unwrap_or(0);
        let message = match status >> 4 {
            0x8 => ChannelMessage::NoteOff { key: d0, vel: d1 },
            0x9 => ChannelMessage::NoteOn { key: d0, vel: d1 },
            0xA => ChannelMessage::Aftertouch { key: d0, vel: d1 },
            0xB => ChannelMessage::Controller {
                controller: d0,
                value: d1,
            },
            0xC => ChannelMessage::ProgramChange { program: d0 },
            0xD => ChannelMessage::ChannelAftertouch { vel: d0 },
            _ => ChannelMessage::PitchBend {
                bend: PitchBend((d1 as u16) << 7 | d0 as u16),
            },
        };
        (status & 0x0F, message)
    }
}

/// The value of a pitch bend, a 14-bit quantity.
///
/// A raw value of `0x0000` indicates full bend downwards, `0x2000` no bend and `0x3FFF` full bend
/// upwards.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct PitchBend(u16);
impl PitchBend {
    /// The raw value of a centered pitch bend.
    pub const CENTER: u16 = 0x2000;

    /// Create a pitch bend from a signed value in `-8192..=8191`.
    ///
    /// Values outside this range fail with `ErrorKind::OutOfRange`.
    pub fn new(value: i16) -> Result<PitchBend> {
        ensure!(
            (-0x2000..=0x1FFF).contains(&value),
            err_range!("pitch bend outside -8192..=8191")
        );
        Ok(PitchBend((value + 0x2000) as u16))
    }

    /// Create a pitch bend from its raw 14-bit value in `0..=16383`.
    pub fn from_raw(raw: u16) -> Result<PitchBend> {
        ensure!(raw <= 0x3FFF, err_range!("raw pitch bend exceeds 14 bits"));
        Ok(PitchBend(raw))
    }

    /// The signed value, in `-8192..=8191`.
    #[inline]
    pub fn value(self) -> i16 {
        self.0 as i16 - 0x2000
    }

    /// The raw value, in `0..=16383`.
    #[inline]
    pub fn raw(self) -> u16 {
        self.0
    }
}
impl Default for PitchBend {
    fn default() -> PitchBend {
        PitchBend(PitchBend::CENTER)
    }
}

impl Message {
    //Constructors

    /// Build a channel message.
    ///
    /// Fails with `ErrorKind::OutOfRange` if `channel` is above 15 or a data byte is above 127.
    pub fn channel(channel: u8, message: ChannelMessage) -> Result<Message> {
        ensure!(channel < 16, err_range!("midi channel above 15"));
        let (data, len) = message.data();
        ensure!(
            data[..len].iter().all(|&b| b < 0x80),
            err_range!("midi data byte above 127")
        );
        let mut raw = Vec::with_capacity(1 + len);
        raw.push(message.status_nibble() << 4 | channel);
        raw.extend_from_slice(&data[..len]);
        Ok(Message { raw, head: 1 })
    }

    pub fn note_on(channel: u8, key: u8, vel: u8) -> Result<Message> {
        Message::channel(channel, ChannelMessage::NoteOn { key, vel })
    }

    pub fn note_off(channel: u8, key: u8, vel: u8) -> Result<Message> {
        Message::channel(channel, ChannelMessage::NoteOff { key, vel })
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Result<Message> {
        Message::channel(channel, ChannelMessage::Controller { controller, value })
    }

    pub fn program_change(channel: u8, program: u8) -> Result<Message> {
        Message::channel(channel, ChannelMessage::ProgramChange { program })
    }

    pub fn pitch_bend(channel: u8, bend: PitchBend) -> Result<Message> {
        Message::channel(channel, ChannelMessage::PitchBend { bend })
    }

    /// Build a meta message from its type byte and payload.
    ///
    /// Fails with `ErrorKind::UnexpectedMessageLength` if the type has a fixed payload size that
    /// `payload` does not match.
    pub fn meta(ty: u8, payload: &[u8]) -> Result<Message> {
        meta::check_len(ty, payload.len() as u32).context("failed to build meta message")?;
        Message::meta_unchecked(ty, payload)
    }

    /// Encode a typed meta message.
    pub fn from_meta(meta: &MetaMessage) -> Result<Message> {
        let mut payload = Vec::new();
        meta.write_payload(&mut payload)?;
        Message::meta(meta.type_byte(), &payload)
    }

    fn meta_unchecked(ty: u8, payload: &[u8]) -> Result<Message> {
        let mut raw = Vec::with_capacity(payload.len() + 6);
        raw.push(0xFF);
        raw.push(ty);
        push_varlen_len(payload.len(), &mut raw)?;
        let head = raw.len() as u8;
        raw.extend_from_slice(payload);
        Ok(Message { raw, head })
    }

    /// A set tempo meta message for the given beats per minute.
    ///
    /// `bpm` must be finite and positive. The microseconds per beat are rounded to the nearest
    /// integer and clamped to the 24-bit field, `1..=0xFFFFFF`.
    pub fn tempo(bpm: f64) -> Result<Message> {
        ensure!(
            bpm.is_finite() && bpm > 0.0,
            err_range!("tempo must be finite and positive")
        );
        let micros = crate::primitive::round_u64(60_000_000.0 / bpm).clamp(1, 0xFF_FFFF);
        Message::tempo_micros(micros as u32)
    }

    /// A set tempo meta message in microseconds per beat.
    pub fn tempo_micros(micros: u32) -> Result<Message> {
        Message::from_meta(&MetaMessage::Tempo(micros))
    }

    /// A time signature meta message. The denominator is given as a power of two.
    pub fn time_signature(
        num: u8,
        den_pow2: u8,
        clocks: u8,
        n32_per_quarter: u8,
    ) -> Result<Message> {
        Message::from_meta(&MetaMessage::TimeSignature(
            num,
            den_pow2,
            clocks,
            n32_per_quarter,
        ))
    }

    pub fn key_signature(sharps: i8, minor: bool) -> Result<Message> {
        Message::from_meta(&MetaMessage::KeySignature(sharps, minor))
    }

    pub fn text(text: &str) -> Result<Message> {
        Message::meta(meta::TEXT, text.as_bytes())
    }

    pub fn track_name(name: &str) -> Result<Message> {
        Message::meta(meta::TRACK_NAME, name.as_bytes())
    }

    /// The end-of-track meta message, `FF 2F 00`.
    pub fn end_of_track() -> Message {
        Message {
            raw: vec![0xFF, meta::END_OF_TRACK, 0x00],
            head: 3,
        }
    }

    /// A sysex packet introduced by `0xF0`.
    ///
    /// `data` does not include the `0xF0` prefix; it should end with `0xF7` unless it is the first
    /// packet of a split message.
    pub fn sysex(data: &[u8]) -> Result<Message> {
        Message::framed(0xF0, data)
    }

    /// A packet introduced by `0xF7`: a sysex continuation or an escape sequence.
    pub fn escape(data: &[u8]) -> Result<Message> {
        Message::framed(0xF7, data)
    }

    fn framed(status: u8, data: &[u8]) -> Result<Message> {
        let mut raw = Vec::with_capacity(data.len() + 5);
        raw.push(status);
        push_varlen_len(data.len(), &mut raw)?;
        let head = raw.len() as u8;
        raw.extend_from_slice(data);
        Ok(Message { raw, head })
    }

    /// Validate and copy an arbitrary complete message frame, status byte included.
    ///
    /// Accepts channel messages with the right amount of 7-bit data bytes, meta messages and
    /// sysex/escape packets whose length prefix covers exactly the rest of `raw`.
    /// Non-minimal length prefixes are re-encoded canonically.
    pub fn from_raw(raw: &[u8]) -> Result<Message> {
        let (&status, rest) = raw
            .split_first()
            .ok_or(err_eof!("empty message"))?;
        match status {
            0x80..=0xEF => {
                ensure!(
                    rest.len() == channel_data_len(status),
                    err_invalid!("wrong channel message length")
                );
                ensure!(
                    rest.iter().all(|&b| b < 0x80),
                    err_invalid!("channel data byte with top bit set")
                );
                Ok(Message {
                    raw: raw.to_vec(),
                    head: 1,
                })
            }
            0xFF => {
                let (&ty, rest) = rest
                    .split_first()
                    .ok_or(err_eof!("missing meta type"))?;
                Message::meta(ty, framed_payload(rest)?)
            }
            0xF0 | 0xF7 => Message::framed(status, framed_payload(rest)?),
            _ => Err(err_invalid!("not a message that can be stored in a file").into()),
        }
    }

    //Reader entry points, inputs are already validated

    pub(crate) fn from_channel_parts(status: u8, data: [u8; 2]) -> Message {
        let len = channel_data_len(status);
        let mut raw = Vec::with_capacity(1 + len);
        raw.push(status);
        raw.extend_from_slice(&data[..len]);
        Message { raw, head: 1 }
    }

    /// Build a message out of a raw buffer already holding the prefix, the length and the
    /// payload starting at `head`.
    pub(crate) fn from_framed_parts(raw: Vec<u8>, head: usize) -> Message {
        Message {
            raw,
            head: head as u8,
        }
    }

    //Accessors

    /// The canonical raw bytes of this message, status included.
    #[inline]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The status byte: `0x80..=0xEF` for channel messages, `0xFF` for meta messages, `0xF0` or
    /// `0xF7` for sysex packets.
    #[inline]
    pub fn status(&self) -> u8 {
        self.raw[0]
    }

    /// The bytes after the status, meta type and length prefix.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.raw[self.head as usize..]
    }

    /// Project the raw bytes into a typed message.
    pub fn kind(&self) -> MessageKind {
        let status = self.status();
        match status {
            0x80..=0xEF => {
                let (channel, message) = ChannelMessage::decode(status, self.payload());
                MessageKind::Channel { channel, message }
            }
            0xFF => {
                let ty = self.raw[1];
                let payload = self.payload();
                //Lengths are validated when the message is built
                MessageKind::Meta(
                    MetaMessage::parse(ty, payload).unwrap_or(MetaMessage::Undefined(ty, payload)),
                )
            }
            0xF0 => MessageKind::SysEx(self.payload()),
            _ => MessageKind::Escape(self.payload()),
        }
    }

    /// The channel and channel message, if this is a channel message.
    pub fn as_channel(&self) -> Option<(u8, ChannelMessage)> {
        match self.kind() {
            MessageKind::Channel { channel, message } => Some((channel, message)),
            _ => None,
        }
    }

    /// The meta message, if this is a meta message.
    pub fn as_meta(&self) -> Option<MetaMessage> {
        match self.kind() {
            MessageKind::Meta(meta) => Some(meta),
            _ => None,
        }
    }

    #[inline]
    pub fn is_meta(&self) -> bool {
        self.status() == 0xFF
    }

    #[inline]
    pub fn is_end_of_track(&self) -> bool {
        self.is_meta() && self.raw[1] == meta::END_OF_TRACK
    }

    /// The tempo in beats per minute, if this is a set tempo meta message with a non-zero value.
    pub fn tempo_bpm(&self) -> Option<f64> {
        match self.as_meta()? {
            MetaMessage::Tempo(micros) if micros > 0 => Some(60_000_000.0 / micros as f64),
            _ => None,
        }
    }

    /// A note-on with non-zero velocity.
    pub fn is_note_start(&self) -> bool {
        matches!(
            self.as_channel(),
            Some((_, ChannelMessage::NoteOn { vel, .. })) if vel > 0
        )
    }

    /// A note-off, or a note-on with zero velocity.
    pub fn is_note_end(&self) -> bool {
        matches!(
            self.as_channel(),
            Some((_, ChannelMessage::NoteOff { .. }))
                | Some((_, ChannelMessage::NoteOn { vel: 0, .. }))
        )
    }
}
impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.kind(), f)
    }
}

/// Split a `VLQ(length), payload` frame, requiring the payload to fill the rest of `raw`.
fn framed_payload(raw: &[u8]) -> Result<&[u8]> {
    let (len, used) = decode_varlen(raw).context("failed to read message length")?;
    let payload = &raw[used..];
    ensure!(
        payload.len() == len as usize,
        err_invalid!("message length prefix does not match its payload")
    );
    Ok(payload)
}
