//! Meta messages: `0xFF, type, VLQ(length), payload`.

use crate::{prelude::*, tempo::Fps};

pub(crate) const SEQUENCE_NUMBER: u8 = 0x00;
pub(crate) const TEXT: u8 = 0x01;
pub(crate) const COPYRIGHT: u8 = 0x02;
pub(crate) const TRACK_NAME: u8 = 0x03;
pub(crate) const INSTRUMENT_NAME: u8 = 0x04;
pub(crate) const LYRIC: u8 = 0x05;
pub(crate) const MARKER: u8 = 0x06;
pub(crate) const CUE_POINT: u8 = 0x07;
pub(crate) const PROGRAM_NAME: u8 = 0x08;
pub(crate) const DEVICE_NAME: u8 = 0x09;
pub(crate) const MIDI_CHANNEL: u8 = 0x20;
pub(crate) const MIDI_PORT: u8 = 0x21;
pub(crate) const END_OF_TRACK: u8 = 0x2F;
pub(crate) const TEMPO: u8 = 0x51;
pub(crate) const SMPTE_OFFSET: u8 = 0x54;
pub(crate) const TIME_SIGNATURE: u8 = 0x58;
pub(crate) const KEY_SIGNATURE: u8 = 0x59;
pub(crate) const SEQUENCER_SPECIFIC: u8 = 0x7F;

/// Check the payload length of a meta message against the fixed size of its type.
///
/// Types with free-form payloads accept any length.
pub(crate) fn check_len(meta: u8, len: u32) -> StdResult<(), ErrorKind> {
    let ok = match meta {
        SEQUENCE_NUMBER => len == 0 || len == 2,
        MIDI_CHANNEL | MIDI_PORT => len == 1,
        END_OF_TRACK => len == 0,
        TEMPO => len == 3,
        SMPTE_OFFSET => len == 5,
        TIME_SIGNATURE => len == 4,
        KEY_SIGNATURE => len == 2,
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(ErrorKind::UnexpectedMessageLength { meta, len })
    }
}

/// A "meta message", as defined by the SMF spec.
///
/// These events carry metadata about the track, such as tempo, time signature, copyright, etc...
/// They only exist inside files and are never sent to a device.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MetaMessage<'a> {
    /// The number of a sequence, or `None` to use the track index.
    SequenceNumber(Option<u16>),
    /// Arbitrary text associated to an instant.
    Text(&'a [u8]),
    /// A copyright notice.
    Copyright(&'a [u8]),
    /// The name of the track.
    TrackName(&'a [u8]),
    /// The name of the current instrument.
    InstrumentName(&'a [u8]),
    /// Arbitrary lyric information associated to an instant.
    Lyric(&'a [u8]),
    /// Arbitrary marker text associated to an instant.
    Marker(&'a [u8]),
    /// Arbitrary cue point text associated to an instant.
    CuePoint(&'a [u8]),
    /// The name of the current program.
    ProgramName(&'a [u8]),
    /// Name of the device that this file was intended to be played with.
    DeviceName(&'a [u8]),
    /// The MIDI channel the following events are meant for.
    MidiChannel(u8),
    /// The MIDI port the following events are meant for.
    MidiPort(u8),
    /// Obligatory at track end.
    EndOfTrack,
    /// Microseconds per beat (quarter note), a 24-bit value.
    Tempo(u32),
    /// The SMPTE time at which the track should start.
    SmpteOffset(SmpteTime),
    /// Numerator, denominator as a power of two, MIDI clocks per metronome click and 32nd notes
    /// per quarter note.
    TimeSignature(u8, u8, u8, u8),
    /// Negative numbers count flats and positive numbers count sharps.
    /// `false` indicates a major key, `true` a minor key.
    KeySignature(i8, bool),
    /// Arbitrary data intended for the sequencer.
    SequencerSpecific(&'a [u8]),
    /// A meta message of an unknown type, kept verbatim.
    ///
    /// The first `u8` is the raw type byte.
    Undefined(u8, &'a [u8]),
}
impl<'a> MetaMessage<'a> {
    /// Interpret a meta payload.
    ///
    /// Fails with `ErrorKind::UnexpectedMessageLength` if the type has a fixed payload size and
    /// `payload` does not match it.
    pub fn parse(meta: u8, payload: &'a [u8]) -> StdResult<MetaMessage<'a>, ErrorKind> {
        check_len(meta, payload.len() as u32)?;
        Ok(match (meta, payload) {
            (SEQUENCE_NUMBER, &[hi, lo]) => {
                MetaMessage::SequenceNumber(Some(u16::from_be_bytes([hi, lo])))
            }
            (SEQUENCE_NUMBER, _) => MetaMessage::SequenceNumber(None),
            (TEXT, data) => MetaMessage::Text(data),
            (COPYRIGHT, data) => MetaMessage::Copyright(data),
            (TRACK_NAME, data) => MetaMessage::TrackName(data),
            (INSTRUMENT_NAME, data) => MetaMessage::InstrumentName(data),
            (LYRIC, data) => MetaMessage::Lyric(data),
            (MARKER, data) => MetaMessage::Marker(data),
            (CUE_POINT, data) => MetaMessage::CuePoint(data),
            (PROGRAM_NAME, data) => MetaMessage::ProgramName(data),
            (DEVICE_NAME, data) => MetaMessage::DeviceName(data),
            (MIDI_CHANNEL, &[chan]) => MetaMessage::MidiChannel(chan),
            (MIDI_PORT, &[port]) => MetaMessage::MidiPort(port),
            (END_OF_TRACK, _) => MetaMessage::EndOfTrack,
            (TEMPO, &[a, b, c]) => MetaMessage::Tempo(u32::from_be_bytes([0, a, b, c])),
            (SMPTE_OFFSET, &[hour_fps, minute, second, frame, subframe]) => {
                MetaMessage::SmpteOffset(SmpteTime::from_raw([
                    hour_fps, minute, second, frame, subframe,
                ]))
            }
            (TIME_SIGNATURE, &[num, den, clocks, n32]) => {
                MetaMessage::TimeSignature(num, den, clocks, n32)
            }
            (KEY_SIGNATURE, &[sharps, minor]) => {
                MetaMessage::KeySignature(sharps as i8, minor != 0)
            }
            (SEQUENCER_SPECIFIC, data) => MetaMessage::SequencerSpecific(data),
            (meta, data) => MetaMessage::Undefined(meta, data),
        })
    }

    /// The raw meta type byte.
    pub fn type_byte(&self) -> u8 {
        match self {
            MetaMessage::SequenceNumber(_) => SEQUENCE_NUMBER,
            MetaMessage::Text(_) => TEXT,
            MetaMessage::Copyright(_) => COPYRIGHT,
            MetaMessage::TrackName(_) => TRACK_NAME,
            MetaMessage::InstrumentName(_) => INSTRUMENT_NAME,
            MetaMessage::Lyric(_) => LYRIC,
            MetaMessage::Marker(_) => MARKER,
            MetaMessage::CuePoint(_) => CUE_POINT,
            MetaMessage::ProgramName(_) => PROGRAM_NAME,
            MetaMessage::DeviceName(_) => DEVICE_NAME,
            MetaMessage::MidiChannel(_) => MIDI_CHANNEL,
            MetaMessage::MidiPort(_) => MIDI_PORT,
            MetaMessage::EndOfTrack => END_OF_TRACK,
            MetaMessage::Tempo(_) => TEMPO,
            MetaMessage::SmpteOffset(_) => SMPTE_OFFSET,
            MetaMessage::TimeSignature(..) => TIME_SIGNATURE,
            MetaMessage::KeySignature(..) => KEY_SIGNATURE,
            MetaMessage::SequencerSpecific(_) => SEQUENCER_SPECIFIC,
            MetaMessage::Undefined(meta, _) => *meta,
        }
    }

    /// Append the payload of this message (without type or length) to `out`.
    ///
    /// Fails with `ErrorKind::OutOfRange` if a field does not fit in its encoding.
    pub(crate) fn write_payload(&self, out: &mut Vec<u8>) -> Result<()> {
        match *self {
            MetaMessage::SequenceNumber(None) | MetaMessage::EndOfTrack => {}
            MetaMessage::SequenceNumber(Some(num)) => out.extend_from_slice(&num.to_be_bytes()),
            MetaMessage::Text(data)
            | MetaMessage::Copyright(data)
            | MetaMessage::TrackName(data)
            | MetaMessage::InstrumentName(data)
            | MetaMessage::Lyric(data)
            | MetaMessage::Marker(data)
            | MetaMessage::CuePoint(data)
            | MetaMessage::ProgramName(data)
            | MetaMessage::DeviceName(data)
            | MetaMessage::SequencerSpecific(data)
            | MetaMessage::Undefined(_, data) => out.extend_from_slice(data),
            MetaMessage::MidiChannel(chan) => {
                ensure!(chan < 16, err_range!("meta midi channel above 15"));
                out.push(chan);
            }
            MetaMessage::MidiPort(port) => {
                ensure!(port < 128, err_range!("meta midi port above 127"));
                out.push(port);
            }
            MetaMessage::Tempo(micros) => {
                ensure!(micros <= 0xFF_FFFF, err_range!("tempo exceeds 24 bits"));
                out.extend_from_slice(&micros.to_be_bytes()[1..]);
            }
            MetaMessage::SmpteOffset(smpte) => out.extend_from_slice(&smpte.encode()),
            MetaMessage::TimeSignature(num, den, clocks, n32) => {
                out.extend_from_slice(&[num, den, clocks, n32])
            }
            MetaMessage::KeySignature(sharps, minor) => {
                out.extend_from_slice(&[sharps as u8, minor as u8])
            }
        }
        Ok(())
    }
}

/// An SMPTE time of day, as carried by the SMPTE offset meta message.
///
/// Fields are kept as found in the file. Use [`SmpteTime::new`](#method.new) to build a checked
/// timestamp.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct SmpteTime {
    fps: Fps,
    hour: u8,
    minute: u8,
    second: u8,
    frame: u8,
    subframe: u8,
}
impl SmpteTime {
    /// Create a new SMPTE timestamp, checking that every field is within range.
    pub fn new(
        hour: u8,
        minute: u8,
        second: u8,
        frame: u8,
        subframe: u8,
        fps: Fps,
    ) -> Result<SmpteTime> {
        ensure!(hour < 24, err_range!("smpte hour above 23"));
        ensure!(minute < 60, err_range!("smpte minute above 59"));
        ensure!(second < 60, err_range!("smpte second above 59"));
        ensure!(frame < fps.as_int(), err_range!("smpte frame above fps"));
        ensure!(subframe < 100, err_range!("smpte subframe above 99"));
        Ok(SmpteTime {
            fps,
            hour,
            minute,
            second,
            frame,
            subframe,
        })
    }

    fn from_raw(raw: [u8; 5]) -> SmpteTime {
        SmpteTime {
            fps: Fps::from_code((raw[0] >> 5) & 0b11),
            hour: raw[0] & 0x1F,
            minute: raw[1],
            second: raw[2],
            frame: raw[3],
            subframe: raw[4],
        }
    }

    fn encode(&self) -> [u8; 5] {
        [
            self.hour | self.fps.as_code() << 5,
            self.minute,
            self.second,
            self.frame,
            self.subframe,
        ]
    }

    #[inline]
    pub fn hour(&self) -> u8 {
        self.hour
    }
    #[inline]
    pub fn minute(&self) -> u8 {
        self.minute
    }
    #[inline]
    pub fn second(&self) -> u8 {
        self.second
    }
    #[inline]
    pub fn frame(&self) -> u8 {
        self.frame
    }
    /// Hundredths of a frame.
    #[inline]
    pub fn subframe(&self) -> u8 {
        self.subframe
    }
    #[inline]
    pub fn fps(&self) -> Fps {
        self.fps
    }

    /// The offset from midnight.
    pub fn as_duration(&self) -> Duration {
        let whole = (self.hour as u64 * 60 + self.minute as u64) * 60 + self.second as u64;
        let frames = self.frame as f64 + self.subframe as f64 / 100.0;
        Duration::from_secs(whole) + Duration::from_secs_f64(frames / self.fps.as_f64())
    }
}
