//! # Overview
//!
//! `smfcodec` reads and writes Standard Midi Files (SMF): the chunked container that stores
//! tracks of time-stamped MIDI events, along with the tempo map needed to turn MIDI ticks into
//! wall-clock time.
//!
//! Reading a file from memory:
//!
//! ```rust
//! use smfcodec::Smf;
//!
//! # let bytes = {
//! #     let mut smf = Smf::new();
//! #     let mut track = smfcodec::Track::new();
//! #     track.push(0, smfcodec::Message::note_on(0, 60, 100).unwrap()).unwrap();
//! #     track.close(480).unwrap();
//! #     smf.add_track(track).unwrap();
//! #     smf.to_bytes().unwrap()
//! # };
//! let smf = Smf::parse(&bytes).unwrap();
//!
//! for (i, track) in smf.tracks().iter().enumerate() {
//!     println!("track {} has {} events", i, track.len());
//! }
//! ```
//!
//! The [`Smf`](struct.Smf.html) struct is the main type in the crate.
//! Every event is stored as a delta time and a [`Message`](struct.Message.html), a thin owner of
//! the canonical raw bytes of the message that can be projected into a typed
//! [`MessageKind`](enum.MessageKind.html) on demand.
//!
//! # Building and writing files
//!
//! ```rust
//! use smfcodec::{Message, Smf, Track};
//!
//! let mut track = Track::new();
//! track.push(0, Message::tempo(140.0).unwrap()).unwrap();
//! track.push(0, Message::note_on(0, 60, 100).unwrap()).unwrap();
//! track.push(960, Message::note_off(0, 60, 0).unwrap()).unwrap();
//!
//! let mut smf = Smf::new();
//! smf.add_track(track).unwrap();
//!
//! // The missing end-of-track event is appended by the writer
//! let bytes = smf.to_bytes().unwrap();
//! assert_eq!(&bytes[..4], b"MThd");
//! ```
//!
//! With the `std` feature, files can be read from any `std::io::Read` with `Smf::read_from`,
//! loaded with `Smf::read_file` and saved with `Smf::write_file`, which never leaves a
//! half-written file behind.
//!
//! # Timing
//!
//! Delta times are measured in ticks. The header either fixes the length of a tick directly
//! (SMPTE timecode) or gives the number of ticks per quarter note, in which case the tempo map
//! collected while reading decides how long a quarter note lasts:
//!
//! ```rust
//! use smfcodec::{MetricTicks, TempoChanges};
//! use std::time::Duration;
//!
//! let mut tempo = TempoChanges::new();
//! tempo.insert(960, 60.0).unwrap();
//!
//! let res = MetricTicks::new(960);
//! // One beat at the default 120 BPM, then one beat at 60 BPM
//! assert_eq!(tempo.duration_at(res, 1920), Duration::from_millis(1500));
//! ```
//!
//! # About features
//!
//! - The `std` feature (enabled by default)
//!
//!   Integrates with `std::io` and `std::fs`, and implements `std::error::Error` for the error
//!   type. Disabling it with `default-features = false` makes the crate `no_std + alloc`: files
//!   are then parsed from byte slices and written into a `Vec<u8>` or any implementor of the
//!   crate's [`io::Write`](io/trait.Write.html) trait.
//!
//! - The `strict` feature
//!
//!   By default the reader tolerates uncompliant-but-readable files (data bytes with the top bit
//!   set, junk after the end of a track, unterminated sysex sequences...), logging a warning
//!   through `tracing` and carrying on.
//!   With `strict` these situations raise `ErrorKind::Malformed` errors instead.
//!
//! - The `parallel` feature
//!
//!   Encodes the tracks of large files on multiple threads when writing, through `rayon`.
//!   The output is identical to the single-threaded writer.
//!
//! # Logging
//!
//! Diagnostics are emitted through the `tracing` facade. The crate never installs a subscriber.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

macro_rules! bail {
    ($err:expr) => {{
        return Err($err.into());
    }};
}
macro_rules! ensure {
    ($cond:expr, $err:expr) => {{
        if !$cond {
            bail!($err)
        }
    }};
}

/// All of the errors this crate produces.
#[macro_use]
mod error;

mod prelude {
    pub(crate) use crate::{
        error::{Error, ErrorKind, Result, ResultExt, StdResult},
        io::{Source, Write, WriteResult},
    };
    pub(crate) use alloc::{vec, vec::Vec};
    pub(crate) use core::{convert::TryFrom, time::Duration};
    #[cfg(feature = "std")]
    pub(crate) use std::{fs, io as stdio, path::Path};
}

mod chunk;
pub mod io;
mod message;
mod meta;
mod primitive;
mod read;
mod riff;
mod running_status;
mod smf;
mod sysex;
mod tempo;
mod write;

pub use crate::{
    chunk::{write_chunk, ChunkHeader},
    error::{Error, ErrorKind, Result},
    message::{ChannelMessage, Message, MessageKind, PitchBend},
    meta::{MetaMessage, SmpteTime},
    primitive::{decode_varlen, encode_varlen, Varlen, VARLEN_MAX},
    read::SmfReader,
    running_status::{RunningStatusDecoder, RunningStatusEncoder},
    smf::{Event, Format, Smf, Timing, Track},
    sysex::{SysexMessage, SysexPacket, SysexState},
    tempo::{
        Fps, MetricTicks, TempoChange, TempoChanges, TimeCode, TimedEvent, TimedEvents,
        DEFAULT_BPM, DEFAULT_RESOLUTION,
    },
};

#[cfg(test)]
mod test;
