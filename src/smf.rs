//! The in-memory model of a Standard Midi File and its public entry points.

use crate::{
    io::SliceSource,
    message::Message,
    prelude::*,
    primitive::VARLEN_MAX,
    read::SmfReader,
    sysex::{self, SysexMessage},
    tempo::{Fps, MetricTicks, TempoChange, TempoChanges, TimeCode, TimedEvents},
    write,
};
#[cfg(feature = "std")]
use crate::io::{IoSource, IoWrap};

/// The order in which tracks should be laid out when playing back a file.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Format {
    /// This file should have a single track only.
    SingleTrack,
    /// This file has several tracks that should be played simultaneously.
    ///
    /// Usually the first track controls tempo and other song metadata.
    Parallel,
    /// This file has several tracks, each one a separate song.
    Sequential,
}
impl Format {
    /// Decode the header format field, `None` for anything but 0, 1 or 2.
    pub fn from_bits(bits: u16) -> Option<Format> {
        Some(match bits {
            0 => Format::SingleTrack,
            1 => Format::Parallel,
            2 => Format::Sequential,
            _ => return None,
        })
    }

    pub fn as_bits(self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
            Format::Sequential => 2,
        }
    }
}

/// The timing of a file: how long a tick lasts.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Timing {
    /// Ticks per quarter note, with the length of a quarter note given by the tempo map.
    Metrical(MetricTicks),
    /// A fixed amount of ticks per second, given as frames per second and ticks per frame.
    Timecode(TimeCode),
}
impl Timing {
    /// Decode the 16-bit division field of the header.
    ///
    /// With the top bit clear it holds the ticks per quarter note. With the top bit set the high
    /// byte is the negated frame rate and the low byte the ticks per frame.
    pub(crate) fn decode(division: u16) -> Result<Timing> {
        if division & 0x8000 == 0 {
            Ok(Timing::Metrical(MetricTicks::new(division)))
        } else {
            let [hi, lo] = division.to_be_bytes();
            let fps = (hi as i8).wrapping_neg() as u8;
            let fps = Fps::from_int(fps).ok_or(err_invalid!("invalid smpte frame rate"))?;
            ensure!(lo != 0, err_invalid!("zero ticks per smpte frame"));
            Ok(Timing::Timecode(TimeCode::new(fps, lo)?))
        }
    }

    pub(crate) fn encode(&self) -> Result<[u8; 2]> {
        match self {
            Timing::Metrical(ticks) => {
                ensure!(
                    ticks.raw() <= 0x7FFF,
                    err_range!("ticks per quarter note exceed 15 bits")
                );
                Ok(ticks.raw().to_be_bytes())
            }
            Timing::Timecode(tc) => {
                let fps = (tc.fps().as_int() as i8).wrapping_neg() as u8;
                Ok([fps, tc.subframes()])
            }
        }
    }
}
impl Default for Timing {
    fn default() -> Timing {
        Timing::Metrical(MetricTicks::default())
    }
}

/// A single event of a track: a message and the ticks since the previous event.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct Event {
    /// Ticks since the previous event of the same track, up to `0x0FFFFFFF`.
    pub delta: u32,
    /// The message itself.
    pub message: Message,
}

/// An ordered sequence of events.
///
/// A track is closed once it receives an end-of-track meta message, after which nothing can be
/// appended to it.
#[derive(Clone, PartialEq, Eq, Debug, Default, Hash)]
pub struct Track {
    events: Vec<Event>,
    closed: bool,
}
impl Track {
    #[inline]
    pub fn new() -> Track {
        Track::default()
    }

    /// Append a message `delta` ticks after the previous event.
    ///
    /// Pushing an end-of-track message closes the track.
    /// Fails with `ErrorKind::TrackClosed` if the track is closed, and with
    /// `ErrorKind::VlqOverflow` if `delta` does not fit in 28 bits.
    pub fn push(&mut self, delta: u32, message: Message) -> Result<()> {
        ensure!(!self.closed, ErrorKind::TrackClosed);
        ensure!(delta <= VARLEN_MAX, ErrorKind::VlqOverflow);
        self.closed = message.is_end_of_track();
        self.events.push(Event { delta, message });
        Ok(())
    }

    /// Close the track with an end-of-track message `delta` ticks after the last event.
    pub fn close(&mut self, delta: u32) -> Result<()> {
        self.push(delta, Message::end_of_track())
    }

    /// Insert a message at an absolute tick, after any event already at that tick.
    ///
    /// The deltas around the new event are adjusted so every other event keeps its absolute
    /// tick. In a closed track the message always lands before the end-of-track event, which is
    /// pushed back when `abs_ticks` lies past it.
    /// End-of-track messages cannot be inserted, only pushed. Fails with `ErrorKind::VlqOverflow`
    /// if the new delta does not fit in 28 bits.
    pub fn insert(&mut self, abs_ticks: u64, message: Message) -> Result<()> {
        ensure!(
            !message.is_end_of_track(),
            err_invalid!("end of track can only be pushed")
        );
        let mut tick = 0u64;
        let mut idx = self.events.len();
        for (i, ev) in self.events.iter().enumerate() {
            let next = tick + ev.delta as u64;
            if next > abs_ticks || ev.message.is_end_of_track() {
                idx = i;
                break;
            }
            tick = next;
        }
        let delta = u32::try_from(abs_ticks - tick)
            .ok()
            .filter(|&d| d <= VARLEN_MAX)
            .ok_or(ErrorKind::VlqOverflow)?;
        if let Some(after) = self.events.get_mut(idx) {
            let next = tick + after.delta as u64;
            after.delta = next.saturating_sub(abs_ticks) as u32;
        }
        self.events.insert(idx, Event { delta, message });
        Ok(())
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<Event> {
        self.events.iter()
    }

    /// Every event along with its absolute tick since the start of the track.
    pub fn absolute_ticks(&self) -> impl Iterator<Item = (u64, &Event)> + '_ {
        self.events.iter().scan(0u64, |tick, ev| {
            *tick += ev.delta as u64;
            Some((*tick, ev))
        })
    }

    /// Reassemble the logical sysex messages of this track, following split packets.
    pub fn sysex_messages(&self) -> Vec<SysexMessage> {
        sysex::reassemble(self.events.iter().map(|ev| &ev.message))
    }

    /// The tempo changes found in this track, at their absolute ticks.
    pub(crate) fn tempo_changes(&self) -> impl Iterator<Item = TempoChange> + '_ {
        self.absolute_ticks().filter_map(|(tick, ev)| {
            ev.message.tempo_bpm().map(|bpm| TempoChange {
                abs_ticks: tick as i64,
                bpm,
            })
        })
    }

    /// Used by the reader, which has already validated the events.
    pub(crate) fn from_parts(events: Vec<Event>, closed: bool) -> Track {
        Track { events, closed }
    }
}
impl<'a> IntoIterator for &'a Track {
    type Item = &'a Event;
    type IntoIter = core::slice::Iter<'a, Event>;
    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// A Standard Midi File: a format, a timing, tracks of events and the tempo map derived from
/// them.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Smf {
    format: Format,
    timing: Timing,
    tracks: Vec<Track>,
    tempo: TempoChanges,
}
impl Default for Format {
    fn default() -> Format {
        Format::SingleTrack
    }
}
impl Smf {
    /// An empty single-track file with 960 ticks per quarter note.
    pub fn new() -> Smf {
        Smf::default()
    }

    /// An empty single-track file with the given timing.
    pub fn with_timing(timing: Timing) -> Smf {
        Smf {
            timing,
            ..Smf::default()
        }
    }

    pub(crate) fn from_parts(
        format: Format,
        timing: Timing,
        tracks: Vec<Track>,
        tempo: TempoChanges,
    ) -> Smf {
        let mut smf = Smf {
            format,
            timing,
            tracks,
            tempo,
        };
        smf.promote();
        smf
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Change the format. A `Format::SingleTrack` file with more than one track is promoted to
    /// `Format::Parallel`.
    pub fn set_format(&mut self, format: Format) {
        self.format = format;
        self.promote();
    }

    #[inline]
    pub fn timing(&self) -> Timing {
        self.timing
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline]
    pub fn tempo_changes(&self) -> &TempoChanges {
        &self.tempo
    }

    /// Insert a set tempo message into the first track at `abs_ticks`, and into the tempo map.
    ///
    /// An empty file gets a new track to hold it. The map records the tempo as stored in the
    /// message, with the microseconds per beat rounded, so it matches what a reader of the
    /// written file finds.
    pub fn insert_tempo(&mut self, abs_ticks: u64, bpm: f64) -> Result<()> {
        let message = Message::tempo(bpm)?;
        if self.tracks.is_empty() {
            self.tracks.push(Track::new());
        }
        self.tracks[0].insert(abs_ticks, message)?;
        self.rebuild_tempo();
        Ok(())
    }

    fn rebuild_tempo(&mut self) {
        self.tempo.clear();
        for track in self.tracks.iter() {
            for change in track.tempo_changes() {
                self.tempo.push_unsorted(change);
            }
        }
        self.tempo.sort();
    }

    /// Append a track, collecting its tempo changes into the tempo map.
    ///
    /// Adding a second track to a `Format::SingleTrack` file promotes it to `Format::Parallel`.
    /// Fails with `ErrorKind::OutOfRange` once the file holds 65535 tracks.
    pub fn add_track(&mut self, track: Track) -> Result<()> {
        ensure!(
            self.tracks.len() < u16::MAX as usize,
            err_range!("a file holds at most 65535 tracks")
        );
        for change in track.tempo_changes() {
            self.tempo.push_unsorted(change);
        }
        self.tempo.sort();
        self.tracks.push(track);
        self.promote();
        Ok(())
    }

    fn promote(&mut self) {
        if self.format == Format::SingleTrack && self.tracks.len() > 1 {
            self.format = Format::Parallel;
        }
    }

    /// The wall-clock time at `abs_ticks` from the start of the file.
    pub fn duration_at(&self, abs_ticks: i64) -> Duration {
        match self.timing {
            Timing::Metrical(res) => self.tempo.duration_at(res, abs_ticks),
            Timing::Timecode(tc) => tc.duration(abs_ticks.max(0) as u64),
        }
    }

    /// Iterate over the events of every track in playback order, with their absolute tick and
    /// wall-clock time.
    ///
    /// The tracks of `Format::SingleTrack` and `Format::Parallel` files are merged by absolute
    /// tick, with ties resolved by track index. `Format::Sequential` tracks are played one after
    /// the other, each one starting from tick 0 and following its own tempo messages.
    pub fn timed_events(&self) -> TimedEvents {
        TimedEvents::new(self)
    }

    //Reading

    /// Parse a file held in memory.
    ///
    /// RMID files (SMF wrapped in a RIFF container) are unwrapped transparently.
    pub fn parse(raw: &[u8]) -> Result<Smf> {
        SmfReader::new(SliceSource::new(raw)).read()
    }

    /// Read a file from any `std::io::Read`.
    #[cfg(feature = "std")]
    pub fn read_from<R: stdio::Read>(reader: R) -> Result<Smf> {
        SmfReader::new(IoSource::new(reader)).read()
    }

    /// Open and read a file.
    #[cfg(feature = "std")]
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Smf> {
        let file = fs::File::open(path)?;
        Smf::read_from(stdio::BufReader::new(file))
    }

    //Writing

    /// Encode the whole file and write it into `out` in one go.
    ///
    /// Nothing is written if encoding fails.
    pub fn write<W: Write>(&self, out: &mut W) -> WriteResult<W> {
        let bytes = write::encode(self).map_err(W::invalid_input)?;
        out.write(&bytes)
    }

    /// Encode the whole file into a byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        write::encode(self)
    }

    /// Write the file into any `std::io::Write`.
    #[cfg(feature = "std")]
    pub fn write_std<W: stdio::Write>(&self, out: W) -> stdio::Result<()> {
        self.write(&mut IoWrap(out))
    }

    /// Write the file to `path` without ever exposing a partially written file.
    ///
    /// The file is encoded in memory, written to a temporary file next to `path` and then
    /// renamed over it.
    #[cfg(feature = "std")]
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write::write_file(self, path.as_ref())
    }
}
