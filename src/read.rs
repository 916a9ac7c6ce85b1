//! The streaming reader: a state machine that pulls bytes from a `Source` and builds an `Smf`.
//!
//! Nothing is buffered beyond the payload of the message being read, so files can be parsed
//! straight from a `std::io::Read` without loading them whole.

use crate::{
    chunk::{ChunkHeader, HeaderBody},
    io::{read_into_vec, Window},
    message::{channel_data_len, Message},
    meta,
    prelude::*,
    primitive::{encode_varlen, read_varlen, read_varlen_from},
    riff,
    running_status::RunningStatusDecoder,
    smf::{Event, Format, Smf, Track},
    sysex::SysexState,
    tempo::{TempoChange, TempoChanges},
};
use tracing::{debug, trace, warn};

/// Where the reader stands within the file.
#[derive(Copy, Clone, Debug)]
enum ReadState {
    ExpectHeader,
    ExpectChunk,
    InTrack(ChunkHeader),
    Done,
}

/// Reads a whole Standard Midi File out of a byte source.
///
/// Most users want [`Smf::parse`](struct.Smf.html#method.parse) or
/// [`Smf::read_from`](struct.Smf.html#method.read_from) instead, which wrap this reader.
pub struct SmfReader<S> {
    src: Window<S>,
    state: ReadState,
    header: Option<HeaderBody>,
    tracks: Vec<Track>,
    tempo: TempoChanges,
}
impl<S: Source> SmfReader<S> {
    pub fn new(src: S) -> SmfReader<S> {
        SmfReader {
            src: Window::new(src, None),
            state: ReadState::ExpectHeader,
            header: None,
            tracks: Vec::new(),
            tempo: TempoChanges::new(),
        }
    }

    /// Run the reader to completion.
    ///
    /// Stops after the declared amount of tracks, ignoring anything that follows. Unknown
    /// chunks are skipped.
    pub fn read(mut self) -> Result<Smf> {
        loop {
            self.state = match self.state {
                ReadState::ExpectHeader => {
                    let header = self.read_header()?;
                    self.header = Some(header);
                    if header.track_count == 0 {
                        ReadState::Done
                    } else {
                        ReadState::ExpectChunk
                    }
                }
                ReadState::ExpectChunk => self.next_chunk()?,
                ReadState::InTrack(chunk) => {
                    self.read_track(chunk)
                        .context("failed to read track chunk")?;
                    if self.tracks.len() >= self.declared() as usize {
                        ReadState::Done
                    } else {
                        ReadState::ExpectChunk
                    }
                }
                ReadState::Done => break,
            };
        }
        let header = self.header.ok_or(ErrorKind::ExpectedHeaderChunk)?;
        self.tempo.sort();
        Ok(Smf::from_parts(
            header.format,
            header.timing,
            self.tracks,
            self.tempo,
        ))
    }

    fn declared(&self) -> u16 {
        self.header.map_or(0, |h| h.track_count)
    }

    fn read_header(&mut self) -> Result<HeaderBody> {
        let mut chunk =
            ChunkHeader::read(&mut self.src)?.ok_or(ErrorKind::ExpectedHeaderChunk)?;
        if chunk.tag == riff::RIFF_TAG {
            let len = riff::unwrap(&chunk, &mut self.src)?;
            trace!(len, "unwrapped rmid data chunk");
            self.src.set_limit(Some(len as u64));
            chunk = ChunkHeader::read(&mut self.src)?.ok_or(ErrorKind::ExpectedHeaderChunk)?;
        }
        let header =
            HeaderBody::read(&chunk, &mut self.src).context("failed to read header chunk")?;
        debug!(
            format = ?header.format,
            tracks = header.track_count,
            timing = ?header.timing,
            "parsed header chunk"
        );
        if header.format == Format::SingleTrack && header.track_count > 1 {
            lenient("single-track file declares more than one track")?;
        }
        Ok(header)
    }

    fn next_chunk(&mut self) -> Result<ReadState> {
        let chunk = match ChunkHeader::read(&mut self.src)? {
            Some(chunk) => chunk,
            None => bail!(self.missing_tracks()),
        };
        if chunk.is_track() {
            return Ok(ReadState::InTrack(chunk));
        }
        trace!(tag = ?chunk.tag, len = chunk.len, "skipping unknown chunk");
        if !chunk.skip_body(&mut self.src)? {
            //The source is exhausted, the next read reports the missing tracks
            lenient("unknown chunk runs past the end of the file")?;
        }
        Ok(ReadState::ExpectChunk)
    }

    fn missing_tracks(&self) -> ErrorKind {
        ErrorKind::MissingTracks {
            declared: self.declared(),
            found: self.tracks.len() as u16,
        }
    }

    fn read_track(&mut self, chunk: ChunkHeader) -> Result<()> {
        let index = self.tracks.len();
        let missing = self.missing_tracks();
        let mut body = Window::new(&mut self.src, Some(chunk.len as u64));
        let mut running = RunningStatusDecoder::new();
        let mut sysex = SysexState::new();
        let mut events = Vec::new();
        let mut tick = 0u64;
        let mut tempos = 0usize;
        loop {
            //A track must end with an end-of-track event, running out of bytes at an event
            //boundary means the track is missing
            let first = match body.next_byte()? {
                Some(byte) => byte,
                None => bail!(missing),
            };
            let delta = read_varlen_from(first, &mut body).context("failed to read delta time")?;
            tick += delta as u64;
            let message = read_message(&mut body, &mut running, &mut sysex)
                .context("failed to read event")?;
            if let Some(bpm) = message.tempo_bpm() {
                self.tempo.push_unsorted(TempoChange {
                    abs_ticks: tick as i64,
                    bpm,
                });
                tempos += 1;
            }
            let end = message.is_end_of_track();
            events.push(Event { delta, message });
            if end {
                break;
            }
        }
        match body.remaining() {
            Some(0) | None => {}
            Some(junk) => {
                lenient("junk after the end of track event")?;
                body.skip(junk)?;
            }
        }
        if sysex.in_sequence() {
            lenient("track ends inside a split sysex message")?;
        }
        debug!(
            track = index,
            events = events.len(),
            ticks = tick,
            tempos,
            "track closed"
        );
        self.tracks.push(Track::from_parts(events, true));
        Ok(())
    }
}

/// Read a single message, status byte included, right after its delta time.
fn read_message<S: Source>(
    src: &mut S,
    running: &mut RunningStatusDecoder,
    sysex: &mut SysexState,
) -> Result<Message> {
    let canary = src.read_u8("missing event status")?;
    let (status, consumed) = running.resolve(canary);
    match canary {
        0xFF => {
            running.reset();
            read_meta(src)
        }
        0xF0 | 0xF7 => read_sysex(canary, src, sysex),
        0xF1..=0xF6 => bail!(err_invalid!("system common message inside a track")),
        0xF8..=0xFE => bail!(err_invalid!("system realtime message inside a track")),
        _ => {
            ensure!(status != 0, err_invalid!("data byte with no running status"));
            let len = channel_data_len(status);
            let mut data = [0; 2];
            let mut filled = 0;
            if !consumed {
                data[0] = canary;
                filled = 1;
            }
            for slot in &mut data[filled..len] {
                *slot = src.read_u8("truncated channel message")?;
            }
            for byte in &mut data[..len] {
                if *byte & 0x80 != 0 {
                    lenient("channel data byte with the top bit set")?;
                    *byte &= 0x7F;
                }
            }
            Ok(Message::from_channel_parts(status, data))
        }
    }
}

fn read_meta<S: Source>(src: &mut S) -> Result<Message> {
    let ty = src.read_u8("missing meta type")?;
    let len = read_varlen(src).context("failed to read meta length")?;
    meta::check_len(ty, len).context("invalid meta message")?;
    let mut raw = Vec::with_capacity(6 + (len as usize).min(64));
    raw.push(0xFF);
    raw.push(ty);
    raw.extend_from_slice(encode_varlen(len)?.as_bytes());
    let head = raw.len();
    read_into_vec(src, &mut raw, len as usize).context("failed to read meta payload")?;
    Ok(Message::from_framed_parts(raw, head))
}

fn read_sysex<S: Source>(status: u8, src: &mut S, sysex: &mut SysexState) -> Result<Message> {
    let len = read_varlen(src).context("failed to read sysex length")?;
    let mut raw = Vec::with_capacity(5 + (len as usize).min(256));
    raw.push(status);
    raw.extend_from_slice(encode_varlen(len)?.as_bytes());
    let head = raw.len();
    read_into_vec(src, &mut raw, len as usize).context("failed to read sysex payload")?;
    let packet = sysex.feed(status, &raw[head..]);
    trace!(status, len, ?packet, "sysex packet");
    Ok(Message::from_framed_parts(raw, head))
}

/// Report a readable deviation from the format: an error with the `strict` feature, a logged
/// warning otherwise.
fn lenient(msg: &'static str) -> Result<()> {
    if cfg!(feature = "strict") {
        bail!(err_malformed!(msg))
    }
    warn!("{}", msg);
    Ok(())
}
