//! Encoding an `Smf` into bytes.
//!
//! The whole file is encoded in memory before anything reaches the output, so a file that fails
//! to encode never leaves partial output behind.

use crate::{
    chunk::{write_chunk, HeaderBody, HEADER_TAG, TRACK_TAG},
    prelude::*,
    primitive::write_varlen,
    running_status::RunningStatusEncoder,
    smf::{Smf, Track},
};
#[cfg(feature = "std")]
use std::{ffi::OsString, path::PathBuf};
use tracing::debug;

/// The end-of-track event appended to tracks that lack one.
const IMPLICIT_END_OF_TRACK: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

/// Below this many events in total, spreading the tracks over threads costs more than it saves.
#[cfg(feature = "parallel")]
const PARALLEL_MIN_EVENTS: usize = 16 * 1024;

pub(crate) fn encode(smf: &Smf) -> Result<Vec<u8>> {
    let track_count = u16::try_from(smf.tracks().len())
        .map_err(|_| err_range!("a file holds at most 65535 tracks"))?;
    let header = HeaderBody {
        format: smf.format(),
        track_count,
        timing: smf.timing(),
    }
    .encode()?;
    let events: usize = smf.tracks().iter().map(Track::len).sum();
    let mut out = Vec::with_capacity(14 + events * 4);
    write_chunk(HEADER_TAG, &header, &mut out)?;
    encode_tracks(smf.tracks(), &mut out)?;
    Ok(out)
}

#[cfg(feature = "parallel")]
fn encode_tracks(tracks: &[Track], out: &mut Vec<u8>) -> Result<()> {
    use rayon::prelude::*;

    let events: usize = tracks.iter().map(Track::len).sum();
    if tracks.len() < 2 || events < PARALLEL_MIN_EVENTS {
        return encode_tracks_serial(tracks, out);
    }
    let chunks = tracks
        .par_iter()
        .enumerate()
        .map(|(idx, track)| -> Result<Vec<u8>> {
            let mut chunk = Vec::new();
            encode_track(idx, track, &mut chunk)?;
            Ok(chunk)
        })
        .collect::<Result<Vec<Vec<u8>>>>()?;
    for chunk in chunks {
        out.extend_from_slice(&chunk);
    }
    Ok(())
}

#[cfg(not(feature = "parallel"))]
#[inline]
fn encode_tracks(tracks: &[Track], out: &mut Vec<u8>) -> Result<()> {
    encode_tracks_serial(tracks, out)
}

pub(crate) fn encode_tracks_serial(tracks: &[Track], out: &mut Vec<u8>) -> Result<()> {
    for (idx, track) in tracks.iter().enumerate() {
        encode_track(idx, track, out)?;
    }
    Ok(())
}

/// Append a whole `MTrk` chunk for `track`.
///
/// The length field is patched in once the body is known.
fn encode_track(idx: usize, track: &Track, out: &mut Vec<u8>) -> Result<()> {
    out.extend_from_slice(&TRACK_TAG);
    out.extend_from_slice(&[0; 4]);
    let start = out.len();
    let mut running = RunningStatusEncoder::new();
    for ev in track {
        write_varlen(ev.delta, out)?;
        running.write(ev.message.raw(), out)?;
    }
    let closed = track
        .events()
        .last()
        .map_or(false, |ev| ev.message.is_end_of_track());
    if !closed {
        debug!(track = idx, "appending implicit end of track");
        out.extend_from_slice(&IMPLICIT_END_OF_TRACK);
    }
    let len = u32::try_from(out.len() - start)
        .map_err(|_| err_range!("track chunk exceeds 32 bit length"))?;
    out[start - 4..start].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Encode `smf` and atomically replace `path` with it.
#[cfg(feature = "std")]
pub(crate) fn write_file(smf: &Smf, path: &Path) -> Result<()> {
    let bytes = encode(smf)?;
    let tmp = temp_path(path);
    let written = (|| -> stdio::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        stdio::Write::write_all(&mut file, &bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(err) = written {
        //Best effort, the original error is the interesting one
        let _ = fs::remove_file(&tmp);
        return Err(Error::from(err)).context("failed to write smf file");
    }
    debug!(path = %path.display(), bytes = bytes.len(), "wrote smf file");
    Ok(())
}

/// A hidden sibling of `path`, so that the final rename stays on the same filesystem.
#[cfg(feature = "std")]
fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}
