//! There's an abomination called RMID, MIDI embedded in a RIFF file.
//! Support for these files is provided by walking the RIFF subchunks until the `data` one, which
//! holds a plain SMF file.

use crate::{chunk::ChunkHeader, prelude::*};

pub(crate) const RIFF_TAG: [u8; 4] = *b"RIFF";

/// Consume the RIFF form type and every subchunk before `data`, leaving the source at the start
/// of the embedded SMF file.
///
/// `riff` is the already consumed outer chunk header. Returns the length of the `data` body.
pub(crate) fn unwrap<S: Source>(riff: &ChunkHeader, src: &mut S) -> Result<u32> {
    ensure!(riff.tag == RIFF_TAG, err_invalid!("invalid main riff chunk"));
    let mut formtype = [0; 4];
    src.read_exact(&mut formtype)
        .context("failed to read riff formtype")?;
    ensure!(&formtype == b"RMID", err_invalid!("not an rmid riff file"));
    //RIFF lengths are little-endian, chunk headers are read big-endian
    while let Some(sub) = ChunkHeader::read(src)? {
        let len = u32::from_le_bytes(sub.len.to_be_bytes());
        if &sub.tag == b"data" {
            return Ok(len);
        }
        let padded = len as u64 + (len % 2) as u64;
        ensure!(
            src.skip(padded)? == padded,
            err_invalid!("no rmid data chunk")
        );
    }
    bail!(err_invalid!("no rmid data chunk"))
}
