//! Chunk framing: a 4-byte type tag, a 4-byte big-endian length and an opaque body.

use crate::{
    prelude::*,
    primitive::{read_u16_be, read_u32_be},
    smf::{Format, Timing},
};

pub(crate) const HEADER_TAG: [u8; 4] = *b"MThd";
pub(crate) const TRACK_TAG: [u8; 4] = *b"MTrk";

/// The length of the `MThd` body: format, track count and division.
pub(crate) const HEADER_LEN: u32 = 6;

/// The type tag and declared body length of a chunk.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct ChunkHeader {
    /// The 4 byte type tag, such as `MThd` or `MTrk`.
    pub tag: [u8; 4],
    /// The declared length of the body, in bytes.
    pub len: u32,
}
impl ChunkHeader {
    /// Read a chunk header from the source.
    ///
    /// Returns `None` if the source ends cleanly before the first byte of the header, and fails
    /// with `ErrorKind::UnexpectedEof` if it ends in the middle of it.
    pub fn read<S: Source>(src: &mut S) -> Result<Option<ChunkHeader>> {
        let first = match src.next_byte()? {
            Some(byte) => byte,
            None => return Ok(None),
        };
        let mut tag = [first, 0, 0, 0];
        src.read_exact(&mut tag[1..])
            .context("failed to read chunk type")?;
        let len = read_u32_be(src, "failed to read chunk length")?;
        Ok(Some(ChunkHeader { tag, len }))
    }

    /// Whether this is an `MThd` chunk.
    #[inline]
    pub fn is_header(&self) -> bool {
        self.tag == HEADER_TAG
    }

    /// Whether this is an `MTrk` chunk.
    #[inline]
    pub fn is_track(&self) -> bool {
        self.tag == TRACK_TAG
    }

    /// Consume the body of this chunk without looking at it.
    ///
    /// Returns `false` if the source ended before the whole body was skipped.
    pub(crate) fn skip_body<S: Source>(&self, src: &mut S) -> Result<bool> {
        let skipped = src.skip(self.len as u64)?;
        Ok(skipped == self.len as u64)
    }
}

/// Write a whole chunk: `tag`, the big-endian length of `body`, then `body`.
///
/// Bodies longer than `u32::MAX` bytes are reported through `W::invalid_input`.
pub fn write_chunk<W: Write>(tag: [u8; 4], body: &[u8], out: &mut W) -> WriteResult<W> {
    let len = u32::try_from(body.len())
        .map_err(|_| W::invalid_input(err_range!("chunk body exceeds 32 bit length").into()))?;
    let mut head = [0; 8];
    head[..4].copy_from_slice(&tag);
    head[4..].copy_from_slice(&len.to_be_bytes());
    out.write(&head)?;
    out.write(body)?;
    Ok(())
}

/// The decoded body of an `MThd` chunk.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) struct HeaderBody {
    pub format: Format,
    pub track_count: u16,
    pub timing: Timing,
}
impl HeaderBody {
    /// Read the body of an `MThd` chunk whose header was already consumed.
    pub(crate) fn read<S: Source>(chunk: &ChunkHeader, src: &mut S) -> Result<HeaderBody> {
        ensure!(chunk.is_header(), ErrorKind::ExpectedHeaderChunk);
        ensure!(
            chunk.len == HEADER_LEN,
            err_invalid!("header chunk length is not 6")
        );
        let format = read_u16_be(src, "failed to read smf format")?;
        let format = Format::from_bits(format).ok_or(ErrorKind::UnsupportedFormat(format))?;
        let track_count = read_u16_be(src, "failed to read track count")?;
        let division = read_u16_be(src, "failed to read division")?;
        let timing = Timing::decode(division)?;
        Ok(HeaderBody {
            format,
            track_count,
            timing,
        })
    }

    pub(crate) fn encode(&self) -> Result<[u8; 6]> {
        let mut body = [0; 6];
        body[0..2].copy_from_slice(&self.format.as_bits().to_be_bytes());
        body[2..4].copy_from_slice(&self.track_count.to_be_bytes());
        body[4..6].copy_from_slice(&self.timing.encode()?);
        Ok(body)
    }
}
