//! Building-block integers: big-endian fixed-width fields and the variable-length quantities
//! used for delta times and message lengths.

use crate::prelude::*;

/// The largest value a variable-length quantity can hold (28 bits).
pub const VARLEN_MAX: u32 = 0x0FFF_FFFF;

/// An encoded variable-length quantity, 1 to 4 bytes long.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Varlen {
    buf: [u8; 4],
    len: u8,
}
impl Varlen {
    /// The encoded bytes, most significant group first.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }
}

/// Encode an integer as a minimal variable-length quantity.
///
/// Every 7-bit group except the last carries the `0x80` continuation bit.
/// Values above [`VARLEN_MAX`](constant.VARLEN_MAX.html) fail with `ErrorKind::VlqOverflow`.
pub fn encode_varlen(int: u32) -> Result<Varlen> {
    ensure!(int <= VARLEN_MAX, ErrorKind::VlqOverflow);
    let mut buf = [0; 4];
    let mut len = 0;
    let mut skipping = true;
    for i in (0..4).rev() {
        let group = ((int >> (i * 7)) & 0x7F) as u8;
        if skipping && group == 0 && i != 0 {
            //Leading zero group
            continue;
        }
        skipping = false;
        buf[len] = if i == 0 { group } else { group | 0x80 };
        len += 1;
    }
    Ok(Varlen {
        buf,
        len: len as u8,
    })
}

/// Decode a variable-length quantity from the start of `raw`.
///
/// Returns the value and how many bytes it took.
/// Fails with `ErrorKind::UnexpectedEof` if `raw` ends before the last group, and with
/// `ErrorKind::VlqOverflow` if the quantity has more than 4 groups.
pub fn decode_varlen(raw: &[u8]) -> Result<(u32, usize)> {
    let mut int = 0;
    for i in 0..4 {
        let byte = *raw.get(i).ok_or(err_eof!("unterminated varlen integer"))?;
        int = (int << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Ok((int, i + 1));
        }
    }
    Err(ErrorKind::VlqOverflow.into())
}

/// Read a variable-length quantity whose first byte was already pulled from the source.
pub(crate) fn read_varlen_from<S: Source>(first: u8, src: &mut S) -> Result<u32> {
    let mut int = (first & 0x7F) as u32;
    let mut byte = first;
    for _ in 1..4 {
        if byte & 0x80 == 0 {
            return Ok(int);
        }
        byte = src.read_u8("unterminated varlen integer")?;
        int = (int << 7) | (byte & 0x7F) as u32;
    }
    ensure!(byte & 0x80 == 0, ErrorKind::VlqOverflow);
    Ok(int)
}

/// Read a variable-length quantity from the source.
pub(crate) fn read_varlen<S: Source>(src: &mut S) -> Result<u32> {
    let first = src.read_u8("unterminated varlen integer")?;
    read_varlen_from(first, src)
}

/// Write a variable-length quantity, reporting values that do not fit as invalid input.
pub(crate) fn write_varlen<W: Write>(int: u32, out: &mut W) -> WriteResult<W> {
    let varlen = encode_varlen(int).map_err(W::invalid_input)?;
    out.write(varlen.as_bytes())
}

/// Append a variable-length length prefix for `len` bytes of payload.
pub(crate) fn push_varlen_len(len: usize, out: &mut Vec<u8>) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| ErrorKind::VlqOverflow)?;
    out.extend_from_slice(encode_varlen(len)?.as_bytes());
    Ok(())
}

pub(crate) fn read_u16_be<S: Source>(src: &mut S, what: &'static str) -> Result<u16> {
    let mut buf = [0; 2];
    src.read_exact(&mut buf).context(what)?;
    Ok(u16::from_be_bytes(buf))
}

pub(crate) fn read_u32_be<S: Source>(src: &mut S, what: &'static str) -> Result<u32> {
    let mut buf = [0; 4];
    src.read_exact(&mut buf).context(what)?;
    Ok(u32::from_be_bytes(buf))
}

/// Round a non-negative float to the nearest integer, halves away from zero.
///
/// Negative and NaN inputs give 0, huge inputs saturate.
#[inline]
pub(crate) fn round_u64(x: f64) -> u64 {
    (x + 0.5) as u64
}
