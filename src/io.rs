//! The byte seams of the codec.
//!
//! Output goes through the [`Write`](trait.Write.html) trait, a minimal `no_std` friendly
//! version of `std::io::Write`. Input comes from a [`Source`](trait.Source.html), which
//! distinguishes a clean end of stream (at an event or chunk boundary) from running out of bytes
//! in the middle of a field.

use crate::prelude::*;

/// The result of writing into a `Write` implementor.
pub type WriteResult<W> = StdResult<(), <W as Write>::Error>;

/// A `no_std` replacement for `std::io::Write`.
///
/// Implemented for `Vec<u8>`, and for any `std::io::Write` through [`IoWrap`](struct.IoWrap.html)
/// when the `std` feature is enabled.
pub trait Write {
    /// The error produced by the underlying sink.
    type Error;

    /// Write all of the given bytes, or fail.
    fn write(&mut self, buf: &[u8]) -> WriteResult<Self>;

    /// Wrap an encoding error (a value that cannot be represented in the file) into the error
    /// type of this sink.
    fn invalid_input(err: Error) -> Self::Error;
}

impl Write for Vec<u8> {
    type Error = Error;
    #[inline]
    fn write(&mut self, buf: &[u8]) -> WriteResult<Self> {
        self.extend_from_slice(buf);
        Ok(())
    }
    #[inline]
    fn invalid_input(err: Error) -> Error {
        err
    }
}

impl<W: Write + ?Sized> Write for &mut W {
    type Error = W::Error;
    #[inline]
    fn write(&mut self, buf: &[u8]) -> WriteResult<Self> {
        (**self).write(buf)
    }
    #[inline]
    fn invalid_input(err: Error) -> W::Error {
        W::invalid_input(err)
    }
}

/// Adapts a `std::io::Write` into the crate's `Write` trait.
///
/// Encoding errors surface as `std::io::ErrorKind::InvalidInput` errors wrapping the crate
/// `Error`.
#[derive(Debug)]
pub struct IoWrap<T>(pub T);
#[cfg(feature = "std")]
impl<T: stdio::Write> Write for IoWrap<T> {
    type Error = stdio::Error;
    #[inline]
    fn write(&mut self, buf: &[u8]) -> stdio::Result<()> {
        stdio::Write::write_all(&mut self.0, buf)
    }
    fn invalid_input(err: Error) -> stdio::Error {
        stdio::Error::new(stdio::ErrorKind::InvalidInput, err)
    }
}

/// A byte source the reader pulls from.
pub trait Source {
    /// Read the next byte, or `None` if the stream ended cleanly.
    fn next_byte(&mut self) -> Result<Option<u8>>;

    /// Fill `buf` completely, failing with `ErrorKind::UnexpectedEof` if the stream runs out.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Skip up to `n` bytes, returning how many were actually skipped.
    ///
    /// Skipping less than `n` bytes means the stream ended.
    fn skip(&mut self, n: u64) -> Result<u64>;

    /// Read a byte that must be present.
    #[inline]
    fn read_u8(&mut self, what: &'static str) -> Result<u8> {
        match self.next_byte()? {
            Some(byte) => Ok(byte),
            None => Err(err_eof!(what).into()),
        }
    }
}

impl<S: Source + ?Sized> Source for &mut S {
    #[inline]
    fn next_byte(&mut self) -> Result<Option<u8>> {
        (**self).next_byte()
    }
    #[inline]
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact(buf)
    }
    #[inline]
    fn skip(&mut self, n: u64) -> Result<u64> {
        (**self).skip(n)
    }
}

/// Reads from an in-memory byte slice.
#[derive(Copy, Clone, Debug)]
pub struct SliceSource<'a> {
    raw: &'a [u8],
}
impl<'a> SliceSource<'a> {
    #[inline]
    pub fn new(raw: &'a [u8]) -> SliceSource<'a> {
        SliceSource { raw }
    }

    /// The bytes that have not been read yet.
    #[inline]
    pub fn unread(&self) -> &'a [u8] {
        self.raw
    }
}
impl Source for SliceSource<'_> {
    #[inline]
    fn next_byte(&mut self) -> Result<Option<u8>> {
        match self.raw.split_first() {
            Some((&byte, rest)) => {
                self.raw = rest;
                Ok(Some(byte))
            }
            None => Ok(None),
        }
    }
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        ensure!(buf.len() <= self.raw.len(), err_eof!("byte slice ended early"));
        let (head, rest) = self.raw.split_at(buf.len());
        buf.copy_from_slice(head);
        self.raw = rest;
        Ok(())
    }
    fn skip(&mut self, n: u64) -> Result<u64> {
        let n = usize::try_from(n).unwrap_or(usize::MAX).min(self.raw.len());
        self.raw = &self.raw[n..];
        Ok(n as u64)
    }
}

/// Reads from a `std::io::Read`.
///
/// Reads are issued one byte or one field at a time, so wrapping files in a
/// `std::io::BufReader` is recommended.
#[derive(Debug)]
pub struct IoSource<R> {
    inner: R,
}
#[cfg(feature = "std")]
impl<R: stdio::Read> IoSource<R> {
    #[inline]
    pub fn new(inner: R) -> IoSource<R> {
        IoSource { inner }
    }

    #[inline]
    pub fn into_inner(self) -> R {
        self.inner
    }
}
#[cfg(feature = "std")]
impl<R: stdio::Read> Source for IoSource<R> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0];
        loop {
            match stdio::Read::read(&mut self.inner, &mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(err) if err.kind() == stdio::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        stdio::Read::read_exact(&mut self.inner, buf)?;
        Ok(())
    }
    fn skip(&mut self, n: u64) -> Result<u64> {
        let mut limited = stdio::Read::take(&mut self.inner, n);
        let skipped = stdio::copy(&mut limited, &mut stdio::sink())?;
        Ok(skipped)
    }
}

/// A window over another source that ends after a fixed amount of bytes, or never if
/// `remaining` is `None`.
///
/// Used for chunk bodies and for the `data` chunk of RMID files.
pub(crate) struct Window<S> {
    inner: S,
    remaining: Option<u64>,
}
impl<S: Source> Window<S> {
    pub(crate) fn new(inner: S, limit: Option<u64>) -> Window<S> {
        Window {
            inner,
            remaining: limit,
        }
    }

    pub(crate) fn set_limit(&mut self, limit: Option<u64>) {
        self.remaining = limit;
    }

    /// Bytes left before the window closes, if it is bounded.
    pub(crate) fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    fn take(&mut self, n: u64) -> bool {
        match &mut self.remaining {
            Some(rem) if *rem < n => false,
            Some(rem) => {
                *rem -= n;
                true
            }
            None => true,
        }
    }
}
impl<S: Source> Source for Window<S> {
    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.remaining == Some(0) {
            return Ok(None);
        }
        let byte = self.inner.next_byte()?;
        if byte.is_some() {
            self.take(1);
        } else {
            //The underlying stream ended before the window did
            self.remaining = Some(0);
        }
        Ok(byte)
    }
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        ensure!(self.take(buf.len() as u64), err_eof!("chunk body ended early"));
        self.inner.read_exact(buf)
    }
    fn skip(&mut self, n: u64) -> Result<u64> {
        let n = match self.remaining {
            Some(rem) => n.min(rem),
            None => n,
        };
        let skipped = self.inner.skip(n)?;
        self.take(skipped);
        if skipped < n {
            self.remaining = Some(0);
        }
        Ok(skipped)
    }
}

/// Read `len` bytes at the end of `out`, growing it progressively so that a bogus length
/// prefix cannot trigger a huge allocation up front.
pub(crate) fn read_into_vec<S: Source>(src: &mut S, out: &mut Vec<u8>, len: usize) -> Result<()> {
    const STEP: usize = 8 * 1024;
    let mut left = len;
    while left > 0 {
        let n = left.min(STEP);
        let start = out.len();
        out.resize(start + n, 0);
        src.read_exact(&mut out[start..])?;
        left -= n;
    }
    Ok(())
}
