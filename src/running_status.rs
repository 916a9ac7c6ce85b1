//! Running status: a repeated channel status byte may be left out between consecutive channel
//! messages.
//!
//! Both halves keep a single cached status byte, where `0` means "no running status".
//! They are scoped to one pass over one track.

use crate::prelude::*;

/// Restores omitted status bytes while reading.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct RunningStatusDecoder {
    status: u8,
}
impl RunningStatusDecoder {
    #[inline]
    pub fn new() -> RunningStatusDecoder {
        RunningStatusDecoder::default()
    }

    /// The cached status, or `0` if there is none.
    #[inline]
    pub fn status(&self) -> u8 {
        self.status
    }

    /// Resolve the first byte of a message.
    ///
    /// Returns the channel status the message uses and whether `canary` was consumed as a status
    /// byte (`false` means `canary` is the first data byte of a running status message):
    ///
    /// - `0x80..=0xEF`: a channel status. It is cached and returned, consumed.
    /// - `0xF0..=0xF7`: system common. The cache is cleared and `(0, true)` is returned.
    /// - `0xF8..=0xFF`: system realtime (or a meta prefix in files). Realtime bytes may be
    ///   interleaved inside a channel message on the wire, so the cache is left alone and
    ///   `(0, true)` is returned. The file reader clears the cache itself before a meta event.
    /// - Data bytes: `(cached, false)`. A cached status of `0` means the byte is orphaned.
    #[inline]
    pub fn resolve(&mut self, canary: u8) -> (u8, bool) {
        match canary {
            0x80..=0xEF => {
                self.status = canary;
                (canary, true)
            }
            0xF0..=0xF7 => {
                self.status = 0;
                (0, true)
            }
            0xF8..=0xFF => (0, true),
            _ => (self.status, false),
        }
    }

    /// Forget the cached status.
    #[inline]
    pub fn reset(&mut self) {
        self.status = 0;
    }
}

/// Drops repeated status bytes while writing.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct RunningStatusEncoder {
    status: u8,
}
impl RunningStatusEncoder {
    #[inline]
    pub fn new() -> RunningStatusEncoder {
        RunningStatusEncoder::default()
    }

    /// Write the raw bytes of a complete message (status included).
    ///
    /// Channel messages whose status matches the cached one are written without it.
    /// Any other message is written in full and clears the cache, since sysex, escapes and meta
    /// events cancel running status.
    pub fn write<W: Write>(&mut self, raw: &[u8], out: &mut W) -> WriteResult<W> {
        match raw.split_first() {
            Some((&status, data)) if (0x80..=0xEF).contains(&status) => {
                if status == self.status {
                    out.write(data)
                } else {
                    self.status = status;
                    out.write(raw)
                }
            }
            _ => {
                self.status = 0;
                out.write(raw)
            }
        }
    }

    /// Forget the cached status.
    #[inline]
    pub fn reset(&mut self) {
        self.status = 0;
    }
}
