use core::fmt;

#[cfg(debug_assertions)]
mod error_impl {
    use super::{Error, ErrorExt, ErrorKind};
    use alloc::{boxed::Box, vec::Vec};

    pub type ErrorInner = Box<Traced>;

    #[derive(Clone, Debug)]
    pub struct Traced {
        kind: ErrorKind,
        trace: Vec<&'static str>,
    }
    impl ErrorExt for Error {
        #[inline]
        fn kind(&self) -> ErrorKind {
            self.inner.kind
        }
        #[inline]
        fn trace(&self) -> &[&'static str] {
            &self.inner.trace
        }
        #[inline]
        fn chain_ctx(mut self, ctx: &'static str) -> Error {
            self.inner.trace.push(ctx);
            self
        }
    }
    impl From<ErrorKind> for Error {
        #[inline]
        fn from(kind: ErrorKind) -> Error {
            Error {
                inner: Box::new(Traced {
                    kind,
                    trace: Vec::new(),
                }),
            }
        }
    }
}

#[cfg(not(debug_assertions))]
mod error_impl {
    use super::{Error, ErrorExt, ErrorKind};

    /// In release mode errors are just the kind, contexts are dropped.
    pub type ErrorInner = ErrorKind;
    impl ErrorExt for Error {
        #[inline]
        fn kind(&self) -> ErrorKind {
            self.inner
        }
        #[inline]
        fn trace(&self) -> &[&'static str] {
            &[]
        }
        #[inline]
        fn chain_ctx(self, _ctx: &'static str) -> Error {
            self
        }
    }
    impl From<ErrorKind> for Error {
        #[inline]
        fn from(inner: ErrorKind) -> Error {
            Error { inner }
        }
    }
}

/// Represents an error while reading or writing a Standard Midi File.
///
/// This type wraps an `ErrorKind` and, in debug mode, a trace of what the codec was doing when
/// the error occurred (innermost first).
/// In release mode it is a newtype wrapper around `ErrorKind` and the trace is always empty.
///
/// If the `std` feature is enabled, this type implements `std::error::Error`.
#[derive(Clone)]
pub struct Error {
    inner: self::error_impl::ErrorInner,
}
impl Error {
    /// Create a new error with the given `ErrorKind`.
    #[inline]
    pub fn new(kind: ErrorKind) -> Error {
        Error::from(kind)
    }

    /// The root cause of the error.
    ///
    /// Contexts added while the error bubbled up never replace the kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        ErrorExt::kind(self)
    }

    /// What the codec was doing when the error occurred, innermost first.
    ///
    /// Always empty in release mode.
    #[inline]
    pub fn trace(&self) -> &[&'static str] {
        ErrorExt::trace(self)
    }
}
impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.kind(), f)
    }
}
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        for ctx in self.trace() {
            writeln!(f)?;
            write!(f, "  while: {}", ctx)?;
        }
        Ok(())
    }
}
#[cfg(feature = "std")]
impl std::error::Error for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                Error::new(ErrorKind::UnexpectedEof("stream ended early"))
            }
            kind => Error::new(ErrorKind::Io(kind)),
        }
    }
}

trait ErrorExt {
    fn kind(&self) -> ErrorKind;
    fn trace(&self) -> &[&'static str];
    fn chain_ctx(self, ctx: &'static str) -> Error;
}

/// The type of error that occurred.
///
/// Decoding errors are always surfaced to the caller; the only input that is skipped on purpose
/// is a chunk with an unknown type tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// The stream ended in the middle of a field.
    #[error("unexpected eof: {0}")]
    UnexpectedEof(&'static str),
    /// The header declares a format other than 0, 1 or 2.
    #[error("unsupported smf format {0}")]
    UnsupportedFormat(u16),
    /// The first chunk of the file is not an `MThd` chunk.
    #[error("expected an MThd header chunk")]
    ExpectedHeaderChunk,
    /// A meta message with a fixed-size payload declared a different size.
    #[error("meta message 0x{meta:02X} cannot have a {len} byte payload")]
    UnexpectedMessageLength {
        /// The meta type byte.
        meta: u8,
        /// The declared payload length.
        len: u32,
    },
    /// Fewer complete tracks (closed by an end-of-track event) than declared in the header.
    #[error("header declares {declared} tracks but only {found} were complete")]
    MissingTracks {
        /// Track count in the header.
        declared: u16,
        /// Tracks read up to and including their end-of-track event.
        found: u16,
    },
    /// A variable-length quantity does not fit in 28 bits.
    #[error("variable-length quantity exceeds 28 bits")]
    VlqOverflow,
    /// Structurally invalid data. It is likely that the file is not a MIDI file or is severely
    /// corrupted.
    #[error("invalid midi: {0}")]
    Invalid(&'static str),
    /// Non-fatal error, but the file is clearly corrupted.
    ///
    /// This kind of error is not emitted by default, only if the `strict` crate feature is
    /// enabled.
    #[error("malformed midi: {0}")]
    Malformed(&'static str),
    /// A value cannot be represented in the MIDI encoding.
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),
    /// An event was pushed into a track that already ended.
    #[error("track is already closed")]
    TrackClosed,
    /// The underlying stream failed.
    #[cfg(feature = "std")]
    #[error("i/o error: {0}")]
    Io(std::io::ErrorKind),
}

macro_rules! err_eof {
    ($msg:expr) => {
        $crate::error::ErrorKind::UnexpectedEof($msg)
    };
}
macro_rules! err_invalid {
    ($msg:expr) => {
        $crate::error::ErrorKind::Invalid($msg)
    };
}
macro_rules! err_malformed {
    ($msg:expr) => {
        $crate::error::ErrorKind::Malformed($msg)
    };
}
macro_rules! err_range {
    ($msg:expr) => {
        $crate::error::ErrorKind::OutOfRange($msg)
    };
}

pub(crate) trait ResultExt<T> {
    fn context(self, ctx: &'static str) -> StdResult<T, Error>;
}
impl<T> ResultExt<T> for StdResult<T, Error> {
    #[inline]
    fn context(self, ctx: &'static str) -> StdResult<T, Error> {
        self.map_err(|err| err.chain_ctx(ctx))
    }
}
impl<T> ResultExt<T> for StdResult<T, ErrorKind> {
    #[inline]
    fn context(self, ctx: &'static str) -> StdResult<T, Error> {
        self.map_err(|kind| Error::from(kind).chain_ctx(ctx))
    }
}

/// The result type used by the codec.
pub type Result<T> = StdResult<T, Error>;
pub(crate) use core::result::Result as StdResult;
