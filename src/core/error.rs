use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Document or term absent, or tombstoned.
    NotFound,
    /// Bad argument, empty query, out-of-range index.
    Invalid,
    /// Magic mismatch, CRC mismatch, malformed header, version mismatch.
    Corrupt,
    /// Payload exceeds the configured maximum.
    TooLarge,
    /// Caller buffer or scratch region too small.
    Overflow,
    /// Underlying syscall failed.
    Io,
    /// Memory allocation failure.
    OutOfMemory,
    /// WAL entry out-of-order during replay.
    BadSequence,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error {
            kind,
            context: context.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Invalid,
            context: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
