//! The error kinds the core distinguishes (spec §7), collected in one enum
//! scoped to this crate rather than split per sub-module: a single workspace
//! consumer (`termweb_server`) matches on all of them at the callback layer.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    InvalidHandshake,
    ConnectionClosed,
    BrokenPipe,
    WouldBlock,
    PayloadTooLarge,
    DecompressionFailed,
    CompressionFailed,
    SurfaceCreationFailed,
    NoFramebuffer,
    InvalidFileIndex,
    IsDirectory,
    ReadFailed,
    StateMissing,
    InvalidStateFile,
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidHandshake => write!(f, "invalid websocket handshake"),
            Error::ConnectionClosed => write!(f, "connection closed"),
            Error::BrokenPipe => write!(f, "broken pipe"),
            Error::WouldBlock => write!(f, "would block"),
            Error::PayloadTooLarge => write!(f, "payload too large"),
            Error::DecompressionFailed => write!(f, "decompression failed"),
            Error::CompressionFailed => write!(f, "compression failed"),
            Error::SurfaceCreationFailed => write!(f, "surface creation failed"),
            Error::NoFramebuffer => write!(f, "no framebuffer available"),
            Error::InvalidFileIndex => write!(f, "invalid file index"),
            Error::IsDirectory => write!(f, "path is a directory"),
            Error::ReadFailed => write!(f, "read failed"),
            Error::StateMissing => write!(f, "transfer state missing"),
            Error::InvalidStateFile => write!(f, "invalid transfer state file"),
            Error::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            io::ErrorKind::BrokenPipe => Error::BrokenPipe,
            io::ErrorKind::NotFound => Error::StateMissing,
            _ => Error::Io(e),
        }
    }
}

impl From<crate::codec::CodecError> for Error {
    fn from(e: crate::codec::CodecError) -> Self {
        match e {
            crate::codec::CodecError::CompressionFailed => Error::CompressionFailed,
            crate::codec::CodecError::DecompressionFailed => Error::DecompressionFailed,
            crate::codec::CodecError::OutputTooLarge => Error::DecompressionFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
