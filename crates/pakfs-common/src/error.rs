//! Errors raised while decoding raw bytes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A read ran past the end of the buffer.
    #[error("buffer too short: needed {needed} bytes, {available} left")]
    UnexpectedEof { needed: usize, available: usize },

    /// A record did not start with the expected signature.
    #[error("bad signature: expected {expected:02x?}, found {actual:02x?}")]
    InvalidMagic { expected: Vec<u8>, actual: Vec<u8> },

    /// A name flagged as UTF-8 is not.
    #[error("invalid UTF-8 name: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;
