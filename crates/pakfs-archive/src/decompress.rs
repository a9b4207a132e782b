//! Streaming decompression for archive entries.

use std::io::{self, BufReader, Read};

use tracing::debug;

use crate::Error;

/// Streaming Zstandard decoder for one entry.
///
/// Decodes a single frame. The stream ends when the frame does, when the
/// compressed input runs out, or when the decoder reports an error; sizes
/// declared by the directory are not consulted except to reject a stream
/// that fails before producing anything. Errors from the input itself are
/// passed through unchanged.
pub struct ZstdStream<R: Read> {
    decoder: zstd::stream::read::Decoder<'static, BufReader<TaggedInput<R>>>,
    name: String,
    declared_size: u64,
    produced: u64,
    done: bool,
}

impl<R: Read> ZstdStream<R> {
    pub fn new(inner: R, name: &str, declared_size: u64) -> io::Result<Self> {
        let decoder = zstd::stream::read::Decoder::new(TaggedInput(inner))?.single_frame();
        Ok(Self {
            decoder,
            name: name.to_string(),
            declared_size,
            produced: 0,
            done: false,
        })
    }

    fn finish(&mut self) -> io::Result<usize> {
        self.done = true;
        if self.produced == 0 && self.declared_size > 0 {
            return Err(Error::EmptyStream(self.name.clone()).into_io());
        }
        Ok(0)
    }
}

impl<R: Read> Read for ZstdStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        match self.decoder.read(buf) {
            Ok(0) => self.finish(),
            Ok(n) => {
                self.produced += n as u64;
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) if e.get_ref().is_some_and(|inner| inner.is::<InputError>()) => {
                Err(InputError::unwrap(e))
            }
            Err(e) => {
                debug!(
                    entry = %self.name,
                    produced = self.produced,
                    "zstd stream ended: {e}"
                );
                self.finish()
            }
        }
    }
}

/// An error raised by the compressed input rather than by the decoder.
#[derive(Debug)]
struct InputError(io::Error);

impl InputError {
    fn unwrap(err: io::Error) -> io::Error {
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<Self>()) {
            Some(Ok(tagged)) => tagged.0,
            Some(Err(other)) => io::Error::new(kind, other),
            None => io::Error::from(kind),
        }
    }
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Tags read errors from the input so the decoder's own failures can be
/// told apart from them.
pub struct TaggedInput<R>(R);

impl<R: Read> Read for TaggedInput<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).map_err(|e| match e.kind() {
            io::ErrorKind::Interrupted => e,
            kind => io::Error::new(kind, InputError(e)),
        })
    }
}
