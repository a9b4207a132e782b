//! Entry read streams: bounded range → decrypt → decompress.

use std::io::{self, Read};
use std::sync::Arc;

use flate2::read::DeflateDecoder;

use crate::crypto::DecryptReader;
use crate::decompress::ZstdStream;
use crate::entry::Entry;
use crate::source::{ByteSource, RangeReader};
use crate::zip::CompressionMethod;
use crate::{Error, Result};

/// A pull-based reader yielding the plain bytes of one entry.
///
/// Each reader owns a handle to the archive source and its own position,
/// so several can be open at once and dropping one has no effect on the
/// others.
pub struct EntryReader {
    inner: Box<dyn Read + Send>,
    name: String,
    declared_size: u64,
}

impl EntryReader {
    /// Name of the entry being read.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uncompressed size declared by the directory (advisory).
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl std::fmt::Debug for EntryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader")
            .field("name", &self.name)
            .field("declared_size", &self.declared_size)
            .finish()
    }
}

/// Build the adapter chain for `entry`, whose payload starts at `data_offset`.
pub(crate) fn open_stream(
    source: Arc<dyn ByteSource>,
    data_offset: u64,
    entry: &Entry,
    key: &[u8; 16],
) -> Result<EntryReader> {
    let method = CompressionMethod::try_from(entry.compression_method)
        .map_err(Error::UnsupportedCompression)?;

    let raw = RangeReader::new(source, data_offset, entry.compressed_size);
    let plain: Box<dyn Read + Send> = if entry.is_encrypted {
        Box::new(DecryptReader::new(raw, key))
    } else {
        Box::new(raw)
    };

    let inner: Box<dyn Read + Send> = match method {
        // Cipher padding would otherwise leak into stored payloads.
        CompressionMethod::Store if entry.is_encrypted => {
            Box::new(plain.take(entry.uncompressed_size))
        }
        CompressionMethod::Store => plain,
        CompressionMethod::Deflate => Box::new(DeflateDecoder::new(plain)),
        CompressionMethod::Zstd => Box::new(ZstdStream::new(
            plain,
            &entry.name,
            entry.uncompressed_size,
        )?),
    };

    Ok(EntryReader {
        inner,
        name: entry.name.clone(),
        declared_size: entry.uncompressed_size,
    })
}
