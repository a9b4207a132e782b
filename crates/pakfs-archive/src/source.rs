//! Random-access byte sources backing an archive.
//!
//! Every entry stream of an archive shares one source. Reads are positional,
//! so concurrent streams never disturb each other's cursor; the file-backed
//! source serializes the underlying seek-and-read behind a mutex.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::Mutex;

/// A random-access, shareable byte source.
pub trait ByteSource: Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Read up to `buf.len()` bytes at `offset`. Returns 0 at end of source.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Check if the source is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` completely from `offset`.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf)? {
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "read past end of archive",
                    ))
                }
                n => {
                    offset += n as u64;
                    buf = &mut buf[n..];
                }
            }
        }
        Ok(())
    }

    /// Read `len` bytes at `offset` into a new buffer.
    fn read_vec_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }
}

/// A file shared by all streams of an archive.
pub struct FileSource {
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    pub fn new(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

/// A memory-mapped file.
pub struct MmapSource {
    mmap: Mmap,
}

impl MmapSource {
    pub fn new(file: &File) -> io::Result<Self> {
        // The archive is opened read-only; truncation by another process
        // while mapped is outside our control.
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self { mmap })
    }
}

impl ByteSource for MmapSource {
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(copy_from_slice_at(&self.mmap, offset, buf))
    }
}

/// An owned in-memory buffer.
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(copy_from_slice_at(&self.data, offset, buf))
    }
}

/// A window `[base, base + len)` of another source.
pub struct RangeSource {
    parent: Arc<dyn ByteSource>,
    base: u64,
    len: u64,
}

impl RangeSource {
    pub fn new(parent: Arc<dyn ByteSource>, base: u64, len: u64) -> Self {
        Self { parent, base, len }
    }
}

impl ByteSource for RangeSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let available = (self.len - offset).min(buf.len() as u64) as usize;
        self.parent.read_at(self.base + offset, &mut buf[..available])
    }
}

fn copy_from_slice_at(data: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= data.len() {
        return 0;
    }
    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}

/// Sequential reader over `[start, end)` of a shared source.
///
/// Holds its own position, so any number of these can be live at once.
pub struct RangeReader {
    source: Arc<dyn ByteSource>,
    position: u64,
    end: u64,
}

impl RangeReader {
    pub fn new(source: Arc<dyn ByteSource>, start: u64, len: u64) -> Self {
        Self {
            source,
            position: start,
            end: start.saturating_add(len),
        }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> u64 {
        self.end - self.position
    }
}

impl Read for RangeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = self.remaining().min(buf.len() as u64) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.source.read_at(self.position, &mut buf[..want])?;
        self.position += n as u64;
        Ok(n)
    }
}
