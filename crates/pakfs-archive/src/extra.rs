//! Extra field decoding.
//!
//! Each central directory record carries a block of `(tag, length, payload)`
//! chunks. Only the ZIP64 chunk (tag `0x0001`) is interpreted. The game
//! packer additionally stores an encryption marker at a fixed offset inside
//! the block, overlapping the custom chunks it writes, so that flag is read
//! by position rather than by tag.

use crate::zip::{ZIP64_EXTRA_TAG, ZIP64_SENTINEL};
use crate::{Error, Result};

/// Offset of the encryption marker byte inside the extra field block.
pub const ENCRYPTION_MARKER_OFFSET: usize = 168;

/// Size, compressed size and header offset of an entry.
///
/// Built from the 32-bit directory fields and updated in place by the
/// ZIP64 chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryGeometry {
    /// Uncompressed size in bytes.
    pub uncompressed_size: u64,
    /// Compressed size in bytes.
    pub compressed_size: u64,
    /// Offset of the local file header, before concatenation correction.
    pub header_offset: u64,
}

impl EntryGeometry {
    /// Widen the 32-bit directory fields.
    pub fn from_directory(uncompressed_size: u32, compressed_size: u32, header_offset: u32) -> Self {
        Self {
            uncompressed_size: uncompressed_size.into(),
            compressed_size: compressed_size.into(),
            header_offset: header_offset.into(),
        }
    }
}

/// Result of decoding one extra field block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraFields {
    /// Geometry after ZIP64 overrides.
    pub geometry: EntryGeometry,
    /// Whether the entry payload is AES encrypted.
    pub is_encrypted: bool,
}

/// Read the positional encryption marker.
///
/// True iff the block holds at least `ENCRYPTION_MARKER_OFFSET + 1` bytes and
/// the marker byte is non-zero. Independent of the chunk structure.
#[inline]
pub fn is_encrypted(extra: &[u8]) -> bool {
    extra
        .get(ENCRYPTION_MARKER_OFFSET)
        .is_some_and(|&marker| marker != 0)
}

/// Decode an extra field block.
///
/// Returns the decoded fields and the number of bytes walked by the chunk
/// parser. A trailing chunk whose payload runs past the block ends the walk
/// without error.
pub fn decode(extra: &[u8], geometry: EntryGeometry) -> Result<(ExtraFields, usize)> {
    let is_encrypted = is_encrypted(extra);

    let mut geometry = geometry;
    let mut offset = 0;
    while let Some((tag, payload, next)) = next_chunk(extra, offset) {
        if tag == ZIP64_EXTRA_TAG {
            geometry = apply_zip64(payload, geometry)?;
        }
        offset = next;
    }

    Ok((
        ExtraFields {
            geometry,
            is_encrypted,
        },
        offset,
    ))
}

/// Split the chunk starting at `offset`.
///
/// Returns the tag, its payload and the offset of the following chunk.
fn next_chunk(extra: &[u8], offset: usize) -> Option<(u16, &[u8], usize)> {
    let header = extra.get(offset..offset + 4)?;
    let tag = u16::from_le_bytes([header[0], header[1]]);
    let len = u16::from_le_bytes([header[2], header[3]]) as usize;

    let start = offset + 4;
    let payload = extra.get(start..start + len)?;
    Some((tag, payload, start + len))
}

fn apply_zip64(payload: &[u8], mut geometry: EntryGeometry) -> Result<EntryGeometry> {
    let len = payload.len();
    if !matches!(len, 0 | 8 | 16) && len < 24 {
        return Err(Error::CorruptExtraField {
            tag: ZIP64_EXTRA_TAG,
            len: len as u16,
        });
    }

    // A fourth field (disk start number) may follow; it is not used.
    let mut values = payload.chunks_exact(8).take(3).map(|chunk| {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(chunk);
        u64::from_le_bytes(bytes)
    });

    let sentinel = u64::from(ZIP64_SENTINEL);
    for field in [
        &mut geometry.uncompressed_size,
        &mut geometry.compressed_size,
        &mut geometry.header_offset,
    ] {
        if *field == sentinel {
            *field = values.next().ok_or(Error::CorruptExtraField {
                tag: ZIP64_EXTRA_TAG,
                len: len as u16,
            })?;
        }
    }

    Ok(geometry)
}
