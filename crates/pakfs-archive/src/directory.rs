//! Central directory reader.
//!
//! Locates the end of central directory record from the tail of the source,
//! follows the optional ZIP64 records directly before it, works out the
//! concatenation delta, and decodes every directory record into an [`Entry`].

use pakfs_common::{cp437, BinaryReader};
use tracing::debug;

use crate::entry::{Entry, EntrySource};
use crate::extra::{self, EntryGeometry};
use crate::source::ByteSource;
use crate::zip::{
    flags, CentralDirectoryHeader, Eocd64Locator, Eocd64Record, EocdRecord, MAX_EXTRACT_VERSION,
};
use crate::{Error, Result};

/// The located end of central directory record.
#[derive(Debug, Clone)]
pub(crate) struct EndRecord {
    /// Absolute position of the EOCD signature.
    pub position: u64,
    pub record: EocdRecord,
    pub comment: Vec<u8>,
    pub zip64: Option<Eocd64Record>,
}

impl EndRecord {
    pub fn directory_size(&self) -> u64 {
        match &self.zip64 {
            Some(zip64) => zip64.central_dir_size,
            None => self.record.central_dir_size.into(),
        }
    }

    pub fn directory_offset(&self) -> u64 {
        match &self.zip64 {
            Some(zip64) => zip64.central_dir_offset,
            None => self.record.central_dir_offset.into(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        match &self.zip64 {
            Some(zip64) => zip64.central_dir_count_total,
            None => self.record.central_dir_count_total.into(),
        }
    }

    /// Offset correction for archives appended to another file.
    ///
    /// Zero unless bytes precede the archive. With ZIP64 records present
    /// they sit between the directory and the EOCD and are discounted.
    pub fn concat(&self) -> i64 {
        let mut concat = self.position as i64
            - self.directory_size() as i64
            - self.directory_offset() as i64;
        if self.zip64.is_some() {
            concat -= (Eocd64Record::SIZE + Eocd64Locator::SIZE) as i64;
        }
        concat
    }
}

/// A parsed central directory.
#[derive(Debug)]
pub(crate) struct Directory {
    pub entries: Vec<Entry>,
    pub comment: Vec<u8>,
    pub concat: i64,
}

/// Read the whole central directory of `source`.
pub(crate) fn read_directory(source: &dyn ByteSource) -> Result<Directory> {
    let end = locate_end_record(source)?;
    let concat = end.concat();
    let size = end.directory_size();

    let start = end
        .directory_offset()
        .checked_add_signed(concat)
        .ok_or(Error::DirectoryOutOfBounds)?;
    if start.checked_add(size).map_or(true, |stop| stop > source.len()) {
        return Err(Error::DirectoryOutOfBounds);
    }

    let size = usize::try_from(size).map_err(|_| Error::DirectoryOutOfBounds)?;
    let data = source.read_vec_at(start, size)?;
    let entries = parse_records(&data, concat, end.entry_count())?;

    debug!(
        entries = entries.len(),
        concat,
        zip64 = end.zip64.is_some(),
        "parsed central directory"
    );

    Ok(Directory {
        entries,
        comment: end.comment,
        concat,
    })
}

/// Find the EOCD record.
///
/// The record is tried at the very end first (no comment), then the last
/// 64 KiB are scanned backwards for a record whose comment fits.
pub(crate) fn locate_end_record(source: &dyn ByteSource) -> Result<EndRecord> {
    let len = source.len();
    if len < EocdRecord::SIZE as u64 {
        return Err(Error::EocdNotFound);
    }

    let tail_len = len.min((EocdRecord::SIZE + EocdRecord::MAX_COMMENT) as u64);
    let tail_start = len - tail_len;
    let tail = source.read_vec_at(tail_start, tail_len as usize)?;

    let fixed = tail.len() - EocdRecord::SIZE;
    let candidates = std::iter::once(fixed).chain(
        memchr::memmem::rfind_iter(&tail, &EocdRecord::MAGIC).filter(move |&pos| pos != fixed),
    );

    for pos in candidates {
        let Some((record, comment)) = parse_end_record(&tail[pos..]) else {
            continue;
        };
        let position = tail_start + pos as u64;
        let zip64 = read_zip64_end(source, position)?;
        return Ok(EndRecord {
            position,
            record,
            comment,
            zip64,
        });
    }

    Err(Error::EocdNotFound)
}

fn parse_end_record(data: &[u8]) -> Option<(EocdRecord, Vec<u8>)> {
    let mut reader = BinaryReader::new(data);
    reader.expect_magic(&EocdRecord::MAGIC).ok()?;
    let record: EocdRecord = reader.read_struct().ok()?;
    let comment = reader.read_bytes(record.comment_length as usize).ok()?;
    Some((record, comment.to_vec()))
}

/// Read the ZIP64 EOCD record if its locator sits right before the EOCD.
fn read_zip64_end(source: &dyn ByteSource, eocd_position: u64) -> Result<Option<Eocd64Record>> {
    let Some(locator_position) = eocd_position.checked_sub(Eocd64Locator::SIZE as u64) else {
        return Ok(None);
    };
    let locator = source.read_vec_at(locator_position, Eocd64Locator::SIZE)?;
    if locator[..4] != Eocd64Locator::MAGIC {
        return Ok(None);
    }

    let Some(record_position) = locator_position.checked_sub(Eocd64Record::SIZE as u64) else {
        return Ok(None);
    };
    let data = source.read_vec_at(record_position, Eocd64Record::SIZE)?;
    let mut reader = BinaryReader::new(&data);
    if reader.expect_magic(&Eocd64Record::MAGIC).is_err() {
        return Ok(None);
    }
    Ok(Some(reader.read_struct()?))
}

fn parse_records(data: &[u8], concat: i64, expected: u64) -> Result<Vec<Entry>> {
    let mut reader = BinaryReader::new(data);
    let mut entries = Vec::with_capacity(expected.min(1 << 20) as usize);

    while !reader.is_empty() {
        entries.push(parse_record(&mut reader, concat)?);
    }

    Ok(entries)
}

fn parse_record(reader: &mut BinaryReader<'_>, concat: i64) -> Result<Entry> {
    if reader.remaining() < CentralDirectoryHeader::SIZE {
        return Err(Error::TruncatedDirectory);
    }

    let sig = reader.read_u32()?;
    if sig != CentralDirectoryHeader::SIGNATURE {
        return Err(Error::InvalidSignature {
            expected: CentralDirectoryHeader::SIGNATURE,
            actual: sig,
        });
    }

    let header: CentralDirectoryHeader = reader.read_struct()?;
    if reader.remaining() < header.variable_data_size() {
        return Err(Error::TruncatedDirectory);
    }
    let name_bytes = reader.read_bytes(header.file_name_length as usize)?;
    let extra = reader.read_bytes(header.extra_field_length as usize)?;
    reader.advance(header.file_comment_length as usize);

    let name = cp437::decode_name(name_bytes, header.flags & flags::UTF8_NAME != 0)?.into_owned();

    if header.version_needed > MAX_EXTRACT_VERSION {
        return Err(Error::UnsupportedVersion(header.version_needed));
    }

    let geometry = EntryGeometry::from_directory(
        header.uncompressed_size,
        header.compressed_size,
        header.local_header_offset,
    );
    let (fields, _) = extra::decode(extra, geometry)?;

    let local_header_offset = fields
        .geometry
        .header_offset
        .checked_add_signed(concat)
        .ok_or(Error::DirectoryOutOfBounds)?;

    Ok(Entry {
        name,
        compressed_size: fields.geometry.compressed_size,
        uncompressed_size: fields.geometry.uncompressed_size,
        crc32: header.crc32,
        compression_method: header.compression_method,
        flags: header.flags,
        version_made_by: header.version_made_by,
        version_needed: header.version_needed,
        dos_datetime: header.last_modified,
        internal_attrs: header.internal_attrs,
        external_attrs: header.external_attrs,
        local_header_offset,
        is_encrypted: fields.is_encrypted,
        source: EntrySource::Direct,
    })
}
