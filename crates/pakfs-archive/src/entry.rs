//! Archive entry model.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use crate::archive::Archive;
use crate::zip::CompressionMethod;

/// Where the bytes of an entry live.
#[derive(Debug, Clone)]
pub enum EntrySource {
    /// The entry is read straight from the archive that lists it.
    Direct,
    /// The entry was flattened out of a nested container; reads are
    /// delegated to that container using its own record.
    SubArchive {
        /// Non-owning handle; the parent archive keeps the sub-archive alive.
        archive: Weak<Archive>,
        /// The record as listed by the nested container.
        inner: Box<Entry>,
    },
}

/// An entry (file) within an archive.
///
/// This contains metadata about the file, not the file data itself.
/// Use [`Archive::open_entry`] or [`Archive::read`] to get the contents.
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) name: String,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
    pub(crate) crc32: u32,
    pub(crate) compression_method: u16,
    pub(crate) flags: u16,
    pub(crate) version_made_by: u16,
    pub(crate) version_needed: u16,
    /// DOS date/time, time in the low half.
    pub(crate) dos_datetime: u32,
    pub(crate) internal_attrs: u16,
    pub(crate) external_attrs: u32,
    /// Local header offset, already corrected by the concatenation delta.
    pub(crate) local_header_offset: u64,
    pub(crate) is_encrypted: bool,
    pub(crate) source: EntrySource,
}

impl Entry {
    /// Build the flattened copy of a sub-archive entry under `name`.
    pub(crate) fn flattened(name: String, inner: &Entry, archive: Weak<Archive>) -> Self {
        Self {
            name,
            source: EntrySource::SubArchive {
                archive,
                inner: Box::new(inner.clone()),
            },
            ..inner.clone()
        }
    }

    /// Get the file name/path.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the compressed size in bytes.
    #[inline]
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Get the uncompressed size in bytes.
    ///
    /// Advisory: streams end when the decoder does, not at this size.
    #[inline]
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Get the raw compression method id.
    #[inline]
    pub fn compression_id(&self) -> u16 {
        self.compression_method
    }

    /// Get the compression method, if it is one this reader decodes.
    #[inline]
    pub fn compression_method(&self) -> Option<CompressionMethod> {
        CompressionMethod::try_from(self.compression_method).ok()
    }

    /// Check if the entry is encrypted.
    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.is_encrypted
    }

    /// Get the CRC32 checksum declared by the directory.
    #[inline]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Get the general purpose bit flags.
    #[inline]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Get the "version made by" field.
    #[inline]
    pub fn version_made_by(&self) -> u16 {
        self.version_made_by
    }

    /// Get the "version needed to extract" field.
    #[inline]
    pub fn version_needed(&self) -> u16 {
        self.version_needed
    }

    #[inline]
    pub fn internal_attrs(&self) -> u16 {
        self.internal_attrs
    }

    #[inline]
    pub fn external_attrs(&self) -> u32 {
        self.external_attrs
    }

    /// Get the offset of the local file header.
    ///
    /// Meaningless for flattened entries, which are addressed through their
    /// sub-archive.
    #[inline]
    pub fn local_header_offset(&self) -> u64 {
        self.local_header_offset
    }

    /// Get where this entry's bytes live.
    #[inline]
    pub fn source(&self) -> &EntrySource {
        &self.source
    }

    /// Check whether this entry was flattened out of a nested container.
    #[inline]
    pub fn is_flattened(&self) -> bool {
        matches!(self.source, EntrySource::SubArchive { .. })
    }

    /// Get the sub-archive owning this entry, if it is flattened and still open.
    pub fn sub_archive(&self) -> Option<Arc<Archive>> {
        match &self.source {
            EntrySource::Direct => None,
            EntrySource::SubArchive { archive, .. } => archive.upgrade(),
        }
    }

    /// Get the raw DOS date/time value.
    #[inline]
    pub fn dos_datetime(&self) -> u32 {
        self.dos_datetime
    }

    /// Decode the DOS date/time as `(year, month, day, hour, minute, second)`.
    pub fn date_time(&self) -> (u16, u8, u8, u8, u8, u8) {
        let time = self.dos_datetime & 0xFFFF;
        let date = self.dos_datetime >> 16;
        (
            (date >> 9) as u16 + 1980,
            ((date >> 5) & 0x0F) as u8,
            (date & 0x1F) as u8,
            (time >> 11) as u8,
            ((time >> 5) & 0x3F) as u8,
            ((time & 0x1F) * 2) as u8,
        )
    }

    /// Get the last modification time as a SystemTime.
    ///
    /// Returns None if the DOS datetime is invalid.
    pub fn last_modified(&self) -> Option<SystemTime> {
        dos_datetime_to_system_time(self.dos_datetime)
    }

    /// Get the relative output path for extraction.
    ///
    /// Backslashes are treated as separators.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(self.name.replace('\\', "/"))
    }

    /// Check if this entry represents a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/') || self.name.ends_with('\\')
    }

    /// Get the last path component.
    pub fn file_name(&self) -> &str {
        base_name(&self.name)
    }

    /// Get the final file extension, if any.
    pub fn extension(&self) -> Option<&str> {
        Path::new(self.file_name())
            .extension()
            .and_then(|ext| ext.to_str())
    }

    /// Get everything after the first `.` of the file name.
    ///
    /// This is how nested containers and structured metadata files are
    /// recognised (`foo.socpak` → `socpak`, `a.dds.5` → `dds.5`).
    pub fn compound_extension(&self) -> Option<&str> {
        compound_extension(&self.name)
    }
}

/// Last path component of an archive name, ignoring a trailing separator.
pub(crate) fn base_name(name: &str) -> &str {
    let trimmed = name.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
}

/// Everything after the first `.` of the last path component.
pub(crate) fn compound_extension(name: &str) -> Option<&str> {
    base_name(name).split_once('.').map(|(_, ext)| ext)
}

/// Convert DOS date/time format to SystemTime.
///
/// DOS date/time format:
/// - Time: bits 0-4 = seconds/2, bits 5-10 = minutes, bits 11-15 = hours
/// - Date: bits 16-20 = day, bits 21-24 = month, bits 25-31 = year-1980
fn dos_datetime_to_system_time(datetime: u32) -> Option<SystemTime> {
    let year = 1980 + ((datetime >> 25) & 0x7F) as i32;
    let month = (datetime >> 21) & 0x0F;
    let day = (datetime >> 16) & 0x1F;
    let hour = (datetime >> 11) & 0x1F;
    let minute = (datetime >> 5) & 0x3F;
    let second = (datetime & 0x1F) * 2;

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || minute > 59 || second > 59
    {
        return None;
    }

    const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    let mut days: u64 = (1970..year)
        .map(|y| if is_leap_year(y) { 366 } else { 365 })
        .sum();
    for m in 1..month {
        days += u64::from(DAYS_IN_MONTH[(m - 1) as usize]);
        if m == 2 && is_leap_year(year) {
            days += 1;
        }
    }
    days += u64::from(day - 1);

    let secs = days * 86400 + u64::from(hour) * 3600 + u64::from(minute) * 60 + u64::from(second);
    std::time::UNIX_EPOCH.checked_add(std::time::Duration::from_secs(secs))
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[cfg(test)]
pub(crate) fn test_entry(name: &str) -> Entry {
    Entry {
        name: name.to_string(),
        compressed_size: 0,
        uncompressed_size: 0,
        crc32: 0,
        compression_method: 0,
        flags: 0,
        version_made_by: 20,
        version_needed: 20,
        dos_datetime: 0,
        internal_attrs: 0,
        external_attrs: 0,
        local_header_offset: 0,
        is_encrypted: false,
        source: EntrySource::Direct,
    }
}
