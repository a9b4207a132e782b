//! Fixed-size ZIP records.
//!
//! Every struct mirrors the on-disk layout that follows a 4-byte signature.
//! The signature is checked by the caller and is not part of the struct;
//! `SIZE` constants include it.

use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Central directory file header.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    /// DOS date and time, time in the low half.
    pub last_modified: u32,
    pub crc32: u32,
    /// May be [`ZIP64_SENTINEL`](super::ZIP64_SENTINEL).
    pub compressed_size: u32,
    /// May be [`ZIP64_SENTINEL`](super::ZIP64_SENTINEL).
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_comment_length: u16,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    /// Relative to the start of the archive, not of the file.
    pub local_header_offset: u32,
}

impl CentralDirectoryHeader {
    pub const SIGNATURE: u32 = 0x0201_4b50;
    pub const SIZE: usize = 4 + std::mem::size_of::<Self>();

    /// Length of the name, extra field and comment after the fixed part.
    pub fn variable_data_size(&self) -> usize {
        usize::from(self.file_name_length)
            + usize::from(self.extra_field_length)
            + usize::from(self.file_comment_length)
    }
}

/// Local file header.
///
/// Only the signature, the name and the variable lengths are used; sizes
/// come from the central directory.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    /// `PK\x03\x04`
    pub const SIGNATURE: u32 = 0x0403_4b50;
    /// `PK\x03\x14`, written by the game packer.
    pub const SIGNATURE_EXTENDED: u32 = 0x1403_4b50;
    pub const SIZE: usize = 4 + std::mem::size_of::<Self>();

    /// Length of the name and extra field between header and payload.
    pub fn variable_data_size(&self) -> usize {
        usize::from(self.file_name_length) + usize::from(self.extra_field_length)
    }
}

/// End of central directory record.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct EocdRecord {
    pub disk_number: u16,
    pub central_dir_disk: u16,
    pub central_dir_count_disk: u16,
    pub central_dir_count_total: u16,
    pub central_dir_size: u32,
    pub central_dir_offset: u32,
    pub comment_length: u16,
}

impl EocdRecord {
    pub const MAGIC: [u8; 4] = *b"PK\x05\x06";
    /// Without the trailing comment.
    pub const SIZE: usize = 4 + std::mem::size_of::<Self>();
    pub const MAX_COMMENT: usize = u16::MAX as usize;
}

/// ZIP64 end of central directory locator. Sits right before the EOCD.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct Eocd64Locator {
    pub zip64_eocd_disk: u32,
    pub zip64_eocd_offset: u64,
    pub total_disks: u32,
}

impl Eocd64Locator {
    pub const MAGIC: [u8; 4] = *b"PK\x06\x07";
    pub const SIZE: usize = 4 + std::mem::size_of::<Self>();
}

/// ZIP64 end of central directory record. Sits right before the locator.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct Eocd64Record {
    /// Size of the rest of the record.
    pub record_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub central_dir_disk: u32,
    pub central_dir_count_disk: u64,
    pub central_dir_count_total: u64,
    pub central_dir_size: u64,
    pub central_dir_offset: u64,
}

impl Eocd64Record {
    pub const MAGIC: [u8; 4] = *b"PK\x06\x06";
    /// Fixed part only; extensible data is never read.
    pub const SIZE: usize = 4 + std::mem::size_of::<Self>();
}
