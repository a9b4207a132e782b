//! ZIP format structures.
//!
//! Record layouts, flag bits and compression ids, including the variant
//! local header magic and the zstd method id used by game data archives.

mod records;

pub use records::{CentralDirectoryHeader, Eocd64Locator, Eocd64Record, EocdRecord, LocalFileHeader};

/// Highest "version needed to extract" this reader understands (6.3).
pub const MAX_EXTRACT_VERSION: u16 = 63;

/// 32-bit size/offset value signalling that the real value lives in the
/// ZIP64 extra field.
pub const ZIP64_SENTINEL: u32 = 0xFFFF_FFFF;

/// Extra field tag of the ZIP64 extended information chunk.
pub const ZIP64_EXTRA_TAG: u16 = 0x0001;

/// General purpose bit flags.
pub mod flags {
    /// Traditional PKWARE encryption.
    pub const ENCRYPTED: u16 = 0x0001;
    /// Compressed patched data (ZIP 2.7).
    pub const PATCHED_DATA: u16 = 0x0020;
    /// Strong encryption.
    pub const STRONG_ENCRYPTION: u16 = 0x0040;
    /// File name and comment are UTF-8.
    pub const UTF8_NAME: u16 = 0x0800;
}

/// Compression methods found in game data archives and their nested containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CompressionMethod {
    /// No compression (stored).
    Store = 0,
    /// DEFLATE compression.
    Deflate = 8,
    /// Zstandard compression (proprietary method id).
    Zstd = 100,
}

impl CompressionMethod {
    /// Short display name, as printed in extraction logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Deflate => "deflate",
            Self::Zstd => "zstd",
        }
    }
}

impl TryFrom<u16> for CompressionMethod {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Store),
            8 => Ok(Self::Deflate),
            100 => Ok(Self::Zstd),
            other => Err(other),
        }
    }
}
