//! In-memory archive fixtures for tests.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::crypto::{self, DEFAULT_KEY};
use crate::extra::ENCRYPTION_MARKER_OFFSET;
use crate::zip::{flags, ZIP64_SENTINEL};

/// 2021-03-14 15:09:26
const FIXTURE_DATETIME: u32 = ((((2021 - 1980) << 9) | (3 << 5) | 14) << 16) | ((15 << 11) | (9 << 5) | 13);

/// One entry to write into a fixture archive.
#[derive(Debug, Clone)]
pub(crate) struct FixtureEntry {
    name: Vec<u8>,
    data: Vec<u8>,
    method: u16,
    encrypted: bool,
    flags: u16,
    version_needed: u16,
    local_name: Option<Vec<u8>>,
    local_magic: [u8; 4],
    zip64_sizes: bool,
    crc: Option<u32>,
}

impl FixtureEntry {
    fn new(name: &[u8], data: &[u8], method: u16) -> Self {
        Self {
            name: name.to_vec(),
            data: data.to_vec(),
            method,
            encrypted: false,
            flags: 0,
            version_needed: 20,
            local_name: None,
            local_magic: *b"PK\x03\x04",
            zip64_sizes: false,
            crc: None,
        }
    }

    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self::new(name.as_bytes(), data, 0)
    }

    pub fn stored_raw_name(name: &[u8], data: &[u8]) -> Self {
        Self::new(name, data, 0)
    }

    pub fn deflate(name: &str, data: &[u8]) -> Self {
        Self::new(name.as_bytes(), data, 8)
    }

    pub fn zstd(name: &str, data: &[u8]) -> Self {
        Self::new(name.as_bytes(), data, 100)
    }

    pub fn directory(name: &str) -> Self {
        Self::new(name.as_bytes(), &[], 0)
    }

    pub fn method(mut self, method: u16) -> Self {
        self.method = method;
        self
    }

    /// Encrypt the payload and set the positional marker in the extra field.
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn utf8_name(mut self) -> Self {
        self.flags |= flags::UTF8_NAME;
        self
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags |= flags;
        self
    }

    pub fn version_needed(mut self, version: u16) -> Self {
        self.version_needed = version;
        self
    }

    /// Write a different name into the local header.
    pub fn local_name(mut self, name: &str) -> Self {
        self.local_name = Some(name.as_bytes().to_vec());
        self
    }

    /// Use the game packer's `PK\x03\x14` local header magic.
    pub fn variant_magic(mut self) -> Self {
        self.local_magic = *b"PK\x03\x14";
        self
    }

    pub fn local_magic(mut self, magic: [u8; 4]) -> Self {
        self.local_magic = magic;
        self
    }

    /// Store both sizes as ZIP64 sentinels with the values in the extra field.
    pub fn zip64_sizes(mut self) -> Self {
        self.zip64_sizes = true;
        self
    }

    /// Declare a CRC other than the real one.
    pub fn crc(mut self, crc: u32) -> Self {
        self.crc = Some(crc);
        self
    }

    fn payload(&self, key: &[u8; 16]) -> Vec<u8> {
        let compressed = match self.method {
            8 => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&self.data).unwrap();
                encoder.finish().unwrap()
            }
            100 => zstd::encode_all(&self.data[..], 3).unwrap(),
            _ => self.data.clone(),
        };
        if self.encrypted {
            crypto::encrypt(&compressed, key)
        } else {
            compressed
        }
    }

    fn extra(&self, compressed_size: u64) -> Vec<u8> {
        let mut extra = Vec::new();
        if self.zip64_sizes {
            extra.write_u16::<LittleEndian>(0x0001).unwrap();
            extra.write_u16::<LittleEndian>(16).unwrap();
            extra.write_u64::<LittleEndian>(self.data.len() as u64).unwrap();
            extra.write_u64::<LittleEndian>(compressed_size).unwrap();
        }
        if self.encrypted {
            let mut payload = vec![0u8; 200];
            payload[ENCRYPTION_MARKER_OFFSET - extra.len() - 4] = 1;
            extra.write_u16::<LittleEndian>(0x5000).unwrap();
            extra.write_u16::<LittleEndian>(payload.len() as u16).unwrap();
            extra.extend_from_slice(&payload);
        }
        extra
    }
}

/// Builds a complete archive in memory.
#[derive(Debug, Clone)]
pub(crate) struct ArchiveBuilder {
    prefix: Vec<u8>,
    entries: Vec<FixtureEntry>,
    comment: Vec<u8>,
    zip64_end: bool,
    key: [u8; 16],
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            prefix: Vec::new(),
            entries: Vec::new(),
            comment: Vec::new(),
            zip64_end: false,
            key: DEFAULT_KEY,
        }
    }

    pub fn entry(mut self, entry: FixtureEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Bytes of some other file the archive is appended to.
    pub fn prefix(mut self, prefix: &[u8]) -> Self {
        self.prefix = prefix.to_vec();
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// Write ZIP64 end records and sentinel values in the EOCD.
    pub fn zip64_end(mut self) -> Self {
        self.zip64_end = true;
        self
    }

    pub fn key(mut self, key: [u8; 16]) -> Self {
        self.key = key;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let mut directory = Vec::new();

        for entry in &self.entries {
            let offset = body.len() as u32;
            let payload = entry.payload(&self.key);
            let crc = entry.crc.unwrap_or_else(|| crc32fast::hash(&entry.data));
            let (usize32, csize32) = if entry.zip64_sizes {
                (ZIP64_SENTINEL, ZIP64_SENTINEL)
            } else {
                (entry.data.len() as u32, payload.len() as u32)
            };
            let extra = entry.extra(payload.len() as u64);
            let local_name = entry.local_name.as_ref().unwrap_or(&entry.name);

            body.extend_from_slice(&entry.local_magic);
            body.write_u16::<LittleEndian>(entry.version_needed).unwrap();
            body.write_u16::<LittleEndian>(entry.flags).unwrap();
            body.write_u16::<LittleEndian>(entry.method).unwrap();
            body.write_u32::<LittleEndian>(FIXTURE_DATETIME).unwrap();
            body.write_u32::<LittleEndian>(crc).unwrap();
            body.write_u32::<LittleEndian>(csize32).unwrap();
            body.write_u32::<LittleEndian>(usize32).unwrap();
            body.write_u16::<LittleEndian>(local_name.len() as u16).unwrap();
            body.write_u16::<LittleEndian>(0).unwrap();
            body.extend_from_slice(local_name);
            body.extend_from_slice(&payload);

            directory.extend_from_slice(b"PK\x01\x02");
            directory.write_u16::<LittleEndian>(45).unwrap();
            directory.write_u16::<LittleEndian>(entry.version_needed).unwrap();
            directory.write_u16::<LittleEndian>(entry.flags).unwrap();
            directory.write_u16::<LittleEndian>(entry.method).unwrap();
            directory.write_u32::<LittleEndian>(FIXTURE_DATETIME).unwrap();
            directory.write_u32::<LittleEndian>(crc).unwrap();
            directory.write_u32::<LittleEndian>(csize32).unwrap();
            directory.write_u32::<LittleEndian>(usize32).unwrap();
            directory.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
            directory.write_u16::<LittleEndian>(extra.len() as u16).unwrap();
            directory.write_u16::<LittleEndian>(0).unwrap();
            directory.write_u16::<LittleEndian>(0).unwrap();
            directory.write_u16::<LittleEndian>(0).unwrap();
            directory.write_u32::<LittleEndian>(0).unwrap();
            directory.write_u32::<LittleEndian>(offset).unwrap();
            directory.extend_from_slice(&entry.name);
            directory.extend_from_slice(&extra);
        }

        let directory_offset = body.len() as u64;
        let directory_size = directory.len() as u64;
        let count = self.entries.len() as u64;
        body.extend_from_slice(&directory);

        if self.zip64_end {
            let record_offset = body.len() as u64;
            body.extend_from_slice(b"PK\x06\x06");
            body.write_u64::<LittleEndian>(44).unwrap();
            body.write_u16::<LittleEndian>(45).unwrap();
            body.write_u16::<LittleEndian>(45).unwrap();
            body.write_u32::<LittleEndian>(0).unwrap();
            body.write_u32::<LittleEndian>(0).unwrap();
            body.write_u64::<LittleEndian>(count).unwrap();
            body.write_u64::<LittleEndian>(count).unwrap();
            body.write_u64::<LittleEndian>(directory_size).unwrap();
            body.write_u64::<LittleEndian>(directory_offset).unwrap();

            body.extend_from_slice(b"PK\x06\x07");
            body.write_u32::<LittleEndian>(0).unwrap();
            body.write_u64::<LittleEndian>(record_offset).unwrap();
            body.write_u32::<LittleEndian>(1).unwrap();
        }

        body.extend_from_slice(b"PK\x05\x06");
        body.write_u16::<LittleEndian>(0).unwrap();
        body.write_u16::<LittleEndian>(0).unwrap();
        if self.zip64_end {
            body.write_u16::<LittleEndian>(0xFFFF).unwrap();
            body.write_u16::<LittleEndian>(0xFFFF).unwrap();
            body.write_u32::<LittleEndian>(ZIP64_SENTINEL).unwrap();
            body.write_u32::<LittleEndian>(ZIP64_SENTINEL).unwrap();
        } else {
            body.write_u16::<LittleEndian>(count as u16).unwrap();
            body.write_u16::<LittleEndian>(count as u16).unwrap();
            body.write_u32::<LittleEndian>(directory_size as u32).unwrap();
            body.write_u32::<LittleEndian>(directory_offset as u32).unwrap();
        }
        body.write_u16::<LittleEndian>(self.comment.len() as u16).unwrap();
        body.extend_from_slice(&self.comment);

        let mut out = self.prefix.clone();
        out.extend_from_slice(&body);
        out
    }
}
