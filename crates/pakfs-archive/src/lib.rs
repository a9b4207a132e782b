//! Reader for game data archives.
//!
//! The archives are ZIP files with a few extensions:
//!
//! - Zstandard compression (method 100) next to store and DEFLATE
//! - AES-128-CBC encrypted payloads, flagged by a marker in the extra field
//! - A variant local header magic (`PK\x03\x14`)
//! - Nested containers (`.pak`, `.socpak`) whose entries are flattened into
//!   the parent's listing
//! - Archives appended to other files
//!
//! # Example
//!
//! ```no_run
//! use pakfs_archive::{Archive, ExtractOptions, SearchMode};
//!
//! let archive = Archive::open("Data.p4k")?;
//!
//! for entry in archive.iter().take(10) {
//!     println!("{}: {} bytes", entry.name(), entry.uncompressed_size());
//! }
//!
//! // Read a single file
//! let entry = archive.get("Data/Libs/Foundry/Records/example.xml")?;
//! let data = archive.read(entry)?;
//!
//! // Extract everything below a folder
//! archive.extract_all(&["Data/Libs/*"], SearchMode::Pattern, "out", &ExtractOptions::new())?;
//! # Ok::<(), pakfs_archive::Error>(())
//! ```
//!
//! # Features
//!
//! - `parallel`: open nested containers and extract entries on the rayon
//!   thread pool

mod archive;
mod crypto;
mod decompress;
mod directory;
mod entry;
mod error;
mod extra;
mod extract;
mod header;
mod options;
mod search;
mod source;
mod stream;
mod subarchive;
pub mod zip;

#[cfg(test)]
mod testutil;

pub use archive::Archive;
pub use crypto::DEFAULT_KEY;
pub use entry::{Entry, EntrySource};
pub use error::{Error, ErrorKind, Result};
pub use extract::{
    ExtractOptions, ExtractSummary, ExtractedFile, PayloadTranscoder,
    STRUCTURED_METADATA_EXTENSIONS, STRUCTURED_METADATA_MAGIC,
};
pub use options::{ArchiveOptions, HeaderValidation, DEFAULT_SUB_ARCHIVE_EXTENSIONS};
pub use search::SearchMode;
pub use source::{ByteSource, FileSource, MemorySource, MmapSource, RangeSource};
pub use stream::EntryReader;
pub use zip::CompressionMethod;
