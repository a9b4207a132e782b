//! pakfs - game data archive reading library.
//!
//! This crate provides a unified interface to the pakfs crates.
//!
//! # Crates
//!
//! - [`pakfs_common`] - Common utilities (binary reading, CP437 decoding)
//! - [`pakfs_archive`] - Archive reading (ZIP64 + AES + Zstd + nested containers)
//!
//! # Example
//!
//! ```no_run
//! use pakfs::prelude::*;
//!
//! let archive = Archive::open("Data.p4k")?;
//!
//! for entry in archive.search(&["a/b"], SearchMode::ExactStem, true)? {
//!     let data = archive.read(entry)?;
//!     println!("{}: {} bytes", entry.name(), data.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use pakfs_archive as archive;
pub use pakfs_common as common;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use pakfs_archive::{
        Archive, ArchiveOptions, Entry, EntrySource, Error, ErrorKind, ExtractOptions,
        ExtractSummary, HeaderValidation, PayloadTranscoder, SearchMode,
    };
    pub use pakfs_common::BinaryReader;
}
