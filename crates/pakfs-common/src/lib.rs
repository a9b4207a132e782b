//! Common utilities for pakfs.
//!
//! This crate provides the foundational pieces shared by the pakfs crates:
//!
//! - [`BinaryReader`] - Zero-copy binary reading from byte slices
//! - [`cp437`] - IBM code page 437 decoding for legacy ZIP file names

mod error;
mod reader;

pub mod cp437;

pub use error::{Error, Result};
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
