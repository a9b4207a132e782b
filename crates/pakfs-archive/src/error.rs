//! Error types for the archive crate.

use thiserror::Error;

/// Errors that can occur when working with game data archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] pakfs_common::Error),

    /// Invalid ZIP magic bytes.
    #[error("invalid ZIP signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },

    /// Could not find the end of central directory record.
    #[error("could not find end of central directory record")]
    EocdNotFound,

    /// Central directory ended in the middle of a record.
    #[error("truncated central directory")]
    TruncatedDirectory,

    /// Central directory or an entry offset points outside the archive.
    #[error("central directory geometry points outside the archive")]
    DirectoryOutOfBounds,

    /// Local header ended before its file name.
    #[error("truncated local file header for {0}")]
    TruncatedHeader(String),

    /// The local header names a different file than the central directory.
    #[error("file name in directory {directory:?} and header {header:?} differ")]
    FileNameMismatch { directory: String, header: String },

    /// Malformed extra field chunk.
    #[error("corrupt extra field {tag:#06x} (size={len})")]
    CorruptExtraField { tag: u16, len: u16 },

    /// Zstd stream ended before producing anything for a non-empty entry.
    #[error("no data could be decoded for {0}")]
    EmptyStream(String),

    /// A local header flag requests a feature this reader does not implement.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    /// Unsupported compression method.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// Unsupported version needed to extract.
    #[error("unsupported zip version {}.{}", .0 / 10, .0 % 10)]
    UnsupportedVersion(u16),

    /// Decryption error.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Entry not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// The sub-archive owning a flattened entry has been dropped.
    #[error("sub-archive for {0} is no longer open")]
    SubArchiveClosed(String),

    /// An entry name escapes the extraction directory.
    #[error("unsafe entry path: {0}")]
    UnsafePath(String),

    /// Invalid search pattern.
    #[error("invalid search pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The payload transcoder failed.
    #[error("failed to transcode {name}: {source}")]
    Transcode {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The archive bytes do not form a valid container.
    MalformedArchive,
    /// The archive uses a feature this reader does not implement.
    UnsupportedFeature,
    /// The requested entry does not exist.
    NotFound,
    /// Decryption failed.
    Decryption,
    /// Caller supplied an invalid argument (pattern, path).
    InvalidInput,
    /// The payload transcoder failed.
    Transcode,
    /// Underlying I/O failed.
    Io,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Common(_)
            | Self::InvalidSignature { .. }
            | Self::EocdNotFound
            | Self::TruncatedDirectory
            | Self::DirectoryOutOfBounds
            | Self::TruncatedHeader(_)
            | Self::FileNameMismatch { .. }
            | Self::CorruptExtraField { .. }
            | Self::EmptyStream(_) => ErrorKind::MalformedArchive,
            Self::UnsupportedFeature(_)
            | Self::UnsupportedCompression(_)
            | Self::UnsupportedVersion(_) => ErrorKind::UnsupportedFeature,
            Self::Decryption(_) => ErrorKind::Decryption,
            Self::EntryNotFound(_) | Self::SubArchiveClosed(_) => ErrorKind::NotFound,
            Self::UnsafePath(_) | Self::InvalidPattern { .. } => ErrorKind::InvalidInput,
            Self::Transcode { .. } => ErrorKind::Transcode,
        }
    }

    /// Recover an archive error carried inside an [`std::io::Error`].
    ///
    /// Entry streams implement [`std::io::Read`], so decoding failures surface
    /// as I/O errors wrapping this type.
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Self>()) {
            return Self::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Self>()) {
            Some(Ok(inner)) => *inner,
            _ => Self::Io(std::io::Error::other("unrecoverable stream error")),
        }
    }

    /// Wrap this error so it can travel through [`std::io::Read`].
    pub(crate) fn into_io(self) -> std::io::Error {
        match self {
            Self::Io(err) => err,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
