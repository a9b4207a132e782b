//! Archive open options.

use crate::crypto::DEFAULT_KEY;

/// Nested-container extensions recognised by default.
pub const DEFAULT_SUB_ARCHIVE_EXTENSIONS: &[&str] = &["pak", "socpak"];

/// How strictly local file headers are checked against the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderValidation {
    /// The local header must echo the directory file name.
    #[default]
    Strict,
    /// Name mismatches are tolerated (nested containers from other tooling).
    Lenient,
}

/// Options controlling how an archive is opened.
///
/// # Example
///
/// ```
/// use pakfs_archive::ArchiveOptions;
///
/// let options = ArchiveOptions::new()
///     .memory_map(true)
///     .sub_archive_extensions(["socpak"]);
/// assert!(options.is_sub_archive_extension("SOCPAK"));
/// assert!(!options.is_sub_archive_extension("pak"));
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub(crate) key: [u8; 16],
    pub(crate) sub_archive_extensions: Vec<String>,
    pub(crate) expand_sub_archives: bool,
    pub(crate) validation: HeaderValidation,
    pub(crate) memory_map: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY,
            sub_archive_extensions: DEFAULT_SUB_ARCHIVE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            expand_sub_archives: true,
            validation: HeaderValidation::Strict,
            memory_map: false,
        }
    }
}

impl ArchiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// AES-128 key for encrypted entries.
    pub fn key(mut self, key: [u8; 16]) -> Self {
        self.key = key;
        self
    }

    /// Extensions (text after the first `.` of the file name) that mark
    /// nested containers. Compared case-insensitively.
    pub fn sub_archive_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sub_archive_extensions = extensions
            .into_iter()
            .map(|ext| ext.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Whether nested containers are opened and flattened on open.
    pub fn expand_sub_archives(mut self, expand: bool) -> Self {
        self.expand_sub_archives = expand;
        self
    }

    /// Local header validation mode.
    pub fn validation(mut self, validation: HeaderValidation) -> Self {
        self.validation = validation;
        self
    }

    /// Memory-map the archive file instead of reading through a shared handle.
    pub fn memory_map(mut self, memory_map: bool) -> Self {
        self.memory_map = memory_map;
        self
    }

    /// Check whether `extension` marks a nested container.
    pub fn is_sub_archive_extension(&self, extension: &str) -> bool {
        self.sub_archive_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    /// Options for a nested container found inside an archive opened with `self`.
    pub(crate) fn for_sub_archive(&self) -> Self {
        Self {
            key: self.key,
            sub_archive_extensions: Vec::new(),
            expand_sub_archives: false,
            validation: HeaderValidation::Lenient,
            memory_map: false,
        }
    }
}
