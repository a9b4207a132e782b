//! Archive reader.
//!
//! An [`Archive`] owns the parsed central directory, a name index for
//! exact and case-insensitive lookup, and the table of nested containers
//! whose entries were flattened into it.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use pakfs_common::cp437;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::directory::read_directory;
use crate::entry::{Entry, EntrySource};
use crate::header::validate_local_header;
use crate::options::ArchiveOptions;
use crate::source::{ByteSource, FileSource, MemorySource, MmapSource};
use crate::stream::{open_stream, EntryReader};
use crate::{Error, Result};

/// Upper bound on the up-front buffer reservation in [`Archive::read`].
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// A nested container discovered in the directory.
#[derive(Debug)]
pub(crate) struct SubArchiveSlot {
    pub name: String,
    pub archive: Option<Arc<Archive>>,
}

/// A game data archive.
pub struct Archive {
    name: String,
    pub(crate) source: Arc<dyn ByteSource>,
    pub(crate) options: ArchiveOptions,
    comment: Vec<u8>,
    concat: i64,
    entries: Vec<Entry>,
    by_name: FxHashMap<String, usize>,
    by_name_lower: FxHashMap<String, usize>,
    pub(crate) sub_archives: Vec<SubArchiveSlot>,
}

impl Archive {
    /// Open an archive file with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ArchiveOptions::default())
    }

    /// Open an archive file.
    pub fn open_with<P: AsRef<Path>>(path: P, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let source: Arc<dyn ByteSource> = if options.memory_map {
            Arc::new(MmapSource::new(&file)?)
        } else {
            Arc::new(FileSource::new(file)?)
        };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Self::from_source(name, source, options)
    }

    /// Open an archive held in memory.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>, options: ArchiveOptions) -> Result<Self> {
        Self::from_source(name.into(), Arc::new(MemorySource::new(data)), options)
    }

    /// Open an archive over any random-access byte source.
    pub fn from_source(
        name: String,
        source: Arc<dyn ByteSource>,
        options: ArchiveOptions,
    ) -> Result<Self> {
        let directory = read_directory(source.as_ref())?;

        let mut archive = Self {
            name,
            source,
            options,
            comment: directory.comment,
            concat: directory.concat,
            entries: Vec::with_capacity(directory.entries.len()),
            by_name: FxHashMap::default(),
            by_name_lower: FxHashMap::default(),
            sub_archives: Vec::new(),
        };
        for entry in directory.entries {
            archive.insert(entry);
        }

        if archive.options.expand_sub_archives && !archive.sub_archives.is_empty() {
            archive.expand_sub_archives()?;
        }

        debug!(
            archive = %archive.name,
            entries = archive.entries.len(),
            sub_archives = archive.sub_archives.len(),
            "opened archive"
        );
        Ok(archive)
    }

    /// Add or replace an entry, keeping both name indexes in sync.
    ///
    /// A repeated name replaces the earlier record in place, so listing
    /// order follows first appearance.
    pub(crate) fn insert(&mut self, entry: Entry) {
        let lower = entry.name.to_lowercase();
        let register = self.options.expand_sub_archives
            && !entry.is_flattened()
            && !entry.is_dir()
            && entry
                .compound_extension()
                .is_some_and(|ext| self.options.is_sub_archive_extension(ext));

        if register && !self.by_name.contains_key(&entry.name) {
            self.sub_archives.push(SubArchiveSlot {
                name: entry.name.clone(),
                archive: None,
            });
        }

        match self.by_name.get(&entry.name) {
            Some(&index) => {
                self.by_name_lower.insert(lower, index);
                self.entries[index] = entry;
            }
            None => {
                let index = self.entries.len();
                self.by_name.insert(entry.name.clone(), index);
                self.by_name_lower.insert(lower, index);
                self.entries.push(entry);
            }
        }
    }

    /// Get the archive name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the raw archive comment.
    #[inline]
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Get the archive comment decoded as CP437.
    pub fn comment_text(&self) -> std::borrow::Cow<'_, str> {
        cp437::decode(&self.comment)
    }

    /// Get the number of bytes found in front of the archive data.
    ///
    /// Non-zero when the archive was appended to another file.
    #[inline]
    pub fn concat_offset(&self) -> i64 {
        self.concat
    }

    /// Get the options this archive was opened with.
    #[inline]
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Get the number of entries, flattened ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get all entries in listing order.
    #[inline]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Iterate over entries in listing order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.entries.iter()
    }

    /// Iterate over entry names in listing order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Find an entry by name, falling back to a case-insensitive match.
    pub fn get(&self, name: &str) -> Result<&Entry> {
        self.get_with_case(name, true)
    }

    /// Find an entry by name.
    ///
    /// An exact match always wins; with `case_insensitive` set, a lowercase
    /// match is tried next.
    pub fn get_with_case(&self, name: &str, case_insensitive: bool) -> Result<&Entry> {
        let normalized = name.replace('\\', "/");
        let index = self.by_name.get(&normalized).copied().or_else(|| {
            case_insensitive
                .then(|| self.by_name_lower.get(&normalized.to_lowercase()).copied())
                .flatten()
        });
        index
            .map(|i| &self.entries[i])
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))
    }

    /// Check whether an entry exists (case-insensitive).
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    /// Iterate over nested containers and their opened archives.
    ///
    /// The archive is `None` for containers that were not expanded.
    pub fn sub_archives(&self) -> impl Iterator<Item = (&str, Option<&Arc<Archive>>)> + '_ {
        self.sub_archives
            .iter()
            .map(|slot| (slot.name.as_str(), slot.archive.as_ref()))
    }

    /// Open a stream over the plain bytes of `entry`.
    ///
    /// The local header is validated first. Flattened entries are read
    /// through the sub-archive that owns them.
    pub fn open_entry(&self, entry: &Entry) -> Result<EntryReader> {
        match &entry.source {
            EntrySource::SubArchive { archive, inner } => {
                let archive = archive
                    .upgrade()
                    .ok_or_else(|| Error::SubArchiveClosed(entry.name.clone()))?;
                archive.open_entry(inner)
            }
            EntrySource::Direct => {
                let data_offset =
                    validate_local_header(self.source.as_ref(), entry, self.options.validation)?;
                open_stream(Arc::clone(&self.source), data_offset, entry, &self.options.key)
            }
        }
    }

    /// Open an entry by name (case-insensitive).
    pub fn open_by_name(&self, name: &str) -> Result<EntryReader> {
        let entry = self.get(name)?;
        self.open_entry(entry)
    }

    /// Read the plain bytes of `entry` into memory.
    pub fn read(&self, entry: &Entry) -> Result<Vec<u8>> {
        let mut stream = self.open_entry(entry)?;
        let mut data = Vec::with_capacity(entry.uncompressed_size.min(MAX_PREALLOCATION) as usize);
        stream.read_to_end(&mut data).map_err(Error::from_io)?;
        Ok(data)
    }

    /// Read an entry by name (case-insensitive).
    pub fn read_by_name(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.get(name)?;
        self.read(entry)
    }

    /// Read several entries in parallel.
    #[cfg(feature = "parallel")]
    pub fn read_parallel(&self, entries: &[&Entry]) -> Vec<Result<Vec<u8>>> {
        use rayon::prelude::*;

        entries.par_iter().map(|entry| self.read(entry)).collect()
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .field("sub_archives", &self.sub_archives.len())
            .field("concat", &self.concat)
            .finish()
    }
}
