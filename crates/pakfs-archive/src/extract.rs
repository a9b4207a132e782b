//! Extraction of entries to the filesystem.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crc32fast::Hasher;
use tracing::{debug, warn};

use crate::archive::Archive;
use crate::entry::Entry;
use crate::search::SearchMode;
use crate::{Error, Result};

/// Leading bytes of a binary structured-metadata payload.
pub const STRUCTURED_METADATA_MAGIC: &[u8; 7] = b"CryXmlB";

/// Compound extensions that may hold binary structured metadata.
pub const STRUCTURED_METADATA_EXTENSIONS: &[&str] =
    &["xml", "mtl", "chrparams", "entxml", "rmp", "animevents"];

/// Converts binary structured-metadata payloads to another representation.
///
/// Only consulted for entries with one of
/// [`STRUCTURED_METADATA_EXTENSIONS`] whose decoded bytes start with
/// [`STRUCTURED_METADATA_MAGIC`]. The output is written in place of the
/// payload.
pub trait PayloadTranscoder: Send + Sync {
    fn transcode(
        &self,
        name: &str,
        payload: &[u8],
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Options for [`Archive::extract`] and [`Archive::extract_all`].
#[derive(Clone)]
pub struct ExtractOptions {
    flatten: bool,
    overwrite: bool,
    verify_crc: bool,
    case_insensitive: bool,
    transcoder: Option<Arc<dyn PayloadTranscoder>>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            flatten: false,
            overwrite: true,
            verify_crc: true,
            case_insensitive: true,
            transcoder: None,
        }
    }
}

impl std::fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("flatten", &self.flatten)
            .field("overwrite", &self.overwrite)
            .field("verify_crc", &self.verify_crc)
            .field("case_insensitive", &self.case_insensitive)
            .field("transcoder", &self.transcoder.is_some())
            .finish()
    }
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every file directly into the destination by its base name.
    pub fn flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    /// Replace files that already exist. When off they are skipped.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Compare the CRC of written data with the directory value.
    ///
    /// Mismatches are only reported; they never fail extraction.
    pub fn verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    /// Match [`Archive::extract_all`] filters without regard to case.
    pub fn case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    /// Transcoder for structured-metadata payloads.
    pub fn transcoder(mut self, transcoder: Arc<dyn PayloadTranscoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }
}

/// Result of extracting one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Where the entry was written.
    pub path: PathBuf,
    /// Bytes written to `path`.
    pub bytes_written: u64,
    /// The payload went through the transcoder.
    pub transcoded: bool,
    /// The decoded bytes disagree with the declared CRC.
    pub crc_mismatch: bool,
    /// The target existed and overwriting was off.
    pub skipped: bool,
}

/// Totals for a bulk extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractSummary {
    pub files: Vec<ExtractedFile>,
}

impl ExtractSummary {
    pub fn file_count(&self) -> usize {
        self.files.iter().filter(|f| !f.skipped).count()
    }

    pub fn skipped(&self) -> usize {
        self.files.iter().filter(|f| f.skipped).count()
    }

    pub fn bytes_written(&self) -> u64 {
        self.files.iter().map(|f| f.bytes_written).sum()
    }

    pub fn transcoded(&self) -> usize {
        self.files.iter().filter(|f| f.transcoded).count()
    }

    pub fn crc_mismatches(&self) -> usize {
        self.files.iter().filter(|f| f.crc_mismatch).count()
    }
}

/// Reader that hashes everything passing through it.
struct HashingReader<R> {
    inner: R,
    hasher: Hasher,
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.hasher.update(&buf[..count]);
        Ok(count)
    }
}

/// Relative output path for an entry name, or `None` if it would leave
/// the destination directory.
fn enclosed_path(name: &str) -> Option<PathBuf> {
    if name.contains('\0') {
        return None;
    }
    let normalized = name.replace('\\', "/");
    let mut path = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return None,
            Component::ParentDir => {
                if !path.pop() {
                    return None;
                }
            }
            Component::Normal(part) => path.push(part),
            Component::CurDir => (),
        }
    }
    Some(path)
}

fn is_structured_metadata(entry: &Entry) -> bool {
    entry.compound_extension().is_some_and(|ext| {
        STRUCTURED_METADATA_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    })
}

impl Archive {
    /// Extract one entry below `dest`.
    ///
    /// The entry keeps its directory structure unless the options ask for
    /// a flat layout. Directory entries only create the directory.
    pub fn extract<P: AsRef<Path>>(
        &self,
        entry: &Entry,
        dest: P,
        options: &ExtractOptions,
    ) -> Result<ExtractedFile> {
        let dest = dest.as_ref();
        let relative = if options.flatten {
            Some(entry.file_name())
                .filter(|name| is_plain_file_name(name))
                .map(PathBuf::from)
        } else {
            enclosed_path(entry.name())
        };
        let relative = relative.ok_or_else(|| Error::UnsafePath(entry.name().to_string()))?;
        let path = dest.join(relative);

        let mut result = ExtractedFile {
            path,
            bytes_written: 0,
            transcoded: false,
            crc_mismatch: false,
            skipped: false,
        };

        if entry.is_dir() {
            if !options.flatten {
                fs::create_dir_all(&result.path)?;
            }
            return Ok(result);
        }
        if !options.overwrite && result.path.exists() {
            debug!(name = %entry.name(), "skipping existing file");
            result.skipped = true;
            return Ok(result);
        }
        if let Some(parent) = result.path.parent() {
            fs::create_dir_all(parent)?;
        }

        debug!(
            method = entry.compression_method().map_or("Unknown", |m| m.name()),
            encrypted = entry.is_encrypted(),
            name = %entry.name(),
            "extracting"
        );

        let crc = match &options.transcoder {
            Some(transcoder) if is_structured_metadata(entry) => {
                let data = self.read(entry)?;
                let crc = crc32fast::hash(&data);
                let output = if data.starts_with(STRUCTURED_METADATA_MAGIC) {
                    result.transcoded = true;
                    transcoder
                        .transcode(entry.name(), &data)
                        .map_err(|source| Error::Transcode {
                            name: entry.name().to_string(),
                            source,
                        })?
                } else {
                    data
                };
                result.bytes_written = write_file(&result.path, &mut output.as_slice())?;
                crc
            }
            _ => {
                let mut reader = HashingReader {
                    inner: self.open_entry(entry)?,
                    hasher: Hasher::new(),
                };
                result.bytes_written = write_file(&result.path, &mut reader)?;
                reader.hasher.finalize()
            }
        };

        if options.verify_crc && crc != entry.crc32() {
            warn!(
                name = %entry.name(),
                expected = format_args!("{:#010x}", entry.crc32()),
                actual = format_args!("{:#010x}", crc),
                "CRC mismatch"
            );
            result.crc_mismatch = true;
        }

        Ok(result)
    }

    /// Extract every entry matching `filters` below `dest`.
    ///
    /// An empty filter list selects all entries. Matching ignores case
    /// unless the options turn that off.
    pub fn extract_all<S: AsRef<str>, P: AsRef<Path>>(
        &self,
        filters: &[S],
        mode: SearchMode,
        dest: P,
        options: &ExtractOptions,
    ) -> Result<ExtractSummary> {
        let dest = dest.as_ref();
        let entries: Vec<&Entry> = if filters.is_empty() {
            self.iter().collect()
        } else {
            self.search(filters, mode, options.case_insensitive)?
        };

        fs::create_dir_all(dest)?;
        let files = self.extract_entries(&entries, dest, options)?;

        let summary = ExtractSummary { files };
        debug!(
            files = summary.file_count(),
            bytes = summary.bytes_written(),
            crc_mismatches = summary.crc_mismatches(),
            "extraction finished"
        );
        Ok(summary)
    }

    #[cfg(not(feature = "parallel"))]
    fn extract_entries(
        &self,
        entries: &[&Entry],
        dest: &Path,
        options: &ExtractOptions,
    ) -> Result<Vec<ExtractedFile>> {
        entries
            .iter()
            .map(|entry| self.extract(entry, dest, options))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn extract_entries(
        &self,
        entries: &[&Entry],
        dest: &Path,
        options: &ExtractOptions,
    ) -> Result<Vec<ExtractedFile>> {
        use rayon::prelude::*;

        entries
            .par_iter()
            .map(|entry| self.extract(entry, dest, options))
            .collect()
    }
}

/// Copy `reader` into a new file at `path`.
///
/// A failed copy removes the partial file.
fn write_file<R: Read>(path: &Path, reader: &mut R) -> Result<u64> {
    let file = File::create(path)?;
    match copy_to(file, reader) {
        Ok(written) => Ok(written),
        Err(err) => {
            if let Err(cleanup) = fs::remove_file(path) {
                warn!(path = %path.display(), "failed to remove partial file: {cleanup}");
            }
            Err(Error::from_io(err))
        }
    }
}

fn copy_to<R: Read>(file: File, reader: &mut R) -> io::Result<u64> {
    let mut writer = BufWriter::new(file);
    let written = io::copy(reader, &mut writer)?;
    writer.flush()?;
    Ok(written)
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ArchiveOptions;
    use crate::testutil::{ArchiveBuilder, FixtureEntry};
    use crate::ErrorKind;

    struct Upper;

    impl PayloadTranscoder for Upper {
        fn transcode(
            &self,
            _name: &str,
            payload: &[u8],
        ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(payload[STRUCTURED_METADATA_MAGIC.len()..].to_ascii_uppercase())
        }
    }

    struct Failing;

    impl PayloadTranscoder for Failing {
        fn transcode(
            &self,
            _name: &str,
            _payload: &[u8],
        ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
            Err("bad node table".into())
        }
    }

    fn archive(builder: ArchiveBuilder) -> Archive {
        Archive::from_bytes("t.p4k", builder.build(), ArchiveOptions::default()).unwrap()
    }

    #[test]
    fn test_extract_keeps_structure() {
        let archive = archive(
            ArchiveBuilder::new()
                .entry(FixtureEntry::directory("Data/"))
                .entry(FixtureEntry::deflate("Data/Objects/a.txt", b"alpha"))
                .entry(FixtureEntry::zstd("Data/b.txt", b"beta").encrypted()),
        );
        let dir = tempfile::tempdir().unwrap();

        let summary = archive
            .extract_all::<&str, _>(&[], SearchMode::Pattern, dir.path(), &ExtractOptions::new())
            .unwrap();

        assert_eq!(summary.files.len(), 3);
        assert!(dir.path().join("Data").is_dir());
        assert_eq!(fs::read(dir.path().join("Data/Objects/a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(dir.path().join("Data/b.txt")).unwrap(), b"beta");
        assert_eq!(summary.bytes_written(), 9);
        assert_eq!(summary.crc_mismatches(), 0);
    }

    #[test]
    fn test_extract_flatten_with_filter() {
        let archive = archive(
            ArchiveBuilder::new()
                .entry(FixtureEntry::stored("x/one.xml", b"1"))
                .entry(FixtureEntry::stored("y/z/two.xml", b"2"))
                .entry(FixtureEntry::stored("y/three.json", b"3")),
        );
        let dir = tempfile::tempdir().unwrap();

        let summary = archive
            .extract_all(
                &[".XML"],
                SearchMode::Suffix,
                dir.path(),
                &ExtractOptions::new().flatten(true),
            )
            .unwrap();

        assert_eq!(summary.file_count(), 2);
        assert_eq!(fs::read(dir.path().join("one.xml")).unwrap(), b"1");
        assert_eq!(fs::read(dir.path().join("two.xml")).unwrap(), b"2");
        assert!(!dir.path().join("three.json").exists());
    }

    #[test]
    fn test_crc_mismatch_is_not_an_error() {
        let archive = archive(ArchiveBuilder::new().entry(FixtureEntry::stored("a.bin", b"data").crc(0xDEAD_BEEF)));
        let dir = tempfile::tempdir().unwrap();
        let entry = archive.get("a.bin").unwrap();

        let file = archive.extract(entry, dir.path(), &ExtractOptions::new()).unwrap();
        assert!(file.crc_mismatch);
        assert_eq!(fs::read(&file.path).unwrap(), b"data");

        let file = archive
            .extract(entry, dir.path(), &ExtractOptions::new().verify_crc(false))
            .unwrap();
        assert!(!file.crc_mismatch);
    }

    #[test]
    fn test_transcoding() {
        let mut payload = STRUCTURED_METADATA_MAGIC.to_vec();
        payload.extend_from_slice(b"node");
        let archive = archive(
            ArchiveBuilder::new()
                .entry(FixtureEntry::zstd("Libs/a.XML", &payload))
                .entry(FixtureEntry::stored("Libs/plain.xml", b"<text/>"))
                .entry(FixtureEntry::stored("Libs/b.dcb", &payload)),
        );
        let dir = tempfile::tempdir().unwrap();
        let options = ExtractOptions::new().transcoder(Arc::new(Upper));

        let summary = archive
            .extract_all::<&str, _>(&[], SearchMode::Pattern, dir.path(), &options)
            .unwrap();

        assert_eq!(summary.transcoded(), 1);
        assert_eq!(fs::read(dir.path().join("Libs/a.XML")).unwrap(), b"NODE");
        assert_eq!(fs::read(dir.path().join("Libs/plain.xml")).unwrap(), b"<text/>");
        assert_eq!(fs::read(dir.path().join("Libs/b.dcb")).unwrap(), payload);
    }

    #[test]
    fn test_transcoder_failure() {
        let mut payload = STRUCTURED_METADATA_MAGIC.to_vec();
        payload.extend_from_slice(b"node");
        let archive = archive(ArchiveBuilder::new().entry(FixtureEntry::stored("a.mtl", &payload)));
        let dir = tempfile::tempdir().unwrap();

        let err = archive
            .extract(
                archive.get("a.mtl").unwrap(),
                dir.path(),
                &ExtractOptions::new().transcoder(Arc::new(Failing)),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transcode);
    }

    #[test]
    fn test_unsafe_names_rejected() {
        let archive = archive(
            ArchiveBuilder::new()
                .entry(FixtureEntry::stored("../escape.txt", b"x"))
                .entry(FixtureEntry::stored("/abs.txt", b"x")),
        );
        let dir = tempfile::tempdir().unwrap();

        for entry in archive.entries() {
            let err = archive.extract(entry, dir.path(), &ExtractOptions::new()).unwrap_err();
            assert!(matches!(err, Error::UnsafePath(_)));
        }
    }

    #[test]
    fn test_no_overwrite() {
        let archive = archive(ArchiveBuilder::new().entry(FixtureEntry::stored("a.txt", b"new")));
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"old").unwrap();

        let file = archive
            .extract(
                archive.get("a.txt").unwrap(),
                dir.path(),
                &ExtractOptions::new().overwrite(false),
            )
            .unwrap();
        assert!(file.skipped);
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"old");
    }

    #[test]
    fn test_failed_stream_leaves_no_file() {
        let data = ArchiveBuilder::new()
            .key([7u8; 16])
            .entry(FixtureEntry::zstd("Data/secret.bin", &[0x42; 4096]).encrypted())
            .build();
        let archive = Archive::from_bytes("t.p4k", data, ArchiveOptions::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let entry = archive.get("Data/secret.bin").unwrap();
        assert!(archive.extract(entry, dir.path(), &ExtractOptions::new()).is_err());
        assert!(!dir.path().join("Data/secret.bin").exists());
    }

    #[test]
    fn test_case_sensitive_filters() {
        let archive = archive(
            ArchiveBuilder::new()
                .entry(FixtureEntry::stored("Data/Foo.xml", b"1"))
                .entry(FixtureEntry::stored("data/bar.xml", b"2")),
        );
        let dir = tempfile::tempdir().unwrap();

        let summary = archive
            .extract_all(
                &["data/*"],
                SearchMode::Pattern,
                dir.path(),
                &ExtractOptions::new().case_insensitive(false),
            )
            .unwrap();
        assert_eq!(summary.file_count(), 1);
        assert!(dir.path().join("data/bar.xml").exists());
        assert!(!dir.path().join("Data/Foo.xml").exists());

        let summary = archive
            .extract_all(&["data/*"], SearchMode::Pattern, dir.path(), &ExtractOptions::new())
            .unwrap();
        assert_eq!(summary.file_count(), 2);
    }

    #[test]
    fn test_enclosed_path() {
        assert_eq!(enclosed_path(r"a\b\..\c.txt"), Some(PathBuf::from("a/c.txt")));
        assert_eq!(enclosed_path("./a.txt"), Some(PathBuf::from("a.txt")));
        assert_eq!(enclosed_path("a/../../b"), None);
        assert_eq!(enclosed_path("a\0b"), None);
    }
}
