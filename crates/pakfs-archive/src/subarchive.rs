//! Nested container expansion.
//!
//! Entries whose compound extension marks a nested container are opened as
//! archives of their own and their entries are listed in the parent under
//! the container's path.

use std::sync::Arc;

use tracing::debug;

use crate::archive::Archive;
use crate::entry::{base_name, compound_extension, Entry, EntrySource};
use crate::header::validate_local_header;
use crate::source::{ByteSource, MemorySource, RangeSource};
use crate::zip::CompressionMethod;
use crate::Result;

impl Archive {
    /// Open every pending nested container and flatten its entries.
    ///
    /// Nested containers are not expanded recursively. A container that
    /// fails to open fails the whole call.
    pub(crate) fn expand_sub_archives(&mut self) -> Result<()> {
        let pending: Vec<(usize, String)> = self
            .sub_archives
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.archive.is_none())
            .map(|(index, slot)| (index, slot.name.clone()))
            .collect();

        for (index, sub) in self.open_pending(&pending)? {
            let outer = self.sub_archives[index].name.clone();
            let prefix = sub_archive_prefix(&outer);

            for inner in sub.entries() {
                let name = flattened_name(prefix, inner.name());
                self.insert(Entry::flattened(name, inner, Arc::downgrade(&sub)));
            }

            debug!(
                container = %outer,
                entries = sub.len(),
                "flattened sub-archive"
            );
            self.sub_archives[index].archive = Some(sub);
        }
        Ok(())
    }

    #[cfg(not(feature = "parallel"))]
    fn open_pending(&self, pending: &[(usize, String)]) -> Result<Vec<(usize, Arc<Archive>)>> {
        pending
            .iter()
            .map(|(index, name)| self.open_sub_archive(name).map(|sub| (*index, sub)))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn open_pending(&self, pending: &[(usize, String)]) -> Result<Vec<(usize, Arc<Archive>)>> {
        use rayon::prelude::*;

        pending
            .par_iter()
            .map(|(index, name)| self.open_sub_archive(name).map(|sub| (*index, sub)))
            .collect()
    }

    /// Open the nested container stored under `name`.
    ///
    /// Stored plain containers are read in place through a window on the
    /// parent source; anything else is decoded into memory first.
    fn open_sub_archive(&self, name: &str) -> Result<Arc<Archive>> {
        let entry = self.get_with_case(name, false)?;

        let in_place = matches!(entry.source(), EntrySource::Direct)
            && entry.compression_method() == Some(CompressionMethod::Store)
            && !entry.is_encrypted();

        let source: Arc<dyn ByteSource> = if in_place {
            let offset =
                validate_local_header(self.source.as_ref(), entry, self.options.validation)?;
            Arc::new(RangeSource::new(
                Arc::clone(&self.source),
                offset,
                entry.compressed_size(),
            ))
        } else {
            Arc::new(MemorySource::new(self.read(entry)?))
        };

        let archive = Archive::from_source(name.to_string(), source, self.options.for_sub_archive())?;
        Ok(Arc::new(archive))
    }
}

/// The container name without its compound extension.
fn sub_archive_prefix(name: &str) -> &str {
    match compound_extension(name) {
        Some(ext) => &name[..name.len() - ext.len() - 1],
        None => name,
    }
}

/// Path of a nested entry as listed in the parent archive.
///
/// The inner path is placed under `prefix`. When its first segment repeats
/// the container's own name it is dropped, so `foo.socpak` holding
/// `foo/bar.xml` lists as `foo/bar.xml` rather than `foo/foo/bar.xml`.
pub(crate) fn flattened_name(prefix: &str, inner: &str) -> String {
    let container = base_name(prefix);
    let rest = match inner.split_once('/') {
        Some((first, rest)) if first == container => rest,
        _ => inner,
    };
    format!("{prefix}/{rest}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ArchiveOptions;
    use crate::testutil::{ArchiveBuilder, FixtureEntry};
    use crate::Error;

    #[test]
    fn test_flattened_name() {
        assert_eq!(flattened_name("Data/foo", "foo/bar.xml"), "Data/foo/bar.xml");
        assert_eq!(flattened_name("Data/foo", "baz/bar.xml"), "Data/foo/baz/bar.xml");
        assert_eq!(flattened_name("foo", "bar.xml"), "foo/bar.xml");
        assert_eq!(flattened_name("Data/foo", "foo/"), "Data/foo/");
        assert_eq!(flattened_name("Data/foo", "sub/"), "Data/foo/sub/");
        // Only an exact repeat of the container name is dropped.
        assert_eq!(flattened_name("Data/foo", "Foo/bar.xml"), "Data/foo/Foo/bar.xml");
    }

    #[test]
    fn test_prefix() {
        assert_eq!(sub_archive_prefix("Data/ships/ship.socpak"), "Data/ships/ship");
        assert_eq!(sub_archive_prefix("Data/v1.2/ship.sub.pak"), "Data/v1.2/ship");
        assert_eq!(sub_archive_prefix("Data/plain"), "Data/plain");
    }

    fn nested() -> Vec<u8> {
        ArchiveBuilder::new()
            .entry(FixtureEntry::stored("ship/interior.xml", b"<inside/>"))
            .entry(FixtureEntry::zstd("extra/lights.json", b"{\"on\":true}"))
            // Other tooling writes local names that differ from the directory.
            .entry(FixtureEntry::stored("loose.txt", b"loose").local_name("LOOSE.TXT"))
            .build()
    }

    #[test]
    fn test_expand_stored_container() {
        let data = ArchiveBuilder::new()
            .entry(FixtureEntry::stored("Data/readme.txt", b"hi"))
            .entry(FixtureEntry::stored("Data/ships/ship.socpak", &nested()))
            .build();
        let archive = Archive::from_bytes("Data.p4k", data, ArchiveOptions::default()).unwrap();

        assert_eq!(
            archive.names().collect::<Vec<_>>(),
            [
                "Data/readme.txt",
                "Data/ships/ship.socpak",
                "Data/ships/ship/interior.xml",
                "Data/ships/ship/extra/lights.json",
                "Data/ships/ship/loose.txt",
            ]
        );

        let entry = archive.get("Data/ships/ship/interior.xml").unwrap();
        assert!(entry.is_flattened());
        assert_eq!(archive.read(entry).unwrap(), b"<inside/>");
        assert_eq!(
            archive.read_by_name("Data/ships/ship/extra/lights.json").unwrap(),
            b"{\"on\":true}"
        );
        assert_eq!(archive.read_by_name("Data/ships/ship/loose.txt").unwrap(), b"loose");

        let subs: Vec<_> = archive.sub_archives().collect();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].0, "Data/ships/ship.socpak");
        assert_eq!(subs[0].1.map(|a| a.len()), Some(3));
    }

    #[test]
    fn test_expand_compressed_encrypted_container() {
        let data = ArchiveBuilder::new()
            .entry(FixtureEntry::zstd("Objects/crate.PAK", &nested()).encrypted())
            .build();
        let archive = Archive::from_bytes("Data.p4k", data, ArchiveOptions::default()).unwrap();

        assert_eq!(
            archive.read_by_name("Objects/crate/ship/interior.xml").unwrap(),
            b"<inside/>"
        );
    }

    #[test]
    fn test_many_containers_keep_listing_order() {
        let mut builder = ArchiveBuilder::new();
        for i in 0..16 {
            let inner = ArchiveBuilder::new()
                .entry(FixtureEntry::deflate("part.txt", format!("part {i}").as_bytes()))
                .build();
            builder = builder.entry(FixtureEntry::stored(&format!("Ships/s{i:02}.socpak"), &inner));
        }
        let archive = Archive::from_bytes("Data.p4k", builder.build(), ArchiveOptions::default()).unwrap();

        let containers: Vec<_> = archive.sub_archives().map(|(name, _)| name).collect();
        assert_eq!(containers.len(), 16);
        assert_eq!(containers[0], "Ships/s00.socpak");
        assert_eq!(containers[15], "Ships/s15.socpak");
        assert!(archive.sub_archives().all(|(_, sub)| sub.is_some()));

        let names: Vec<_> = archive.names().skip(16).collect();
        assert_eq!(names[0], "Ships/s00/part.txt");
        assert_eq!(names[15], "Ships/s15/part.txt");
        assert_eq!(archive.read_by_name("Ships/s07/part.txt").unwrap(), b"part 7");
    }

    #[test]
    fn test_expansion_disabled() {
        let data = ArchiveBuilder::new()
            .entry(FixtureEntry::stored("a.socpak", &nested()))
            .build();
        let archive =
            Archive::from_bytes("t", data, ArchiveOptions::new().expand_sub_archives(false)).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.sub_archives().count(), 0);
    }

    #[test]
    fn test_unrecognised_extension_not_expanded() {
        let data = ArchiveBuilder::new()
            .entry(FixtureEntry::stored("a.zip", &nested()))
            .build();
        let archive = Archive::from_bytes("t", data, ArchiveOptions::default()).unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn test_broken_container_fails_open() {
        let data = ArchiveBuilder::new()
            .entry(FixtureEntry::stored("bad.socpak", b"not an archive at all"))
            .build();
        let err = Archive::from_bytes("t", data, ArchiveOptions::default()).unwrap_err();
        assert!(matches!(err, Error::EocdNotFound));
    }

    #[test]
    fn test_entry_outlives_parent() {
        let data = ArchiveBuilder::new()
            .entry(FixtureEntry::stored("a.socpak", &nested()))
            .build();
        let archive = Archive::from_bytes("t", data, ArchiveOptions::default()).unwrap();
        let entry = archive.get("a/loose.txt").unwrap().clone();
        drop(archive);

        let holder = Archive::from_bytes(
            "other",
            ArchiveBuilder::new().entry(FixtureEntry::stored("x", b"x")).build(),
            ArchiveOptions::default(),
        )
        .unwrap();
        let err = holder.open_entry(&entry).unwrap_err();
        assert!(matches!(err, Error::SubArchiveClosed(_)));
    }
}
