//! Local file header validation.

use pakfs_common::{cp437, BinaryReader};
use tracing::debug;

use crate::entry::Entry;
use crate::options::HeaderValidation;
use crate::source::ByteSource;
use crate::zip::{flags, LocalFileHeader};
use crate::{Error, Result};

/// Check the local header of `entry` and return the offset of its payload.
///
/// The header must carry the standard or the variant magic. Entries flagged
/// as compressed patched data or strongly encrypted are rejected. In
/// [`HeaderValidation::Strict`] mode the header must repeat the directory
/// file name.
pub(crate) fn validate_local_header(
    source: &dyn ByteSource,
    entry: &Entry,
    validation: HeaderValidation,
) -> Result<u64> {
    let offset = entry.local_header_offset;
    let truncated = |_| Error::TruncatedHeader(entry.name.clone());

    let fixed = source
        .read_vec_at(offset, LocalFileHeader::SIZE)
        .map_err(truncated)?;
    let mut reader = BinaryReader::new(&fixed);

    let sig = reader.read_u32()?;
    if sig != LocalFileHeader::SIGNATURE && sig != LocalFileHeader::SIGNATURE_EXTENDED {
        return Err(Error::InvalidSignature {
            expected: LocalFileHeader::SIGNATURE,
            actual: sig,
        });
    }
    let header: LocalFileHeader = reader.read_struct()?;

    let name_offset = offset + LocalFileHeader::SIZE as u64;
    let name_bytes = source
        .read_vec_at(name_offset, header.file_name_length as usize)
        .map_err(truncated)?;

    if entry.flags & flags::PATCHED_DATA != 0 {
        return Err(Error::UnsupportedFeature("compressed patched data (flag bit 5)"));
    }
    if entry.flags & flags::STRONG_ENCRYPTION != 0 {
        return Err(Error::UnsupportedFeature("strong encryption (flag bit 6)"));
    }

    let header_name = cp437::decode_name(&name_bytes, entry.flags & flags::UTF8_NAME != 0)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&name_bytes).into_owned());

    if header_name != entry.name {
        match validation {
            HeaderValidation::Strict => {
                return Err(Error::FileNameMismatch {
                    directory: entry.name.clone(),
                    header: header_name,
                });
            }
            HeaderValidation::Lenient => {
                debug!(
                    directory = %entry.name,
                    header = %header_name,
                    "local header name differs from directory"
                );
            }
        }
    }

    Ok(name_offset + header.variable_data_size() as u64)
}
