//! Checksummed binary table files.
//!
//! Each store is persisted as one table: a 4-byte little-endian header
//! length, a bincode header carrying magic bytes, format version, toolchain
//! version and payload checksum, then the bincode payload. Reads validate
//! every header field and report exactly what was wrong.

use std::path::Path;

use ripple_common::ContentHash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Magic bytes identifying a ripple table file.
const TABLE_MAGIC: [u8; 4] = *b"RPLT";

/// Current table format version. Increment on breaking changes to the header
/// or to the layout of any persisted store.
pub const TABLE_FORMAT_VERSION: u32 = 1;

/// Header prepended to every table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableHeader {
    /// Magic bytes: must be `b"RPLT"`.
    pub magic: [u8; 4],
    /// Table format version.
    pub format_version: u32,
    /// Toolchain version that wrote the table.
    pub toolchain_version: String,
    /// Content hash of the payload.
    pub checksum: ContentHash,
}

fn serialization_error(e: impl std::fmt::Display) -> CacheError {
    CacheError::Serialization {
        reason: e.to_string(),
    }
}

/// Encodes `value` as a complete table image.
pub fn encode_table<T: Serialize>(value: &T, toolchain_version: &str) -> Result<Vec<u8>, CacheError> {
    let config = bincode::config::standard();
    let payload = bincode::serde::encode_to_vec(value, config).map_err(serialization_error)?;

    let header = TableHeader {
        magic: TABLE_MAGIC,
        format_version: TABLE_FORMAT_VERSION,
        toolchain_version: toolchain_version.to_string(),
        checksum: ContentHash::from_bytes(&payload),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, config).map_err(serialization_error)?;

    let header_len = header_bytes.len() as u32;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(&payload);
    Ok(output)
}

/// Decodes a table image, validating its header against `toolchain_version`.
///
/// `path` is used only for error reporting.
pub fn decode_table<T: DeserializeOwned>(
    raw: &[u8],
    toolchain_version: &str,
    path: &Path,
) -> Result<T, CacheError> {
    let invalid = |reason: &str| CacheError::InvalidHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let len_bytes: [u8; 4] = raw
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| invalid("file too short for header length"))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_end = 4usize
        .checked_add(header_len)
        .filter(|end| *end <= raw.len())
        .ok_or_else(|| invalid("truncated header"))?;

    let config = bincode::config::standard();
    let (header, _): (TableHeader, usize) =
        bincode::serde::decode_from_slice(&raw[4..header_end], config)
            .map_err(|e| invalid(&format!("undecodable header: {e}")))?;

    if header.magic != TABLE_MAGIC {
        return Err(invalid("missing magic bytes"));
    }
    if header.format_version != TABLE_FORMAT_VERSION {
        return Err(CacheError::VersionMismatch {
            path: path.to_path_buf(),
            expected: TABLE_FORMAT_VERSION,
            actual: header.format_version,
        });
    }
    if header.toolchain_version != toolchain_version {
        return Err(CacheError::ToolchainMismatch {
            expected: toolchain_version.to_string(),
            actual: header.toolchain_version,
        });
    }

    let payload = &raw[header_end..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(CacheError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: header.checksum.to_string(),
            actual: actual.to_string(),
        });
    }

    let (value, _) = bincode::serde::decode_from_slice(payload, config).map_err(serialization_error)?;
    Ok(value)
}

/// Writes `value` as a table at `path`.
pub fn write_table<T: Serialize>(
    path: &Path,
    value: &T,
    toolchain_version: &str,
) -> Result<(), CacheError> {
    let bytes = encode_table(value, toolchain_version)?;
    std::fs::write(path, bytes).map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Reads and validates the table at `path`.
pub fn read_table<T: DeserializeOwned>(path: &Path, toolchain_version: &str) -> Result<T, CacheError> {
    let raw = std::fs::read(path).map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    decode_table(&raw, toolchain_version, path)
}

/// Writes `bytes` to `path` by writing a sibling temp file and renaming it.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    std::fs::write(&tmp, bytes).map_err(|e| CacheError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
