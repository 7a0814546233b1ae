//! Zip packing of workspace files and validated unpacking of job output.
//!
//! The simulated file system holds text. Binary artifacts coming back from a
//! toolchain are stored with a [`BASE64_PREFIX`] and decoded again when the
//! workspace is packed, so bytes survive the round trip.

use std::io::{Cursor, Read, Write};

use base64::{engine::general_purpose, Engine as _};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::paths::{validate_relative_path, PathError};

/// Marks VFS content that holds base64-encoded bytes.
pub const BASE64_PREFIX: &str = "base64:";

/// Upper bound on the total uncompressed size of an unpacked archive.
pub const MAX_UNPACKED_BYTES: u64 = 64 * 1024 * 1024;

/// Errors from packing or unpacking.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("unsafe path {path:?}: {source}")]
    UnsafePath {
        path: String,
        #[source]
        source: PathError,
    },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive expands beyond {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("invalid base64 content in {0}")]
    Encoding(String),
}

impl ArchiveError {
    /// Whether this error is a path-safety violation.
    pub fn is_unsafe_path(&self) -> bool {
        matches!(self, ArchiveError::UnsafePath { .. })
    }
}

fn check(path: &str) -> Result<String, ArchiveError> {
    validate_relative_path(path).map_err(|source| ArchiveError::UnsafePath {
        path: path.to_string(),
        source,
    })
}

/// Bytes a VFS file stands for.
pub fn content_bytes(path: &str, content: &str) -> Result<Vec<u8>, ArchiveError> {
    match content.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| ArchiveError::Encoding(path.to_string())),
        None => Ok(content.as_bytes().to_vec()),
    }
}

/// VFS text for a byte buffer: UTF-8 as-is, anything else base64-prefixed.
pub fn text_content(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) if !text.starts_with(BASE64_PREFIX) => text,
        Ok(text) => format!("{}{}", BASE64_PREFIX, general_purpose::STANDARD.encode(text)),
        Err(e) => format!(
            "{}{}",
            BASE64_PREFIX,
            general_purpose::STANDARD.encode(e.into_bytes())
        ),
    }
}

/// Pack `(path, content)` pairs into a zip archive.
///
/// Every path is validated before the archive is started; one bad path
/// means no archive at all.
pub fn pack(files: &[(String, String)]) -> Result<Vec<u8>, ArchiveError> {
    let mut entries = Vec::with_capacity(files.len());
    for (path, content) in files {
        let name = check(path)?;
        let bytes = content_bytes(path, content)?;
        entries.push((name, bytes));
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer.start_file(name, options)?;
        writer.write_all(&bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Unpack an archive into `(path, content)` pairs.
///
/// All entry names are validated, and the declared sizes summed, before any
/// entry is read. Directory entries are skipped.
pub fn unpack(data: &[u8]) -> Result<Vec<(String, String)>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let mut names = Vec::with_capacity(archive.len());
    let mut total: u64 = 0;
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        let raw = entry.name().to_string();
        if entry.is_dir() {
            check(raw.trim_end_matches('/'))?;
            names.push(None);
            continue;
        }
        names.push(Some(check(&raw)?));
        total = total.saturating_add(entry.size());
        if total > MAX_UNPACKED_BYTES {
            return Err(ArchiveError::TooLarge {
                limit: MAX_UNPACKED_BYTES,
            });
        }
    }

    let mut files = Vec::new();
    for (i, name) in names.into_iter().enumerate() {
        let Some(name) = name else { continue };
        let entry = archive.by_index(i)?;
        let mut bytes = Vec::new();
        entry.take(MAX_UNPACKED_BYTES + 1).read_to_end(&mut bytes)?;
        if bytes.len() as u64 > MAX_UNPACKED_BYTES {
            return Err(ArchiveError::TooLarge {
                limit: MAX_UNPACKED_BYTES,
            });
        }
        files.push((name, text_content(bytes)));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_zip(names: &[&str]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for name in names {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(b"payload").unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_pack_then_unpack_preserves_files() {
        let files = vec![
            ("Anchor.toml".to_string(), "[provider]\n".to_string()),
            ("programs/demo/src/lib.rs".to_string(), "use anchor_lang::prelude::*;\n".to_string()),
            ("empty.txt".to_string(), String::new()),
        ];
        let packed = pack(&files).unwrap();
        assert_eq!(unpack(&packed).unwrap(), files);
    }

    #[test]
    fn test_binary_content_round_trips_through_prefix() {
        let elf = vec![0x7f, b'E', b'L', b'F', 0xff, 0x00, 0x02];
        let text = text_content(elf.clone());
        assert!(text.starts_with(BASE64_PREFIX));
        assert_eq!(content_bytes("a.so", &text).unwrap(), elf);

        let packed = pack(&[("target/deploy/a.so".to_string(), text.clone())]).unwrap();
        assert_eq!(unpack(&packed).unwrap(), vec![("target/deploy/a.so".to_string(), text)]);
    }

    #[test]
    fn test_pack_rejects_before_writing() {
        let files = vec![
            ("ok.txt".to_string(), "fine".to_string()),
            ("../outside.txt".to_string(), "nope".to_string()),
        ];
        let err = pack(&files).unwrap_err();
        assert!(err.is_unsafe_path());
    }

    #[test]
    fn test_unpack_rejects_whole_archive_on_one_bad_entry() {
        for bad in ["../evil.sh", "/etc/cron.d/x", "C:/Windows/x.dll", "a/./b"] {
            let data = raw_zip(&["good/one.txt", bad, "good/two.txt"]);
            let err = unpack(&data).unwrap_err();
            assert!(err.is_unsafe_path(), "{}: {}", bad, err);
        }
    }

    #[test]
    fn test_unpack_garbage_is_zip_error() {
        assert!(matches!(unpack(b"not a zip"), Err(ArchiveError::Zip(_))));
    }

    #[test]
    fn test_bad_base64_content() {
        let err = pack(&[("x.so".to_string(), "base64:!!!".to_string())]).unwrap_err();
        assert!(matches!(err, ArchiveError::Encoding(_)));
    }
}
