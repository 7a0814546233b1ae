//! Path safety for everything that crosses the runner boundary.
//!
//! Archive entries and job arguments name files relative to the workspace
//! root. Anything that could point outside it is rejected before a single
//! byte is packed or written.

/// Why a path was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("path contains a NUL byte: {0:?}")]
    NulByte(String),

    #[error("absolute path not allowed: {0}")]
    Absolute(String),

    #[error("drive-letter path not allowed: {0}")]
    DriveLetter(String),

    #[error("path traversal not allowed: {0}")]
    Traversal(String),

    #[error("empty path segment in {0}")]
    EmptySegment(String),
}

/// Validate a workspace-relative path and return it with `/` separators.
///
/// Rejects empty paths, NUL bytes, absolute or home-relative prefixes
/// (`/`, `\`, `~`), drive letters (`C:`), empty segments and any `.` or `..`
/// segment.
pub fn validate_relative_path(path: &str) -> Result<String, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if path.contains('\0') {
        return Err(PathError::NulByte(path.to_string()));
    }
    if path.starts_with('/') || path.starts_with('\\') || path.starts_with('~') {
        return Err(PathError::Absolute(path.to_string()));
    }
    if has_drive_prefix(path) {
        return Err(PathError::DriveLetter(path.to_string()));
    }

    let mut segments = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" => return Err(PathError::EmptySegment(path.to_string())),
            "." | ".." => return Err(PathError::Traversal(path.to_string())),
            _ => segments.push(segment),
        }
    }
    Ok(segments.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
