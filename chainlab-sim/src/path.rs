//! Path helpers shared by the VFS and the shell built-ins.
//!
//! The simulated home directory *is* the workspace root, so `~/x`, `/x` and
//! `x` (from the root) all name the same node.

/// Split a path into its non-empty segments.
///
/// Strips a leading `~/` (or a bare `~`), then any leading separators, then
/// drops empty segments produced by repeated or trailing slashes.
pub fn normalize(path: &str) -> Vec<String> {
    let trimmed = path.trim();
    let without_home = if trimmed == "~" {
        ""
    } else {
        trimmed.strip_prefix("~/").unwrap_or(trimmed)
    };

    without_home
        .trim_start_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join segments back into a root-relative path (no leading slash).
pub fn join(segments: &[String]) -> String {
    segments.join("/")
}

/// Resolve a user-typed path against the current working directory.
///
/// Paths starting with `/` or `~` are taken from the root. `.` is dropped and
/// `..` pops a segment; popping past the root stays at the root.
pub fn resolve(cwd: &str, input: &str) -> String {
    let trimmed = input.trim();
    let absolute = trimmed.starts_with('/') || trimmed.starts_with('~');

    let mut stack: Vec<String> = if absolute { Vec::new() } else { normalize(cwd) };

    for segment in normalize(trimmed) {
        match segment.as_str() {
            "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(segment),
        }
    }

    join(&stack)
}

/// Render a root-relative path the way the prompt shows it (`~` or `~/a/b`).
pub fn display(path: &str) -> String {
    if path.is_empty() {
        "~".to_string()
    } else {
        format!("~/{}", path)
    }
}

/// Split a normalized path into (parent, name). `None` for the root.
pub fn split_parent(path: &str) -> Option<(String, String)> {
    let mut segments = normalize(path);
    let name = segments.pop()?;
    Some((join(&segments), name))
}
