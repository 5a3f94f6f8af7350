use super::hunk::{DiffLine, Hunk, LineKind};
use super::token::{Section, Token};
use serde::{Deserialize, Serialize};
use std::fmt;

const DEV_NULL: &str = "/dev/null";

/// A complete diff for a single file.
///
/// Paths are stored without git's `a/` and `b/` prefixes. `additions` and
/// `deletions` are counted from the parsed lines, never from hunk headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    pub old_path: String,
    pub new_path: String,
    pub is_binary: bool,
    pub is_new: bool,
    pub is_deleted: bool,
    pub is_renamed: bool,
    pub old_mode: Option<String>,
    pub new_mode: Option<String>,
    pub additions: usize,
    pub deletions: usize,
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    /// Parse a single-file block starting at its `diff --git` line.
    ///
    /// Returns `None` only when no path can be recovered from the block.
    /// Lines that do not fit the expected shape are skipped, so truncated
    /// or unusual input still yields whatever could be read.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut old_path = None;
        let mut new_path = None;
        let mut old_mode = None;
        let mut new_mode = None;
        let mut is_binary = false;
        let mut is_new = false;
        let mut is_deleted = false;
        let mut rename_marker = false;
        let mut hunks: Vec<Hunk> = Vec::new();

        let mut section = Section::Header;
        let mut old_line = 0u32;
        let mut new_line = 0u32;
        // Lines the current hunk header still promises on each side
        let mut old_left = 0u32;
        let mut new_left = 0u32;

        for line in text.lines() {
            match Token::classify(line, section) {
                Token::FileStart(paths) => {
                    if let Some((old, new)) = split_header_paths(paths) {
                        old_path = Some(old);
                        new_path = Some(new);
                    }
                }
                Token::OldFile(path) => {
                    if let Some(path) = side_path(path, "a/") {
                        old_path = Some(path);
                    }
                }
                Token::NewFile(path) => {
                    if let Some(path) = side_path(path, "b/") {
                        new_path = Some(path);
                    }
                }
                Token::NewFileMode(mode) => {
                    is_new = true;
                    new_mode = Some(mode.to_string());
                }
                Token::DeletedFileMode(mode) => {
                    is_deleted = true;
                    old_mode = Some(mode.to_string());
                }
                Token::OldMode(mode) => old_mode = Some(mode.to_string()),
                Token::NewMode(mode) => new_mode = Some(mode.to_string()),
                Token::RenameFrom(path) => {
                    rename_marker = true;
                    old_path = Some(unquote(path));
                }
                Token::RenameTo(path) => {
                    rename_marker = true;
                    new_path = Some(unquote(path));
                }
                Token::Binary => is_binary = true,
                Token::HunkStart(header) => {
                    section = Section::Body;
                    old_line = header.old_start;
                    new_line = header.new_start;
                    old_left = header.old_count;
                    new_left = header.new_count;
                    hunks.push(Hunk::open(line, header));
                }
                Token::Addition(text) => {
                    if let Some(hunk) = hunks.last_mut() {
                        hunk.lines.push(DiffLine::addition(text, new_line));
                        new_line = new_line.saturating_add(1);
                        new_left = new_left.saturating_sub(1);
                    }
                }
                Token::Deletion(text) => {
                    if let Some(hunk) = hunks.last_mut() {
                        hunk.lines.push(DiffLine::deletion(text, old_line));
                        old_line = old_line.saturating_add(1);
                        old_left = old_left.saturating_sub(1);
                    }
                }
                // A bare empty line only counts as context while the hunk
                // still expects lines; after that it is trailing blank space
                Token::Context(_) if line.is_empty() && (old_left == 0 || new_left == 0) => {}
                Token::Context(text) => {
                    if let Some(hunk) = hunks.last_mut() {
                        hunk.lines.push(DiffLine::context(text, old_line, new_line));
                        old_line = old_line.saturating_add(1);
                        new_line = new_line.saturating_add(1);
                        old_left = old_left.saturating_sub(1);
                        new_left = new_left.saturating_sub(1);
                    }
                }
                Token::NoNewline => {
                    if let Some(last) = hunks.last_mut().and_then(|h| h.lines.last_mut()) {
                        last.missing_newline = true;
                    }
                }
                Token::Other => {}
            }
        }

        let (old_path, new_path) = match (old_path, new_path) {
            (Some(old), Some(new)) => (old, new),
            (Some(path), None) | (None, Some(path)) => (path.clone(), path),
            (None, None) => return None,
        };

        if is_binary {
            hunks.clear();
        }

        let count = |kind: LineKind| {
            hunks
                .iter()
                .flat_map(|hunk| &hunk.lines)
                .filter(|line| line.kind == kind)
                .count()
        };

        Some(FileDiff {
            is_renamed: rename_marker || old_path != new_path,
            additions: count(LineKind::Addition),
            deletions: count(LineKind::Deletion),
            old_path,
            new_path,
            is_binary,
            is_new,
            is_deleted,
            old_mode,
            new_mode,
            hunks,
        })
    }

    /// The path a reader would call this file by: the new path, or the old
    /// one when the file was deleted.
    pub fn display_path(&self) -> &str {
        if self.is_deleted {
            &self.old_path
        } else {
            &self.new_path
        }
    }
}

/// Split the `a/X b/Y` part of a `diff --git` line.
///
/// The header is ambiguous when paths contain ` b/`, so an unchanged path
/// (`a/P b/P`) is detected by splitting the text in half first.
fn split_header_paths(paths: &str) -> Option<(String, String)> {
    if paths.starts_with('"') {
        let (old, rest) = take_quoted(paths)?;
        let rest = rest.trim_start();
        let new = if rest.starts_with('"') {
            take_quoted(rest)?.0
        } else {
            rest.to_string()
        };
        return Some((strip_side(&old, "a/"), strip_side(&new, "b/")));
    }

    let middle = paths.len() / 2;
    if paths.len() % 2 == 1 && paths.as_bytes().get(middle) == Some(&b' ') {
        let (old, new) = (&paths[..middle], &paths[middle + 1..]);
        if let (Some(old), Some(new)) = (old.strip_prefix("a/"), new.strip_prefix("b/")) {
            if old == new {
                return Some((old.to_string(), new.to_string()));
            }
        }
    }

    let split = paths.find(" b/")?;
    Some((
        strip_side(&paths[..split], "a/"),
        strip_side(&paths[split + 1..], "b/"),
    ))
}

fn strip_side(path: &str, prefix: &str) -> String {
    path.strip_prefix(prefix).unwrap_or(path).to_string()
}

/// Path from a `---`/`+++` line; `None` for `/dev/null`.
fn side_path(raw: &str, prefix: &str) -> Option<String> {
    // Non-git tools may append a tab and a timestamp
    let raw = raw.split('\t').next().unwrap_or(raw);
    let path = unquote(raw);
    if path == DEV_NULL {
        return None;
    }
    Some(strip_side(&path, prefix))
}

/// Undo git's C-style quoting of unusual paths. Unquoted input is returned
/// unchanged.
fn unquote(raw: &str) -> String {
    match take_quoted(raw) {
        Some((path, rest)) if rest.is_empty() => path,
        _ => raw.to_string(),
    }
}

/// Read one double-quoted token from the start of `raw`, returning it
/// unescaped along with the remaining text.
fn take_quoted(raw: &str) -> Option<(String, &str)> {
    let body = raw.strip_prefix('"')?;
    let mut bytes = Vec::new();
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                let path = String::from_utf8_lossy(&bytes).into_owned();
                return Some((path, &body[i + 1..]));
            }
            '\\' => {
                let (_, escaped) = chars.next()?;
                match escaped {
                    'n' => bytes.push(b'\n'),
                    't' => bytes.push(b'\t'),
                    'r' => bytes.push(b'\r'),
                    'a' => bytes.push(0x07),
                    'b' => bytes.push(0x08),
                    'f' => bytes.push(0x0c),
                    'v' => bytes.push(0x0b),
                    '0'..='7' => {
                        // Three octal digits encode one raw byte
                        let mut value = escaped.to_digit(8)?;
                        for _ in 0..2 {
                            let (_, digit) = chars.next()?;
                            value = value * 8 + digit.to_digit(8)?;
                        }
                        bytes.push(u8::try_from(value).ok()?);
                    }
                    other => {
                        let mut buf = [0; 4];
                        bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                    }
                }
            }
            c => {
                let mut buf = [0; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    None
}

impl fmt::Display for FileDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "diff --git a/{} b/{}", self.old_path, self.new_path)?;

        if self.is_new {
            writeln!(
                f,
                "new file mode {}",
                self.new_mode.as_deref().unwrap_or("100644")
            )?;
        } else if self.is_deleted {
            writeln!(
                f,
                "deleted file mode {}",
                self.old_mode.as_deref().unwrap_or("100644")
            )?;
        } else if let (Some(old), Some(new)) = (&self.old_mode, &self.new_mode) {
            writeln!(f, "old mode {old}")?;
            writeln!(f, "new mode {new}")?;
        }

        if self.is_renamed {
            writeln!(f, "rename from {}", self.old_path)?;
            writeln!(f, "rename to {}", self.new_path)?;
        }

        let old_side = if self.is_new {
            DEV_NULL.to_string()
        } else {
            format!("a/{}", self.old_path)
        };
        let new_side = if self.is_deleted {
            DEV_NULL.to_string()
        } else {
            format!("b/{}", self.new_path)
        };

        if self.is_binary {
            return writeln!(f, "Binary files {old_side} and {new_side} differ");
        }

        if !self.hunks.is_empty() {
            writeln!(f, "--- {old_side}")?;
            writeln!(f, "+++ {new_side}")?;
            for hunk in &self.hunks {
                write!(f, "{hunk}")?;
            }
        }

        Ok(())
    }
}
