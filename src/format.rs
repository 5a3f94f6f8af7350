//! Rendering parsed diffs for people and programs.

use crate::diff::{FileDiff, LineKind};
use error_set::error_set;
use std::fmt::Write;

error_set! {
    /// Errors from rendering a diff
    FormatError := {
        #[display("Failed to serialize diff: {message}")]
        Serialize { message: String },
    }
}

/// Output shape for a list of file diffs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Unified diff text, re-parseable
    #[default]
    Plain,
    /// One row per changed line with explicit line numbers
    Report,
    /// Pretty-printed JSON document
    Json,
}

impl Format {
    pub fn render(self, files: &[FileDiff]) -> Result<String, FormatError> {
        match self {
            Format::Plain => Ok(plain(files)),
            Format::Report => Ok(report(files)),
            Format::Json => json(files),
        }
    }
}

/// Unified diff text for all files
pub fn plain(files: &[FileDiff]) -> String {
    files.iter().map(ToString::to_string).collect()
}

/// Format diffs for display with explicit line numbers.
///
/// Example output:
/// ```text
/// src/lib.rs [+1 -1]:
///   -10:	let x = 1;
///   +10:	let x = 2;
///    11:	x
/// ```
///
/// Deletions show the old line number, additions and context the new one.
/// Hunks of the same file are separated by a blank line, as are files.
pub fn report(files: &[FileDiff]) -> String {
    let mut out = String::new();

    for (i, file) in files.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }

        out.push_str(file.display_path());
        if file.is_renamed {
            let _ = write!(out, " (renamed from {})", file.old_path);
        }
        if file.is_new {
            out.push_str(" (new)");
        }
        if file.is_deleted {
            out.push_str(" (deleted)");
        }
        if file.is_binary {
            out.push_str(" (binary)");
        }
        let _ = writeln!(out, " [+{} -{}]:", file.additions, file.deletions);

        for (j, hunk) in file.hunks.iter().enumerate() {
            if j > 0 {
                out.push('\n');
            }
            for line in &hunk.lines {
                let _ = match (line.kind, line.old_line, line.new_line) {
                    (LineKind::Deletion, Some(old), _) => writeln!(out, "  -{old}:\t{}", line.text),
                    (LineKind::Addition, _, Some(new)) => writeln!(out, "  +{new}:\t{}", line.text),
                    (_, _, Some(new)) => writeln!(out, "   {new}:\t{}", line.text),
                    _ => writeln!(out, "    :\t{}", line.text),
                };
            }
        }
    }

    out
}

/// JSON array of file diffs
pub fn json(files: &[FileDiff]) -> Result<String, FormatError> {
    serde_json::to_string_pretty(files).map_err(|e| FormatError::Serialize {
        message: e.to_string(),
    })
}
