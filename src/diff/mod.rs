//! Unified diff parsing.
//!
//! [`parse`] turns the text git prints for `git diff` into [`FileDiff`]
//! values whose lines carry their old and new line numbers. Parsing never
//! fails: anything the scanner does not recognise is skipped.

pub mod file;
pub mod full;
pub mod hunk;
pub(crate) mod token;

pub use file::FileDiff;
pub use full::Diff;
pub use hunk::{DiffLine, Hunk, HunkHeader, LineKind};

/// Parse raw unified diff text into one [`FileDiff`] per file, in order.
///
/// ```
/// let files = branchdiff::diff::parse(
///     "diff --git a/x.txt b/x.txt\n--- a/x.txt\n+++ b/x.txt\n@@ -1,2 +1,2 @@\n-old\n+new\n context\n",
/// );
/// assert_eq!(files.len(), 1);
/// assert_eq!((files[0].additions, files[0].deletions), (1, 1));
/// ```
pub fn parse(text: &str) -> Vec<FileDiff> {
    Diff::parse(text).files
}
