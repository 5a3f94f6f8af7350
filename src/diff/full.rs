use super::file::FileDiff;
use serde::{Deserialize, Serialize};

/// A complete git diff containing changes for multiple files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub files: Vec<FileDiff>,
}

impl Diff {
    /// Parse a complete git diff output into file diffs.
    ///
    /// Every line starting with `diff --git ` opens a new file block; text
    /// before the first one (commit headers, stat summaries) is ignored.
    pub fn parse(text: &str) -> Self {
        let mut starts = Vec::new();
        let mut offset = 0;

        for line in text.split_inclusive('\n') {
            if line.starts_with("diff --git ") {
                starts.push(offset);
            }
            offset += line.len();
        }

        let files = starts
            .iter()
            .enumerate()
            .filter_map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(text.len());
                FileDiff::parse(&text[start..end])
            })
            .collect();

        Diff { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total added lines across all files
    pub fn additions(&self) -> usize {
        self.files.iter().map(|f| f.additions).sum()
    }

    /// Total deleted lines across all files
    pub fn deletions(&self) -> usize {
        self.files.iter().map(|f| f.deletions).sum()
    }

    /// Look a file up by its old or new path
    pub fn file(&self, path: &str) -> Option<&FileDiff> {
        self.files
            .iter()
            .find(|f| f.new_path == path || f.old_path == path)
    }
}

impl From<Vec<FileDiff>> for Diff {
    fn from(files: Vec<FileDiff>) -> Self {
        Diff { files }
    }
}

impl IntoIterator for Diff {
    type Item = FileDiff;
    type IntoIter = std::vec::IntoIter<FileDiff>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl std::fmt::Display for Diff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for file_diff in &self.files {
            write!(f, "{}", file_diff)?;
        }
        Ok(())
    }
}
