//! Line-level tokens for unified diff text.
//!
//! A file block is scanned one line at a time. Before the first hunk header
//! the scanner is in [`Section::Header`] and recognises git's extended
//! header lines; after it, in [`Section::Body`], every line is hunk content
//! classified by its leading marker. The split matters because a deleted
//! line reading `-- foo` arrives as `--- foo`, which would otherwise look
//! like an old-file header.

use super::hunk::HunkHeader;

/// Where the scanner is inside a file block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// `diff --git a/X b/Y`, carrying the text after the marker
    FileStart(&'a str),
    /// `--- a/X` or `--- /dev/null`
    OldFile(&'a str),
    /// `+++ b/Y` or `+++ /dev/null`
    NewFile(&'a str),
    NewFileMode(&'a str),
    DeletedFileMode(&'a str),
    OldMode(&'a str),
    NewMode(&'a str),
    RenameFrom(&'a str),
    RenameTo(&'a str),
    /// `Binary files ... differ` or `GIT binary patch`
    Binary,
    HunkStart(HunkHeader<'a>),
    Addition(&'a str),
    Deletion(&'a str),
    Context(&'a str),
    /// `\ No newline at end of file`
    NoNewline,
    /// Anything else: `index` lines, similarity scores, binary payload
    Other,
}

impl<'a> Token<'a> {
    pub fn classify(line: &'a str, section: Section) -> Self {
        if line.starts_with("@@ ") {
            if let Some(header) = HunkHeader::parse(line) {
                return Token::HunkStart(header);
            }
        }

        match section {
            Section::Header => Self::header(line),
            Section::Body => Self::body(line),
        }
    }

    fn header(line: &'a str) -> Self {
        let prefixed: [(&str, fn(&'a str) -> Token<'a>); 9] = [
            ("diff --git ", Token::FileStart),
            ("--- ", Token::OldFile),
            ("+++ ", Token::NewFile),
            ("new file mode ", Token::NewFileMode),
            ("deleted file mode ", Token::DeletedFileMode),
            ("old mode ", Token::OldMode),
            ("new mode ", Token::NewMode),
            ("rename from ", Token::RenameFrom),
            ("rename to ", Token::RenameTo),
        ];

        for (prefix, token) in prefixed {
            if let Some(value) = line.strip_prefix(prefix) {
                return token(value);
            }
        }

        let binary_files = line.starts_with("Binary files ") && line.ends_with(" differ");
        if binary_files || line == "GIT binary patch" {
            return Token::Binary;
        }

        Token::Other
    }

    fn body(line: &'a str) -> Self {
        if line.starts_with('\\') {
            return Token::NoNewline;
        }
        if let Some(text) = line.strip_prefix('+') {
            return Token::Addition(text);
        }
        if let Some(text) = line.strip_prefix('-') {
            return Token::Deletion(text);
        }
        if let Some(text) = line.strip_prefix(' ') {
            return Token::Context(text);
        }
        // Some tools strip the trailing space of an empty context line
        if line.is_empty() {
            return Token::Context("");
        }
        Token::Other
    }
}
