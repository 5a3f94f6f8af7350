use nom::{
    IResult, Parser,
    bytes::complete::tag,
    character::complete::{char, u32 as number},
    combinator::{opt, rest},
    sequence::preceded,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side(s) of the diff a line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Context,
    Addition,
    Deletion,
}

impl LineKind {
    /// The unified-diff prefix character for this kind
    pub fn marker(self) -> char {
        match self {
            LineKind::Context => ' ',
            LineKind::Addition => '+',
            LineKind::Deletion => '-',
        }
    }
}

/// A single line inside a hunk.
///
/// Additions carry only a new line number, deletions only an old one,
/// context lines both. Use the constructors to keep that invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLine {
    pub kind: LineKind,
    /// Line content without the leading marker
    pub text: String,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
    /// Followed by `\ No newline at end of file`
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub missing_newline: bool,
}

impl DiffLine {
    pub fn context(text: impl Into<String>, old_line: u32, new_line: u32) -> Self {
        Self {
            kind: LineKind::Context,
            text: text.into(),
            old_line: Some(old_line),
            new_line: Some(new_line),
            missing_newline: false,
        }
    }

    pub fn addition(text: impl Into<String>, new_line: u32) -> Self {
        Self {
            kind: LineKind::Addition,
            text: text.into(),
            old_line: None,
            new_line: Some(new_line),
            missing_newline: false,
        }
    }

    pub fn deletion(text: impl Into<String>, old_line: u32) -> Self {
        Self {
            kind: LineKind::Deletion,
            text: text.into(),
            old_line: Some(old_line),
            new_line: None,
            missing_newline: false,
        }
    }
}

/// The numeric part of a `@@ -a,b +c,d @@ section` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader<'a> {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub section: &'a str,
}

impl<'a> HunkHeader<'a> {
    /// Parse a hunk header line, returning `None` if it is not one.
    ///
    /// Omitted counts (`@@ -3 +3 @@`) default to 1.
    pub fn parse(line: &'a str) -> Option<Self> {
        header(line).ok().map(|(_, header)| header)
    }
}

/// `start[,count]`
fn range(input: &str) -> IResult<&str, (u32, u32)> {
    (number, opt(preceded(char(','), number)))
        .map(|(start, count)| (start, count.unwrap_or(1)))
        .parse(input)
}

fn header(input: &str) -> IResult<&str, HunkHeader<'_>> {
    (
        preceded(tag("@@ -"), range),
        preceded(tag(" +"), range),
        preceded(tag(" @@"), rest),
    )
        .map(
            |((old_start, old_count), (new_start, new_count), section)| HunkHeader {
                old_start,
                old_count,
                new_start,
                new_count,
                section: section.trim(),
            },
        )
        .parse(input)
}

/// A contiguous change region of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    /// Header line exactly as the diff tool printed it
    pub header: String,
    /// Function context after the closing `@@`, empty if none
    pub section: String,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// Start an empty hunk from its header line
    pub fn open(line: &str, header: HunkHeader<'_>) -> Self {
        Hunk {
            old_start: header.old_start,
            old_count: header.old_count,
            new_start: header.new_start,
            new_count: header.new_count,
            header: line.to_string(),
            section: header.section.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn additions(&self) -> usize {
        self.count(LineKind::Addition)
    }

    pub fn deletions(&self) -> usize {
        self.count(LineKind::Deletion)
    }

    fn count(&self, kind: LineKind) -> usize {
        self.lines.iter().filter(|line| line.kind == kind).count()
    }
}

/// Format one side of a hunk header the way git does: `N` for a single
/// line, `N,0` for none, `N,M` otherwise.
fn side(start: u32, count: usize) -> String {
    match count {
        1 => format!("{start}"),
        n => format!("{start},{n}"),
    }
}

impl fmt::Display for Hunk {
    /// Renders the hunk with its header counts recomputed from the lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let old_count = self.lines.iter().filter(|l| l.old_line.is_some()).count();
        let new_count = self.lines.iter().filter(|l| l.new_line.is_some()).count();

        write!(
            f,
            "@@ -{} +{} @@",
            side(self.old_start, old_count),
            side(self.new_start, new_count)
        )?;
        if self.section.is_empty() {
            writeln!(f)?;
        } else {
            writeln!(f, " {}", self.section)?;
        }

        for line in &self.lines {
            writeln!(f, "{}{}", line.kind.marker(), line.text)?;
            if line.missing_newline {
                writeln!(f, "\\ No newline at end of file")?;
            }
        }

        Ok(())
    }
}
