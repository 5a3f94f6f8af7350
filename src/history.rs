use serde::{Deserialize, Serialize};

const RECORD_SEPARATOR: char = '\x1e';
const FIELD_SEPARATOR: char = '\x1f';

/// One commit from `git log`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub hash: String,
    pub author: String,
    /// Author date in strict ISO-8601, as git reports it
    pub date: String,
    pub subject: String,
    /// Paths touched by the commit
    pub files: Vec<String>,
}

/// Parse `git log --name-only` output written with the gateway's log format.
///
/// Each record opens with a record separator, followed by the unit-separated
/// header fields on one line and the touched file names on the lines after.
/// Records with fewer than four header fields are dropped.
pub(crate) fn parse_log(output: &str) -> Vec<CommitInfo> {
    output
        .split(RECORD_SEPARATOR)
        .filter_map(parse_record)
        .collect()
}

fn parse_record(record: &str) -> Option<CommitInfo> {
    let mut lines = record.lines();
    let header = lines.next()?;

    let mut fields = header.splitn(4, FIELD_SEPARATOR);
    let hash = fields.next()?.trim();
    let author = fields.next()?;
    let date = fields.next()?;
    let subject = fields.next()?;
    if hash.is_empty() {
        return None;
    }

    let files = lines
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    Some(CommitInfo {
        hash: hash.to_string(),
        author: author.to_string(),
        date: date.to_string(),
        subject: subject.to_string(),
        files,
    })
}
