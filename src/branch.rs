//! Branch enumeration and remote-to-local resolution.

use crate::git::Git;
use crate::{GitError, ResolveError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const LOCAL_PREFIX: &str = "refs/heads/";
const REMOTE_PREFIX: &str = "refs/remotes/";

/// Remote preferred when several remotes carry a branch with the same name
const DEFAULT_REMOTE: &str = "origin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    Local,
    Remote,
}

/// A local or remote-tracking branch as seen by `git for-each-ref`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchEntry {
    /// Short name: `main`, `origin/release`
    pub name: String,
    pub full_ref: String,
    pub kind: BranchKind,
    pub is_current: bool,
    /// Remote the branch belongs to; `None` for local branches
    pub remote_name: Option<String>,
    /// Name the branch has (or would have) locally
    pub local_name: String,
    /// Remote branch with no local branch of the same name
    pub needs_localization: bool,
    pub commit_id: String,
}

/// How a user-supplied branch name was turned into a local branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchResolution {
    pub input: String,
    pub local_branch: String,
    /// The name matched a remote-tracking branch
    pub was_remote: bool,
    /// A local tracking branch was created by this call
    pub localized: bool,
    pub remote_ref: Option<String>,
    /// What was done, for remote matches only
    pub message: Option<String>,
}

impl BranchResolution {
    fn local(input: &str, branch: &str) -> Self {
        BranchResolution {
            input: input.to_string(),
            local_branch: branch.to_string(),
            was_remote: false,
            localized: false,
            remote_ref: None,
            message: None,
        }
    }
}

/// Resolves branch names against one repository.
///
/// Nothing is cached between calls: every call enumerates the refs afresh.
pub struct BranchResolver<'a> {
    git: &'a Git,
}

impl<'a> BranchResolver<'a> {
    pub fn new(git: &'a Git) -> Self {
        Self { git }
    }

    /// All local and remote-tracking branches, locals first
    pub fn list(&self) -> Result<Vec<BranchEntry>, GitError> {
        let remotes = self.git.remotes()?;
        let refs = self.git.for_each_ref()?;
        Ok(parse_refs(&refs, &remotes))
    }

    /// Resolve `input` to a local branch, creating a tracking branch when
    /// only a remote one exists.
    ///
    /// Calling this repeatedly with the same name converges: the first call
    /// may create the branch, later calls reuse it.
    pub fn resolve(&self, input: &str) -> Result<BranchResolution, ResolveError> {
        let entries = self.list()?;
        let entry = find_match(&entries, input).ok_or_else(|| ResolveError::BranchNotFound {
            input: input.to_string(),
        })?;

        match (entry.kind, entry.remote_name.as_deref()) {
            (BranchKind::Remote, Some(remote)) => self.localize(input, remote, entry),
            _ => {
                debug!("Resolved {input} to local branch {}", entry.name);
                Ok(BranchResolution::local(input, &entry.name))
            }
        }
    }

    fn localize(
        &self,
        input: &str,
        remote: &str,
        entry: &BranchEntry,
    ) -> Result<BranchResolution, ResolveError> {
        let branch = entry.local_name.as_str();
        let remote_ref = entry.name.as_str();

        self.git.fetch(remote, branch)?;

        let created = if self.git.branch_exists(branch)? {
            false
        } else {
            match self.git.create_tracking_branch(branch, &entry.full_ref) {
                Ok(()) => true,
                // Created by someone else between the probe and now
                Err(GitError::BranchExists { .. }) => false,
                Err(err) => return Err(err.into()),
            }
        };

        let message = if created {
            format!("Created local branch '{branch}' tracking '{remote_ref}'")
        } else {
            format!("Using existing local branch '{branch}' for '{remote_ref}'")
        };
        debug!("{message}");

        Ok(BranchResolution {
            input: input.to_string(),
            local_branch: branch.to_string(),
            was_remote: true,
            localized: created,
            remote_ref: Some(remote_ref.to_string()),
            message: Some(message),
        })
    }
}

/// Parse `for-each-ref` output in the gateway's tab-separated format.
///
/// Short names are taken from the full ref rather than `%(refname:short)`,
/// which git disambiguates to `heads/x` when a tag is also called `x`.
pub(crate) fn parse_refs(output: &str, remotes: &[String]) -> Vec<BranchEntry> {
    let mut remotes: Vec<&str> = remotes.iter().map(String::as_str).collect();
    // Longest first, so `team/fork` wins over `team`
    remotes.sort_by_key(|r| std::cmp::Reverse(r.len()));

    let mut seen = HashSet::new();
    let mut locals = Vec::new();
    let mut remote_entries = Vec::new();

    for line in output.lines() {
        let mut fields = line.split('\t');
        let (Some(full_ref), Some(_short), Some(commit_id)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let is_current = fields.next().is_some_and(|head| head.trim() == "*");

        if let Some(name) = full_ref.strip_prefix(LOCAL_PREFIX) {
            if !seen.insert(name.to_string()) {
                continue;
            }
            locals.push(BranchEntry {
                name: name.to_string(),
                full_ref: full_ref.to_string(),
                kind: BranchKind::Local,
                is_current,
                remote_name: None,
                local_name: name.to_string(),
                needs_localization: false,
                commit_id: commit_id.to_string(),
            });
        } else if let Some(name) = full_ref.strip_prefix(REMOTE_PREFIX) {
            // The symbolic default branch pointer, not a branch
            if name.ends_with("/HEAD") {
                continue;
            }
            let Some((remote, local_name)) = split_remote(name, &remotes) else {
                continue;
            };
            remote_entries.push(BranchEntry {
                name: name.to_string(),
                full_ref: full_ref.to_string(),
                kind: BranchKind::Remote,
                is_current,
                remote_name: Some(remote.to_string()),
                local_name: local_name.to_string(),
                needs_localization: false,
                commit_id: commit_id.to_string(),
            });
        }
    }

    for entry in &mut remote_entries {
        entry.needs_localization = !seen.contains(&entry.local_name);
    }

    locals.extend(remote_entries);
    locals
}

/// Split `origin/feature/x` into (`origin`, `feature/x`) using the longest
/// configured remote that prefixes it, else the first path segment.
fn split_remote<'n>(name: &'n str, remotes: &[&str]) -> Option<(&'n str, &'n str)> {
    for &remote in remotes {
        if let Some(rest) = name.strip_prefix(remote).and_then(|r| r.strip_prefix('/')) {
            if !rest.is_empty() {
                return Some((&name[..remote.len()], rest));
            }
        }
    }
    name.split_once('/')
        .filter(|(remote, rest)| !remote.is_empty() && !rest.is_empty())
}

/// Find the entry `input` names.
///
/// Priority: short name, full ref, the canonical `refs/heads/<input>` or
/// `refs/remotes/<input>` form, then a remote branch whose local name is
/// `input` (preferring `origin`). Earlier entries win within a step, so
/// local branches shadow remote ones.
pub(crate) fn find_match<'e>(entries: &'e [BranchEntry], input: &str) -> Option<&'e BranchEntry> {
    if input.is_empty() {
        return None;
    }

    let canonical_local = format!("{LOCAL_PREFIX}{input}");
    let canonical_remote = format!("{REMOTE_PREFIX}{input}");

    entries
        .iter()
        .find(|e| e.name == input)
        .or_else(|| entries.iter().find(|e| e.full_ref == input))
        .or_else(|| {
            entries
                .iter()
                .find(|e| e.full_ref == canonical_local || e.full_ref == canonical_remote)
        })
        .or_else(|| {
            let mut candidates = entries
                .iter()
                .filter(|e| e.kind == BranchKind::Remote && e.local_name == input);
            let first = candidates.next()?;
            Some(
                std::iter::once(first)
                    .chain(candidates)
                    .find(|e| e.remote_name.as_deref() == Some(DEFAULT_REMOTE))
                    .unwrap_or(first),
            )
        })
}
