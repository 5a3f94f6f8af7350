//! Answers "what changed" for the working tree, commits and branches.

use crate::branch::{BranchEntry, BranchResolution, BranchResolver};
use crate::diff::{self, FileDiff};
use crate::git::{DiffSpec, EMPTY_TREE, Git};
use crate::history::{CommitInfo, parse_log};
use crate::ChangeError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lines of context around each change unless a query says otherwise
pub const DEFAULT_CONTEXT_LINES: u32 = 3;

/// Working tree against the index, or the index against HEAD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingTreeQuery {
    pub staged: bool,
    pub context_lines: u32,
    pub paths: Vec<String>,
}

impl Default for WorkingTreeQuery {
    fn default() -> Self {
        Self {
            staged: false,
            context_lines: DEFAULT_CONTEXT_LINES,
            paths: Vec::new(),
        }
    }
}

/// How two branches are compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompareMode {
    /// What target introduced since it diverged from base (`base...target`)
    #[default]
    TripleDot,
    /// The two tips directly (`base..target`)
    DoubleDot,
}

impl CompareMode {
    pub fn range(self, base: &str, target: &str) -> String {
        match self {
            CompareMode::TripleDot => format!("{base}...{target}"),
            CompareMode::DoubleDot => format!("{base}..{target}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchDiffQuery {
    pub base: String,
    pub target: String,
    pub mode: CompareMode,
    pub context_lines: u32,
}

impl BranchDiffQuery {
    /// Compare two branches by name, merge-base relative
    pub fn new(base: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            target: target.into(),
            mode: CompareMode::default(),
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }

    pub fn with_mode(mut self, mode: CompareMode) -> Self {
        self.mode = mode;
        self
    }
}

/// What a branch diff actually compared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchComparison {
    pub base_resolved: String,
    pub target_resolved: String,
    pub mode: CompareMode,
    /// Local branches created while resolving base or target
    pub localized_branches: Vec<String>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDiff {
    pub files: Vec<FileDiff>,
    pub comparison: BranchComparison,
}

/// Audit trail of a branch switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchOutcome {
    pub previous_branch: String,
    pub current_branch: String,
    pub stash_created: bool,
    pub stash_message: Option<String>,
    pub localized_branch: Option<String>,
    pub messages: Vec<String>,
}

/// Entry point for diff and branch queries against one repository
#[derive(Debug, Clone)]
pub struct ChangeRetriever {
    git: Git,
}

impl ChangeRetriever {
    /// Wrap `repo_path` without checking it is a repository
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            git: Git::new(repo_path),
        }
    }

    /// Wrap `repo_path`, failing if it is not inside a git working tree
    pub fn open(repo_path: impl Into<PathBuf>) -> Result<Self, ChangeError> {
        let retriever = Self::new(repo_path);
        if !retriever.is_repo() {
            return Err(ChangeError::NotARepository {
                path: retriever.repo_path().display().to_string(),
            });
        }
        Ok(retriever)
    }

    pub fn repo_path(&self) -> &Path {
        self.git.repo_path()
    }

    pub fn is_repo(&self) -> bool {
        self.git.is_repo()
    }

    pub fn current_branch(&self) -> Result<String, ChangeError> {
        Ok(self.git.current_branch()?)
    }

    pub fn list_branches(&self) -> Result<Vec<BranchEntry>, ChangeError> {
        Ok(BranchResolver::new(&self.git).list()?)
    }

    /// Resolve a branch name, localizing a remote-only branch if needed
    pub fn resolve_branch(&self, name: &str) -> Result<BranchResolution, ChangeError> {
        let name = required("branch", name)?;
        Ok(BranchResolver::new(&self.git).resolve(name)?)
    }

    /// The most recent `limit` commits reachable from HEAD
    pub fn log(&self, limit: usize) -> Result<Vec<CommitInfo>, ChangeError> {
        Ok(parse_log(&self.git.log(limit)?))
    }

    /// Unstaged changes, or staged ones when `query.staged` is set
    pub fn working_tree_diff(
        &self,
        query: &WorkingTreeQuery,
    ) -> Result<Vec<FileDiff>, ChangeError> {
        let spec = DiffSpec {
            cached: query.staged,
            context_lines: query.context_lines,
            revisions: Vec::new(),
            paths: query.paths.clone(),
        };
        self.diff(&spec)
    }

    /// Changes made by `commit`, or between `commit` and `to` when given,
    /// with `context_lines` lines of context.
    ///
    /// A root commit is compared against the empty tree.
    pub fn commit_diff(
        &self,
        commit: &str,
        to: Option<&str>,
        context_lines: u32,
    ) -> Result<Vec<FileDiff>, ChangeError> {
        let commit = required("commit", commit)?;

        let revisions = match to {
            Some(to) => {
                let to = required("to", to)?;
                vec![format!("{commit}..{to}")]
            }
            None if self.git.has_parent(commit)? => vec![format!("{commit}^..{commit}")],
            None => {
                debug!("{commit} has no parent, diffing against the empty tree");
                vec![EMPTY_TREE.to_string(), commit.to_string()]
            }
        };

        self.diff(&DiffSpec {
            cached: false,
            context_lines,
            revisions,
            paths: Vec::new(),
        })
    }

    /// Diff two branches after resolving both names to local branches.
    ///
    /// Remote-only names are fetched and tracked locally first; the two
    /// resolutions run in parallel.
    pub fn branch_diff(&self, query: &BranchDiffQuery) -> Result<BranchDiff, ChangeError> {
        let base = required("base", &query.base)?;
        let target = required("target", &query.target)?;

        let resolver = BranchResolver::new(&self.git);
        let (base, target) = if base == target {
            let resolution = resolver.resolve(base)?;
            (resolution.clone(), resolution)
        } else {
            let (base, target) =
                rayon::join(|| resolver.resolve(base), || resolver.resolve(target));
            (base?, target?)
        };

        let files = self.diff(&DiffSpec {
            cached: false,
            context_lines: query.context_lines,
            revisions: vec![query.mode.range(
                &local_ref(&base.local_branch),
                &local_ref(&target.local_branch),
            )],
            paths: Vec::new(),
        })?;

        let resolutions = [&base, &target];
        let localized_branches = dedup(
            resolutions
                .iter()
                .filter(|r| r.localized)
                .map(|r| r.local_branch.clone()),
        );
        let messages = dedup(resolutions.iter().filter_map(|r| r.message.clone()));

        Ok(BranchDiff {
            files,
            comparison: BranchComparison {
                base_resolved: base.local_branch,
                target_resolved: target.local_branch,
                mode: query.mode,
                localized_branches,
                messages,
            },
        })
    }

    /// Check out `target`, resolving it first.
    ///
    /// With `auto_stash`, local changes (untracked files included) are
    /// stashed under a timestamped message before the checkout. If the
    /// checkout then fails, the stash is popped back before the error is
    /// returned.
    pub fn switch_branch(
        &self,
        target: &str,
        auto_stash: bool,
    ) -> Result<SwitchOutcome, ChangeError> {
        let target = required("branch", target)?;

        let previous_branch = self.git.current_branch()?;
        let resolution = BranchResolver::new(&self.git).resolve(target)?;
        let branch = resolution.local_branch.as_str();

        let mut messages: Vec<String> = resolution.message.iter().cloned().collect();

        let mut stash_message = None;
        if auto_stash && !self.git.is_clean()? {
            let label = format!(
                "branchdiff: auto-stash before switching to {branch} ({})",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f")
            );
            if self.git.stash_push(&label)?.is_some() {
                messages.push(format!("Stashed local changes as '{label}'"));
                stash_message = Some(label);
            }
        }

        if let Err(err) = self.git.checkout(branch) {
            if stash_message.is_some() {
                warn!("Checkout of {branch} failed, restoring stashed changes");
                if let Err(pop_err) = self.git.stash_pop() {
                    warn!("Stashed changes were left in the stash: {pop_err}");
                }
            }
            return Err(err.into());
        }
        messages.push(format!("Switched from '{previous_branch}' to '{branch}'"));

        Ok(SwitchOutcome {
            previous_branch,
            current_branch: self.git.current_branch()?,
            stash_created: stash_message.is_some(),
            stash_message,
            localized_branch: resolution.localized.then(|| branch.to_string()),
            messages,
        })
    }

    fn diff(&self, spec: &DiffSpec) -> Result<Vec<FileDiff>, ChangeError> {
        let raw = self.git.diff(spec)?;
        let files = diff::parse(&raw);
        debug!("Parsed {} file diffs", files.len());
        Ok(files)
    }
}

/// Reject empty identifiers before any git call, naming the field
fn required<'v>(field: &str, value: &'v str) -> Result<&'v str, ChangeError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ChangeError::InvalidArgument {
            field: field.to_string(),
        });
    }
    Ok(value)
}

/// Full ref of a local branch; short names lose to a tag of the same name
fn local_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

/// Drop repeats, keeping first occurrences in order
fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
