//! Thin wrapper around the `git` binary.
//!
//! Every method maps to one (occasionally two) git invocations in the
//! repository given at construction. Output is returned raw; parsing is the
//! caller's job. A non-zero exit always becomes an error carrying git's
//! stderr, so "nothing changed" and "git failed" are never confused.

use crate::GitError;
use log::{debug, info, trace};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Object id of the empty tree, for diffing a root commit
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Ref listing format: full ref, short name, object id, `*` if checked out
const REF_FORMAT: &str = "--format=%(refname)%09%(refname:short)%09%(objectname)%09%(HEAD)";

/// Per-commit log format; records start with RS, fields are split by US
const LOG_FORMAT: &str = "--format=%x1e%H%x1f%an%x1f%aI%x1f%s";

/// What to pass to `git diff`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSpec {
    /// Compare the index with HEAD instead of the working tree with the index
    pub cached: bool,
    pub context_lines: u32,
    /// Revisions or a single range expression (`a..b`, `a...b`)
    pub revisions: Vec<String>,
    /// Limit the diff to these paths
    pub paths: Vec<String>,
}

/// Handle on one repository's working tree
#[derive(Debug, Clone)]
pub struct Git {
    repo_path: PathBuf,
}

impl Git {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Run `git diff` and return the raw unified diff text.
    ///
    /// Prefixes, colour and external drivers are pinned so the output is
    /// parseable whatever the user's git config says.
    pub fn diff(&self, spec: &DiffSpec) -> Result<String, GitError> {
        let mut args = vec![
            "diff".to_string(),
            "--no-color".to_string(),
            "--no-ext-diff".to_string(),
            "--find-renames".to_string(),
            "--src-prefix=a/".to_string(),
            "--dst-prefix=b/".to_string(),
            format!("-U{}", spec.context_lines),
        ];
        if spec.cached {
            args.push("--cached".to_string());
        }
        args.extend(spec.revisions.iter().cloned());
        args.push("--".to_string());
        args.extend(spec.paths.iter().cloned());

        let output = self.checked(&as_strs(&args))?;
        // File content is not guaranteed to be UTF-8; keep what we can
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Raw `git log` output for the most recent `limit` commits, with the
    /// names of the files each one touched.
    pub fn log(&self, limit: usize) -> Result<String, GitError> {
        let max_count = format!("--max-count={limit}");
        let output = self.checked(&["log", &max_count, "--name-only", LOG_FORMAT])?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Tab-separated listing of all local and remote-tracking branches
    pub fn for_each_ref(&self) -> Result<String, GitError> {
        self.run(&["for-each-ref", REF_FORMAT, "refs/heads", "refs/remotes"])
    }

    /// Names of the configured remotes
    pub fn remotes(&self) -> Result<Vec<String>, GitError> {
        Ok(self
            .run(&["remote"])?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Fetch `branch` from `remote`, updating its remote-tracking ref.
    ///
    /// The branch is named by its full ref so a remote tag of the same
    /// name is never fetched in its place.
    pub fn fetch(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        info!("Fetching {branch} from {remote}");
        let refspec = format!("refs/heads/{branch}");
        self.run(&["fetch", remote, &refspec]).map(drop)
    }

    /// Create `local` tracking `upstream` (e.g. `refs/remotes/origin/release`).
    ///
    /// Fails with [`GitError::BranchExists`] when the branch could not be
    /// created because `refs/heads/<local>` is already present.
    pub fn create_tracking_branch(&self, local: &str, upstream: &str) -> Result<(), GitError> {
        info!("Creating branch {local} tracking {upstream}");
        match self.run(&["branch", "--track", local, upstream]) {
            Ok(_) => Ok(()),
            Err(err) => {
                if self.branch_exists(local)? {
                    Err(GitError::BranchExists {
                        name: local.to_string(),
                    })
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Whether `refs/heads/<name>` exists, judged by exit status alone
    pub fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        let full_ref = format!("refs/heads/{name}");
        Ok(self
            .output(&["show-ref", "--verify", "--quiet", &full_ref])?
            .status
            .success())
    }

    /// Object id of the newest stash entry, if any
    fn stash_head(&self) -> Result<Option<String>, GitError> {
        let output = self.output(&["rev-parse", "--quiet", "--verify", "refs/stash"])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }

    /// Stash tracked and untracked changes under `message`.
    ///
    /// Returns the new stash's object id, or `None` when git had nothing to
    /// save (no empty stash entry is created in that case).
    pub fn stash_push(&self, message: &str) -> Result<Option<String>, GitError> {
        let before = self.stash_head()?;
        self.run(&["stash", "push", "--include-untracked", "-m", message])?;
        let after = self.stash_head()?;

        if after.is_some() && after != before {
            info!("Stashed local changes: {message}");
            Ok(after)
        } else {
            debug!("Nothing to stash");
            Ok(None)
        }
    }

    pub fn stash_pop(&self) -> Result<(), GitError> {
        info!("Restoring stashed changes");
        self.run(&["stash", "pop"]).map(drop)
    }

    pub fn checkout(&self, branch: &str) -> Result<(), GitError> {
        info!("Checking out {branch}");
        // The trailing `--` keeps a branch named like a file from being read as a path
        self.run(&["checkout", branch, "--"]).map(drop)
    }

    /// `git status --porcelain`, untracked files included
    pub fn status(&self) -> Result<String, GitError> {
        self.run(&["status", "--porcelain"])
    }

    pub fn is_clean(&self) -> Result<bool, GitError> {
        Ok(self.status()?.trim().is_empty())
    }

    /// Whether the path is inside a git working tree. Any failure, including
    /// a missing git binary, counts as "no".
    pub fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.trim() == "true")
            .unwrap_or(false)
    }

    /// Short name of the checked-out branch, or the abbreviated commit id
    /// when HEAD is detached
    pub fn current_branch(&self) -> Result<String, GitError> {
        let output = self.output(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        Ok(self.run(&["rev-parse", "--short", "HEAD"])?.trim().to_string())
    }

    /// Whether `commit` has a first parent (false for a root commit)
    pub fn has_parent(&self, commit: &str) -> Result<bool, GitError> {
        let parent = format!("{commit}^");
        Ok(self
            .output(&["rev-parse", "--verify", "--quiet", &parent])?
            .status
            .success())
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.repo_path)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C");
        cmd
    }

    /// Spawn git and collect its output, whatever the exit status
    fn output(&self, args: &[&str]) -> Result<Output, GitError> {
        debug!("git -C {} {}", self.repo_path.display(), args.join(" "));

        let output = self
            .command(args)
            .output()
            .map_err(|e| GitError::Spawn {
                command: subcommand(args),
                message: e.to_string(),
            })?;

        trace!("git {} exited with {}", subcommand(args), output.status);
        Ok(output)
    }

    /// Spawn git and fail on non-zero exit
    fn checked(&self, args: &[&str]) -> Result<Output, GitError> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(GitError::Exit {
                command: subcommand(args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Spawn git, fail on non-zero exit, and return stdout as UTF-8
    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.checked(args)?;
        String::from_utf8(output.stdout).map_err(|e| GitError::InvalidUtf8 {
            command: subcommand(args),
            message: e.to_string(),
        })
    }
}

fn subcommand(args: &[&str]) -> String {
    args.first().copied().unwrap_or_default().to_string()
}

fn as_strs(args: &[String]) -> Vec<&str> {
    args.iter().map(String::as_str).collect()
}
