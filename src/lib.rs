//! Structured git diffs and self-healing branch resolution.
//!
//! [`ChangeRetriever`] is the entry point: it runs the `git` binary in a
//! repository, parses the unified diff it prints into [`FileDiff`] values,
//! and resolves branch names (including remote-only ones) into local
//! branches before comparing or switching to them.
//!
//! ```no_run
//! use branchdiff::{BranchDiffQuery, ChangeRetriever, WorkingTreeQuery};
//!
//! let retriever = ChangeRetriever::open(".")?;
//! let unstaged = retriever.working_tree_diff(&WorkingTreeQuery::default())?;
//! let compared = retriever.branch_diff(&BranchDiffQuery::new("main", "release"))?;
//! println!("{} files, {:?}", unstaged.len(), compared.comparison.localized_branches);
//! # Ok::<(), branchdiff::ChangeError>(())
//! ```

use error_set::error_set;

mod branch;
pub mod diff;
pub mod format;
mod git;
mod history;
mod retrieve;

pub use branch::{BranchEntry, BranchKind, BranchResolution, BranchResolver};
pub use diff::{Diff, DiffLine, FileDiff, Hunk, LineKind};
pub use format::{Format, FormatError};
pub use git::{DiffSpec, Git};
pub use history::CommitInfo;
pub use retrieve::{
    BranchComparison, BranchDiff, BranchDiffQuery, ChangeRetriever, CompareMode,
    DEFAULT_CONTEXT_LINES, SwitchOutcome, WorkingTreeQuery,
};

error_set! {
    /// Top-level error for change retrieval and branch switching
    ChangeError := {
        // A required identifier was empty; checked before running git
        #[display("Missing required argument: {field}")]
        InvalidArgument { field: String },
        #[display("Not a git repository: {path}")]
        NotARepository { path: String },
    } || ResolveError

    /// Errors from resolving a branch name
    ResolveError := {
        #[display("Branch not found: {input}")]
        BranchNotFound { input: String },
    } || GitError

    /// Errors from git command execution
    GitError := {
        #[display("Failed to run git {command}: {message}")]
        Spawn { command: String, message: String },
        #[display("git {command} failed: {stderr}")]
        Exit { command: String, stderr: String },
        #[display("Invalid UTF-8 in git {command} output: {message}")]
        InvalidUtf8 { command: String, message: String },
        // Creating a local branch failed because it is already there
        #[display("Branch already exists: {name}")]
        BranchExists { name: String },
    }
}
