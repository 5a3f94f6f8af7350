use branchdiff::{
    BranchDiffQuery, BranchKind, ChangeError, ChangeRetriever, CompareMode,
    DEFAULT_CONTEXT_LINES, Git, GitError, LineKind, WorkingTreeQuery,
};
use git2::{Repository, RepositoryInitOptions, Signature};
use similar_asserts::assert_eq;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Test fixture for a git repository
struct Fixture {
    dir: TempDir,
    repo: Repository,
}

impl Fixture {
    /// Create a new empty repo on `main` with deterministic config
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts).expect("Failed to init repo");
        configure(&repo);

        Self { dir, repo }
    }

    /// Clone `upstream` with the git binary, so the clone has an `origin`
    fn clone_of(upstream: &Fixture) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let status = Command::new("git")
            .arg("clone")
            .arg("-q")
            .arg(upstream.path())
            .arg(dir.path())
            .status()
            .expect("Failed to run git clone");
        assert!(status.success(), "git clone failed");

        let repo = Repository::open(dir.path()).expect("Failed to open clone");
        configure(&repo);

        Self { dir, repo }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn retriever(&self) -> ChangeRetriever {
        ChangeRetriever::open(self.path()).unwrap()
    }

    /// Write a file to the repo
    fn write_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn read_file(&self, name: &str) -> String {
        fs::read_to_string(self.dir.path().join(name)).unwrap()
    }

    /// Stage a file
    fn stage_file(&self, name: &str) {
        let mut index = self.repo.index().unwrap();
        // The git binary may have rewritten the index since we last looked
        index.read(true).unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
    }

    /// Create a commit on the checked-out branch
    fn commit(&self, message: &str) {
        let sig = Signature::new(
            "Test User",
            "test@example.com",
            &git2::Time::new(1234567890, 0),
        )
        .unwrap();
        let tree_id = self.repo.index().unwrap().write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();

        if let Ok(head) = self.repo.head() {
            let parent = head.peel_to_commit().unwrap();
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
                .unwrap();
        } else {
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[])
                .unwrap();
        }
    }

    fn commit_file(&self, name: &str, content: &str, message: &str) {
        self.write_file(name, content);
        self.stage_file(name);
        self.commit(message);
    }

    /// Run the git binary in the fixture and return stdout
    fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .arg("-C")
            .arg(self.path())
            .args(args)
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }
}

fn configure(repo: &Repository) {
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();
    config.set_bool("commit.gpgsign", false).unwrap();
}

/// Upstream with `main` (a.txt, then m.txt) and `release` branched off the
/// first commit (adds r.txt). Left with `main` checked out.
fn upstream_with_release() -> Fixture {
    let upstream = Fixture::new();
    upstream.commit_file("a.txt", "base\n", "initial");

    upstream.git(&["checkout", "-q", "-b", "release"]);
    upstream.commit_file("r.txt", "release notes\n", "add release notes");

    upstream.git(&["checkout", "-q", "main"]);
    upstream.commit_file("m.txt", "mainline\n", "add mainline file");

    upstream
}

fn paths(files: &[branchdiff::FileDiff]) -> Vec<&str> {
    files.iter().map(|f| f.display_path()).collect()
}

// =============================================================================
// Working tree
// =============================================================================

#[test]
fn working_tree_unstaged_then_staged() {
    let fixture = Fixture::new();
    fixture.commit_file("x.txt", "old\ncontext\n", "initial");
    fixture.write_file("x.txt", "new\ncontext\n");

    let retriever = fixture.retriever();

    let unstaged = retriever
        .working_tree_diff(&WorkingTreeQuery::default())
        .unwrap();
    assert_eq!(unstaged.len(), 1);
    let file = &unstaged[0];
    assert_eq!(file.new_path, "x.txt");
    assert_eq!((file.additions, file.deletions), (1, 1));
    let kinds: Vec<LineKind> = file.hunks[0].lines.iter().map(|l| l.kind).collect();
    assert_eq!(
        kinds,
        vec![LineKind::Deletion, LineKind::Addition, LineKind::Context]
    );

    let staged_query = WorkingTreeQuery {
        staged: true,
        ..WorkingTreeQuery::default()
    };
    assert!(retriever.working_tree_diff(&staged_query).unwrap().is_empty());

    fixture.stage_file("x.txt");
    assert!(
        retriever
            .working_tree_diff(&WorkingTreeQuery::default())
            .unwrap()
            .is_empty()
    );
    let staged = retriever.working_tree_diff(&staged_query).unwrap();
    assert_eq!(paths(&staged), vec!["x.txt"]);
}

#[test]
fn working_tree_context_and_paths() {
    let fixture = Fixture::new();
    let lines: String = (1..=20).map(|i| format!("line {i}\n")).collect();
    fixture.commit_file("long.txt", &lines, "initial");
    fixture.commit_file("other.txt", "other\n", "second");

    fixture.write_file("long.txt", &lines.replace("line 10\n", "line ten\n"));
    fixture.write_file("other.txt", "changed\n");

    let retriever = fixture.retriever();
    let query = WorkingTreeQuery {
        context_lines: 0,
        paths: vec!["long.txt".to_string()],
        ..WorkingTreeQuery::default()
    };
    let files = retriever.working_tree_diff(&query).unwrap();

    assert_eq!(paths(&files), vec!["long.txt"]);
    let hunk = &files[0].hunks[0];
    assert_eq!(hunk.lines.len(), 2);
    assert_eq!(hunk.lines[0].old_line, Some(10));
    assert_eq!(hunk.lines[1].new_line, Some(10));
}

// =============================================================================
// Commits
// =============================================================================

#[test]
fn commit_diff_single_root_and_range() {
    let fixture = Fixture::new();
    fixture.commit_file("a.txt", "one\n", "initial");
    fixture.commit_file("a.txt", "one\ntwo\n", "add two");

    let retriever = fixture.retriever();

    let single = retriever
        .commit_diff("HEAD", None, DEFAULT_CONTEXT_LINES)
        .unwrap();
    assert_eq!(paths(&single), vec!["a.txt"]);
    assert_eq!((single[0].additions, single[0].deletions), (1, 0));
    let added = single[0].hunks[0]
        .lines
        .iter()
        .find(|l| l.kind == LineKind::Addition)
        .unwrap();
    assert_eq!(added.text, "two");
    assert_eq!(added.new_line, Some(2));

    let root = retriever
        .commit_diff("HEAD~1", None, DEFAULT_CONTEXT_LINES)
        .unwrap();
    assert_eq!(paths(&root), vec!["a.txt"]);
    assert!(root[0].is_new);
    assert_eq!(root[0].additions, 1);

    let range = retriever
        .commit_diff("HEAD~1", Some("HEAD"), DEFAULT_CONTEXT_LINES)
        .unwrap();
    assert_eq!(range, single);

    let narrow = retriever.commit_diff("HEAD", None, 0).unwrap();
    let kinds: Vec<LineKind> = narrow[0].hunks[0].lines.iter().map(|l| l.kind).collect();
    assert_eq!(kinds, vec![LineKind::Addition]);
}

#[test]
fn commit_diff_rejects_empty_commit() {
    let fixture = Fixture::new();
    fixture.commit_file("a.txt", "one\n", "initial");

    match fixture.retriever().commit_diff("", None, DEFAULT_CONTEXT_LINES) {
        Err(ChangeError::InvalidArgument { field }) => assert_eq!(field, "commit"),
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
}

#[test]
fn commit_diff_unknown_commit_is_a_git_failure() {
    let fixture = Fixture::new();
    fixture.commit_file("a.txt", "one\n", "initial");

    match fixture.retriever().commit_diff("HEAD", Some("no-such-rev"), 0) {
        Err(ChangeError::Exit { stderr, .. }) => assert!(!stderr.is_empty()),
        other => panic!("expected a git failure, got {other:?}"),
    }
}

#[test]
fn log_lists_commits_newest_first() {
    let fixture = Fixture::new();
    fixture.commit_file("a.txt", "one\n", "initial");
    fixture.commit_file("b/c.txt", "two\n", "add nested file");

    let commits = fixture.retriever().log(10).unwrap();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[0].subject, "add nested file");
    assert_eq!(commits[0].author, "Test User");
    assert_eq!(commits[0].files, vec!["b/c.txt".to_string()]);
    assert_eq!(commits[1].subject, "initial");

    assert_eq!(fixture.retriever().log(1).unwrap().len(), 1);
}

// =============================================================================
// Branch resolution
// =============================================================================

#[test]
fn resolve_remote_only_branch_creates_tracking_branch() {
    let upstream = upstream_with_release();
    let clone = Fixture::clone_of(&upstream);
    let retriever = clone.retriever();

    let before = retriever.list_branches().unwrap();
    let remote_release = before
        .iter()
        .find(|b| b.name == "origin/release")
        .unwrap();
    assert_eq!(remote_release.kind, BranchKind::Remote);
    assert!(remote_release.needs_localization);
    assert!(!before.iter().any(|b| b.name == "origin/HEAD"));

    let resolution = retriever.resolve_branch("release").unwrap();
    assert!(resolution.was_remote);
    assert!(resolution.localized);
    assert_eq!(resolution.local_branch, "release");
    assert_eq!(resolution.remote_ref.as_deref(), Some("origin/release"));
    assert!(resolution.message.is_some());

    let after = retriever.list_branches().unwrap();
    assert!(
        after
            .iter()
            .any(|b| b.name == "release" && b.kind == BranchKind::Local)
    );
    let remote_release = after
        .iter()
        .find(|b| b.name == "origin/release")
        .unwrap();
    assert!(!remote_release.needs_localization);

    let upstream_ref = clone.git(&["rev-parse", "--abbrev-ref", "release@{upstream}"]);
    assert_eq!(upstream_ref.trim(), "origin/release");
}

#[test]
fn resolve_is_idempotent() {
    let upstream = upstream_with_release();
    let clone = Fixture::clone_of(&upstream);
    let retriever = clone.retriever();

    assert!(retriever.resolve_branch("release").unwrap().localized);

    let again = retriever.resolve_branch("release").unwrap();
    assert!(!again.localized);
    assert_eq!(again.local_branch, "release");

    // Naming the remote branch explicitly reuses the local one
    let explicit = retriever.resolve_branch("origin/release").unwrap();
    assert!(explicit.was_remote);
    assert!(!explicit.localized);
    assert_eq!(explicit.local_branch, "release");
    assert!(explicit.message.is_some());
}

#[test]
fn resolve_local_branch_has_no_side_effects() {
    let fixture = Fixture::new();
    fixture.commit_file("a.txt", "one\n", "initial");

    let resolution = fixture.retriever().resolve_branch("main").unwrap();
    assert!(!resolution.was_remote);
    assert!(!resolution.localized);
    assert_eq!(resolution.local_branch, "main");
    assert_eq!(resolution.message, None);
}

#[test]
fn resolve_unknown_branch() {
    let fixture = Fixture::new();
    fixture.commit_file("a.txt", "one\n", "initial");

    match fixture.retriever().resolve_branch("nope") {
        Err(ChangeError::BranchNotFound { input }) => assert_eq!(input, "nope"),
        other => panic!("expected BranchNotFound, got {other:?}"),
    }
}

#[test]
fn tracking_branch_creation_reports_existing_branch() {
    let upstream = upstream_with_release();
    let clone = Fixture::clone_of(&upstream);
    let git = Git::new(clone.path());

    git.create_tracking_branch("release", "refs/remotes/origin/release")
        .unwrap();
    assert!(git.branch_exists("release").unwrap());

    match git.create_tracking_branch("release", "refs/remotes/origin/release") {
        Err(GitError::BranchExists { name }) => assert_eq!(name, "release"),
        other => panic!("expected BranchExists, got {other:?}"),
    }

    // Any other failure keeps its own class
    match git.create_tracking_branch("hotfix", "refs/remotes/origin/hotfix") {
        Err(GitError::Exit { command, .. }) => assert_eq!(command, "branch"),
        other => panic!("expected a git failure, got {other:?}"),
    }

    // The resolver then reuses the branch instead of failing
    let resolution = clone.retriever().resolve_branch("origin/release").unwrap();
    assert!(resolution.was_remote);
    assert!(!resolution.localized);
    assert_eq!(resolution.local_branch, "release");
}

// =============================================================================
// Branch comparison
// =============================================================================

#[test]
fn branch_diff_same_branch_is_empty() {
    let fixture = Fixture::new();
    fixture.commit_file("a.txt", "one\n", "initial");

    let result = fixture
        .retriever()
        .branch_diff(&BranchDiffQuery::new("main", "main"))
        .unwrap();

    assert!(result.files.is_empty());
    assert_eq!(result.comparison.base_resolved, "main");
    assert_eq!(result.comparison.target_resolved, "main");
    assert!(result.comparison.localized_branches.is_empty());
    assert!(result.comparison.messages.is_empty());
}

#[test]
fn branch_diff_localizes_target_and_honours_mode() {
    let upstream = upstream_with_release();
    let clone = Fixture::clone_of(&upstream);
    let retriever = clone.retriever();

    let triple = retriever
        .branch_diff(&BranchDiffQuery::new("main", "release"))
        .unwrap();
    assert_eq!(triple.comparison.mode, CompareMode::TripleDot);
    assert_eq!(triple.comparison.target_resolved, "release");
    assert_eq!(triple.comparison.localized_branches, vec!["release".to_string()]);
    assert_eq!(triple.comparison.messages.len(), 1);
    // Only what release introduced since it left main
    assert_eq!(paths(&triple.files), vec!["r.txt"]);
    assert!(triple.files[0].is_new);

    let double = retriever
        .branch_diff(&BranchDiffQuery::new("main", "release").with_mode(CompareMode::DoubleDot))
        .unwrap();
    assert_eq!(double.comparison.mode, CompareMode::DoubleDot);
    assert!(double.comparison.localized_branches.is_empty());
    // Tip to tip: main's newer file shows up as deleted
    assert_eq!(paths(&double.files), vec!["m.txt", "r.txt"]);
    assert!(double.files[0].is_deleted);
}

#[test]
fn branch_diff_ignores_tag_named_like_branch() {
    let upstream = upstream_with_release();
    upstream.git(&["tag", "release", "main~1"]);
    let clone = Fixture::clone_of(&upstream);
    let retriever = clone.retriever();

    let double = retriever
        .branch_diff(&BranchDiffQuery::new("main", "release").with_mode(CompareMode::DoubleDot))
        .unwrap();
    assert_eq!(double.comparison.target_resolved, "release");
    assert_eq!(paths(&double.files), vec!["m.txt", "r.txt"]);

    // The new local branch follows the remote branch, not the tag
    let local = clone.git(&["rev-parse", "refs/heads/release"]);
    let remote = clone.git(&["rev-parse", "refs/remotes/origin/release"]);
    assert_eq!(local, remote);
    let tag = clone.git(&["rev-parse", "refs/tags/release^{commit}"]);
    assert!(local != tag);

    let triple = retriever
        .branch_diff(&BranchDiffQuery::new("main", "release"))
        .unwrap();
    assert_eq!(paths(&triple.files), vec!["r.txt"]);
}

#[test]
fn branch_diff_missing_branch() {
    let fixture = Fixture::new();
    fixture.commit_file("a.txt", "one\n", "initial");

    match fixture
        .retriever()
        .branch_diff(&BranchDiffQuery::new("main", "ghost"))
    {
        Err(ChangeError::BranchNotFound { input }) => assert_eq!(input, "ghost"),
        other => panic!("expected BranchNotFound, got {other:?}"),
    }
}

// =============================================================================
// Switching
// =============================================================================

#[test]
fn switch_clean_tree_does_not_stash() {
    let upstream = upstream_with_release();
    let clone = Fixture::clone_of(&upstream);

    let outcome = clone.retriever().switch_branch("release", true).unwrap();

    assert_eq!(outcome.previous_branch, "main");
    assert_eq!(outcome.current_branch, "release");
    assert!(!outcome.stash_created);
    assert_eq!(outcome.stash_message, None);
    assert_eq!(outcome.localized_branch.as_deref(), Some("release"));
    assert!(
        outcome
            .messages
            .iter()
            .all(|m| !m.to_lowercase().contains("stash")),
        "{:?}",
        outcome.messages
    );
    assert!(clone.git(&["stash", "list"]).trim().is_empty());
}

#[test]
fn switch_dirty_tree_stashes_first() {
    let upstream = upstream_with_release();
    let clone = Fixture::clone_of(&upstream);
    clone.write_file("a.txt", "local edit\n");
    clone.write_file("notes.txt", "untracked\n");

    let outcome = clone.retriever().switch_branch("release", true).unwrap();

    assert!(outcome.stash_created);
    let label = outcome.stash_message.clone().unwrap();
    assert!(label.contains("release"));
    assert!(outcome.messages.iter().any(|m| m.contains(&label)));
    assert_eq!(outcome.current_branch, "release");

    assert_eq!(clone.git(&["stash", "list"]).lines().count(), 1);
    assert_eq!(clone.read_file("a.txt"), "base\n");
    assert!(!clone.path().join("notes.txt").exists());
    assert!(clone.git(&["status", "--porcelain"]).trim().is_empty());
}

#[test]
fn switch_to_local_branch() {
    let upstream = upstream_with_release();

    let outcome = upstream.retriever().switch_branch("release", false).unwrap();
    assert_eq!(outcome.previous_branch, "main");
    assert_eq!(outcome.current_branch, "release");
    assert_eq!(outcome.localized_branch, None);
    assert_eq!(outcome.messages.len(), 1);
}

#[cfg(unix)]
#[test]
fn failed_switch_restores_stashed_changes() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = upstream_with_release();

    // Fail every branch checkout after it happens; stash never runs this hook
    let hooks = fixture.path().join(".git").join("custom-hooks");
    fs::create_dir_all(&hooks).unwrap();
    let hook = hooks.join("post-checkout");
    fs::write(&hook, "#!/bin/sh\nif [ \"$3\" = 1 ]; then exit 1; fi\nexit 0\n").unwrap();
    fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).unwrap();
    fixture.git(&["config", "core.hooksPath", hooks.to_str().unwrap()]);

    fixture.write_file("a.txt", "local edit\n");
    fixture.write_file("notes.txt", "untracked\n");

    match fixture.retriever().switch_branch("release", true) {
        Err(ChangeError::Exit { command, .. }) => assert_eq!(command, "checkout"),
        other => panic!("expected checkout failure, got {other:?}"),
    }

    assert!(fixture.git(&["stash", "list"]).trim().is_empty());
    assert_eq!(fixture.read_file("a.txt"), "local edit\n");
    assert_eq!(fixture.read_file("notes.txt"), "untracked\n");
}

// =============================================================================
// Repository probe
// =============================================================================

#[test]
fn not_a_repository() {
    let dir = TempDir::new().unwrap();

    assert!(!ChangeRetriever::new(dir.path()).is_repo());
    match ChangeRetriever::open(dir.path()) {
        Err(ChangeError::NotARepository { .. }) => {}
        other => panic!("expected NotARepository, got {other:?}"),
    }
}
