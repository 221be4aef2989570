//! Shared git utilities: branch/status probing and the plumbing commands
//! the Repo Pull Engine drives on the host (§4.9).

use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone, Default)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Resolve just the git branch from a working directory.
pub async fn resolve_git_branch(path: &str) -> Option<String> {
    let out = run_git(&["rev-parse", "--abbrev-ref", "HEAD"], path).await;
    if out.success {
        let text = out.stdout.trim();
        (!text.is_empty()).then(|| text.to_string())
    } else {
        None
    }
}

/// `true` iff the working tree and index have no uncommitted changes.
pub async fn is_clean(repo_root: &str) -> bool {
    let out = run_git(&["status", "--porcelain"], repo_root).await;
    out.success && out.stdout.trim().is_empty()
}

pub async fn head_sha(repo_root: &str) -> Option<String> {
    let out = run_git(&["rev-parse", "HEAD"], repo_root).await;
    out.success.then(|| out.stdout.trim().to_string())
}

pub async fn merge_base(repo_root: &str, a: &str, b: &str) -> Option<String> {
    let out = run_git(&["merge-base", a, b], repo_root).await;
    out.success.then(|| out.stdout.trim().to_string())
}

pub async fn is_ancestor(repo_root: &str, ancestor: &str, descendant: &str) -> bool {
    run_git(
        &["merge-base", "--is-ancestor", ancestor, descendant],
        repo_root,
    )
    .await
    .success
}

pub async fn fetch_bundle_to_ref(repo_root: &str, bundle_path: &str, ref_name: &str) -> GitOutput {
    run_git(
        &["fetch", "--no-tags", "--force", bundle_path, &format!("HEAD:{ref_name}")],
        repo_root,
    )
    .await
}

pub async fn merge_no_commit(repo_root: &str, ref_name: &str) -> GitOutput {
    run_git(&["merge", "--no-commit", "--no-ff", ref_name], repo_root).await
}

pub async fn merge_abort(repo_root: &str) -> GitOutput {
    run_git(&["merge", "--abort"], repo_root).await
}

pub async fn merge_tree_write_tree(repo_root: &str, base: &str, other: &str) -> GitOutput {
    run_git(&["merge-tree", "--write-tree", base, other], repo_root).await
}

pub async fn diff_name_status(repo_root: &str, range: &str) -> GitOutput {
    run_git(&["diff", "--name-status", range], repo_root).await
}

pub async fn update_ref_delete(repo_root: &str, ref_name: &str) -> GitOutput {
    run_git(&["update-ref", "-d", ref_name], repo_root).await
}

pub async fn diff_counts(repo_root: &str) -> GitOutput {
    run_git(&["diff", "--name-status"], repo_root).await
}

/// `git status --porcelain=v1`, used by `/repo/changes` to list the host
/// working tree's dirty paths including untracked files.
pub async fn status_porcelain(repo_root: &str) -> GitOutput {
    run_git(&["status", "--porcelain=v1"], repo_root).await
}

/// Raw unified diff for one path, staged or against the working tree.
pub async fn diff_patch_for_path(repo_root: &str, path: &str, staged: bool) -> GitOutput {
    if staged {
        run_git(&["diff", "--cached", "--", path], repo_root).await
    } else {
        run_git(&["diff", "--", path], repo_root).await
    }
}

pub async fn run_git(args: &[&str], cwd: &str) -> GitOutput {
    let output = match Command::new("/usr/bin/git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
    {
        Ok(o) => o,
        Err(_) => return GitOutput::default(),
    };

    GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}
