//! Discovery of deployed git working directories under a root.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::acquire::{git, git_stdout};
use crate::error::Result;

/// One git working directory found directly under the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectEntry {
    pub name: String,
    pub path: PathBuf,
    /// Whether the entry is a slot symlink rather than a clone directory.
    pub is_slot: bool,
    /// Checked-out branch; None when HEAD is detached.
    pub branch: Option<String>,
    /// Commit at HEAD; None for a repository without commits.
    pub head: Option<String>,
}

/// Lists the git working directories directly under `root`, sorted by name.
///
/// Entries that cannot be inspected are skipped with a warning.
pub fn list_projects(root: &Path) -> Result<Vec<ProjectEntry>> {
    let mut projects = Vec::new();

    for entry in std::fs::read_dir(root)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, root = %root.display(), "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() || !path.join(".git").exists() {
            continue;
        }

        match inspect(&path, entry.file_name().to_string_lossy().into_owned()) {
            Ok(project) => projects.push(project),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "skipping project");
            }
        }
    }

    projects.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(projects)
}

fn inspect(path: &Path, name: String) -> Result<ProjectEntry> {
    let is_slot = std::fs::symlink_metadata(path)?.file_type().is_symlink();

    let symbolic = git(path, ["symbolic-ref", "--short", "-q", "HEAD"])?;
    let branch = symbolic
        .status
        .success()
        .then(|| git_stdout(&symbolic))
        .filter(|b| !b.is_empty());

    let rev = git(path, ["rev-parse", "--verify", "-q", "HEAD"])?;
    let head = rev
        .status
        .success()
        .then(|| git_stdout(&rev))
        .filter(|h| !h.is_empty());

    Ok(ProjectEntry {
        name,
        path: path.to_path_buf(),
        is_slot,
        branch,
        head,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn run_git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    fn init_repo(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        run_git(dir, &["init", "-q"]);
        run_git(dir, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        run_git(dir, &["config", "user.email", "test@test.com"]);
        run_git(dir, &["config", "user.name", "Test"]);
        std::fs::write(dir.join("app.py"), "").unwrap();
        run_git(dir, &["add", "."]);
        run_git(dir, &["commit", "-q", "-m", "init"]);
    }

    #[test]
    fn reports_branch_detached_head_and_slots() {
        let root = TempDir::new().unwrap();
        let on_branch = root.path().join("widgets-branch");
        init_repo(&on_branch);

        let detached = root.path().join("widgets-detached");
        init_repo(&detached);
        run_git(&detached, &["checkout", "-q", "--detach", "HEAD"]);

        std::os::unix::fs::symlink(&detached, root.path().join("widgets-m-slot")).unwrap();
        std::fs::create_dir(root.path().join("not-a-repo")).unwrap();
        std::fs::write(root.path().join("notes.txt"), "").unwrap();

        let projects = list_projects(root.path()).unwrap();
        let names: Vec<_> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["widgets-branch", "widgets-detached", "widgets-m-slot"]);

        assert_eq!(projects[0].branch.as_deref(), Some("master"));
        assert!(!projects[0].is_slot);
        assert_eq!(projects[0].head.as_ref().map(String::len), Some(40));

        assert_eq!(projects[1].branch, None);
        assert!(projects[2].is_slot);
        assert_eq!(projects[2].head, projects[1].head);
    }

    #[test]
    fn empty_root_lists_nothing() {
        let root = TempDir::new().unwrap();
        assert!(list_projects(root.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let root = TempDir::new().unwrap();
        assert!(list_projects(&root.path().join("absent")).is_err());
    }
}
