//! Transient bare repository used as the fetch source for one acquisition.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::cli::{git, stderr, stdout};

/// Remote name used inside the staging repository.
pub const REMOTE_NAME: &str = "origin";

/// Local branch pinning the resolved commit so clones always carry it.
const PIN_REF: &str = "refs/heads/autodeploy-pin";

/// A bare repository at `root/bare-{project}-{unixtime}`.
///
/// The directory is removed when the value is dropped, on every exit path of
/// the acquisition that created it.
pub struct StagingRepo {
    path: PathBuf,
    origin: String,
    removed: bool,
}

impl StagingRepo {
    /// Initializes a fresh staging repository with `origin` as its remote.
    pub fn create(root: &Path, project_name: &str, origin: &str) -> Result<Self> {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let path = root.join(format!("bare-{}-{}", project_name, timestamp));
        if path.exists() {
            tracing::warn!(path = %path.display(), "removing stale staging repository");
            std::fs::remove_dir_all(&path)?;
        }

        let staging = Self {
            path,
            origin: origin.to_string(),
            removed: false,
        };

        let output = git(
            root,
            [
                OsStr::new("init"),
                OsStr::new("--bare"),
                OsStr::new("--quiet"),
                staging.path.as_os_str(),
            ],
        )?;
        if !output.status.success() {
            return Err(Error::Git(format!(
                "git init --bare failed: {}",
                stderr(&output)
            )));
        }

        let output = staging.run(["remote", "add", "--", REMOTE_NAME, origin])?;
        if !output.status.success() {
            return Err(Error::Git(format!(
                "cannot add remote {}: {}",
                origin,
                stderr(&output)
            )));
        }

        tracing::info!(path = %staging.path.display(), origin, "created staging repository");
        Ok(staging)
    }

    /// Path of the bare repository.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks that the origin answers at all.
    pub fn probe_origin(&self) -> Result<()> {
        let output = self.run(["ls-remote", "--heads", REMOTE_NAME])?;
        if !output.status.success() {
            return Err(Error::OriginUnreachable {
                origin: self.origin.clone(),
                reason: stderr(&output),
            });
        }
        Ok(())
    }

    /// Fetches every head into `refs/remotes/origin/*`.
    pub fn fetch_heads(&self) -> Result<()> {
        let refspec = format!("refs/heads/*:refs/remotes/{}/*", REMOTE_NAME);
        let output = self.run(["fetch", "--quiet", "--no-tags", REMOTE_NAME, refspec.as_str()])?;
        if !output.status.success() {
            return Err(Error::FetchFailed {
                origin: self.origin.clone(),
                reason: stderr(&output),
            });
        }
        Ok(())
    }

    /// Force-fetches a single remote ref into `refs/remotes/origin/{name}`.
    ///
    /// Returns false when the origin has no such ref.
    pub fn fetch_ref(&self, remote_ref: &str, name: &str) -> Result<bool> {
        let refspec = format!("+{}:refs/remotes/{}/{}", remote_ref, REMOTE_NAME, name);
        let output = self.run(["fetch", "--quiet", "--no-tags", REMOTE_NAME, refspec.as_str()])?;
        if !output.status.success() {
            tracing::debug!(remote_ref, reason = %stderr(&output), "ref fetch failed");
            return Ok(false);
        }
        Ok(true)
    }

    /// Resolves `refs/remotes/origin/{name}` to a commit id.
    pub fn resolve(&self, name: &str) -> Result<Option<String>> {
        let spec = format!("refs/remotes/{}/{}^{{commit}}", REMOTE_NAME, name);
        let output = self.run(["rev-parse", "--verify", "--quiet", spec.as_str()])?;
        if !output.status.success() {
            return Ok(None);
        }
        let sha = stdout(&output);
        Ok((!sha.is_empty()).then_some(sha))
    }

    /// Points a local branch at `sha` so a clone of this repository carries it.
    pub fn pin(&self, sha: &str) -> Result<()> {
        let output = self.run(["update-ref", PIN_REF, sha])?;
        if !output.status.success() {
            return Err(Error::Git(format!(
                "cannot pin {}: {}",
                sha,
                stderr(&output)
            )));
        }
        Ok(())
    }

    fn run<const N: usize>(&self, args: [&str; N]) -> Result<std::process::Output> {
        Ok(git(&self.path, args)?)
    }

    /// Removes the repository directory. Idempotent.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }
        if self.path.exists() {
            std::fs::remove_dir_all(&self.path)?;
        }
        self.removed = true;
        tracing::debug!(path = %self.path.display(), "removed staging repository");
        Ok(())
    }
}

impl Drop for StagingRepo {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::error!(error = %e, path = %self.path.display(), "failed to remove staging repository");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staging_dirs(root: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("bare-"))
            })
            .collect()
    }

    #[test]
    fn staging_repo_is_named_after_project_and_removed_on_drop() {
        let root = TempDir::new().unwrap();
        {
            let staging =
                StagingRepo::create(root.path(), "widgets", "/nonexistent/widgets.git").unwrap();
            let name = staging.path().file_name().unwrap().to_str().unwrap().to_string();
            assert!(name.starts_with("bare-widgets-"));
            assert!(name["bare-widgets-".len()..].parse::<u64>().is_ok());
            assert!(staging.path().join("HEAD").exists());
        }
        assert!(staging_dirs(root.path()).is_empty());
    }

    #[test]
    fn probe_reports_unreachable_origin() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nowhere");
        let staging =
            StagingRepo::create(root.path(), "nowhere", missing.to_str().unwrap()).unwrap();
        let err = staging.probe_origin().unwrap_err();
        assert!(matches!(err, Error::OriginUnreachable { .. }));
    }

    #[test]
    fn dash_prefixed_origin_is_taken_as_a_url() {
        let root = TempDir::new().unwrap();
        let marker = root.path().join("upload-pack-ran");
        let origin = format!("--upload-pack=touch {}", marker.display());

        let staging = StagingRepo::create(root.path(), "widgets", &origin).unwrap();
        let url = stdout(&staging.run(["remote", "get-url", REMOTE_NAME]).unwrap());
        assert_eq!(url, origin);

        let err = staging.probe_origin().unwrap_err();
        assert!(matches!(err, Error::OriginUnreachable { .. }));
        assert!(!marker.exists());
    }

    #[test]
    fn cleanup_is_idempotent() {
        let root = TempDir::new().unwrap();
        let mut staging = StagingRepo::create(root.path(), "widgets", "/tmp/x").unwrap();
        staging.cleanup().unwrap();
        staging.cleanup().unwrap();
        assert!(staging_dirs(root.path()).is_empty());
    }
}
