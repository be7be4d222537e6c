//! Git-based project acquisition.
//!
//! [`GitAcquirer::acquire`] resolves a [`RefSpec`] against an origin, clones
//! the resolved commit into a content-addressed directory
//! `root/{project}-{sha}` and points the named slot symlink `root/{dirname}`
//! at it. Identical commits share one clone; the transient staging repository
//! is removed on every exit path.
//!
//! Slot reconciliation is not locked. Concurrent acquisitions targeting the
//! same slot must be serialized by the caller.

mod cli;
mod naming;
mod refspec;
mod slot;
mod staging;

pub use naming::{guess_project_name, path_friendly, project_name};
pub use refspec::{PinnedCommit, RefSpec, DEFAULT_BRANCH};
pub use slot::{DeploymentSlot, SlotState};
pub use staging::StagingRepo;

pub(crate) use cli::{git, stdout as git_stdout};

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

/// Outcome of a successful acquisition.
#[derive(Debug, Clone, Serialize)]
pub struct Acquisition {
    /// The slot that now points at the pinned clone.
    pub slot: DeploymentSlot,
    /// The commit the ref resolved to.
    pub pinned: PinnedCommit,
    /// Whether a new clone was created (false when reused or already linked).
    pub cloned: bool,
}

/// Acquires projects into a root directory.
#[derive(Debug, Clone)]
pub struct GitAcquirer {
    root: PathBuf,
}

impl GitAcquirer {
    /// Creates an acquirer managing slots and clones under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Acquires `ref_spec` of `origin` and returns the slot path.
    pub fn acquire(
        &self,
        origin: &str,
        ref_spec: &RefSpec,
        dirname: Option<&str>,
        do_update: bool,
    ) -> Result<PathBuf> {
        self.acquire_slot(origin, ref_spec, dirname, do_update)
            .map(|acquisition| acquisition.slot.symlink_path().to_path_buf())
    }

    /// Acquires `ref_spec` of `origin`, reporting the slot, commit and clone work done.
    pub fn acquire_slot(
        &self,
        origin: &str,
        ref_spec: &RefSpec,
        dirname: Option<&str>,
        do_update: bool,
    ) -> Result<Acquisition> {
        let project = project_name(origin)?;
        let dirname_override = match dirname {
            Some(name) => {
                let sanitized = path_friendly(name);
                if sanitized.is_empty() {
                    return Err(Error::InvalidParameter(format!("dirname '{}'", name)));
                }
                Some(sanitized)
            }
            None => None,
        };

        std::fs::create_dir_all(&self.root)?;
        let root = std::path::absolute(&self.root)?;

        let staging = StagingRepo::create(&root, &project, origin)?;
        staging.probe_origin()?;
        staging.fetch_heads()?;

        let pinned = resolve(&staging, origin, ref_spec)?;
        tracing::info!(
            origin,
            reference = %ref_spec,
            reference_kind = pinned.ref_spec().kind(),
            sha = %pinned.sha(),
            "resolved ref"
        );

        let dirname = match dirname_override {
            Some(name) => format!("{}-{}", project, name),
            None => format!("{}-{}", project, pinned.dirname_fragment()),
        };
        let clone_dir_name = format!("{}-{}", project, pinned.sha());
        let slot = DeploymentSlot::new(&root, dirname, &clone_dir_name);

        if slot.reconcile(do_update)? {
            return Ok(Acquisition {
                slot,
                pinned,
                cloned: false,
            });
        }

        let cloned = materialize(&staging, slot.target_clone_path(), &pinned, origin)?;
        slot.link()?;

        Ok(Acquisition {
            slot,
            pinned,
            cloned,
        })
    }
}

fn resolve(staging: &StagingRepo, origin: &str, ref_spec: &RefSpec) -> Result<PinnedCommit> {
    let not_found = || Error::RefNotFound {
        reference: ref_spec.to_string(),
        origin: origin.to_string(),
    };

    let sha = match ref_spec {
        RefSpec::Tag(name) => {
            if !staging.fetch_ref(&format!("refs/tags/{}", name), name)? {
                return Err(not_found());
            }
            staging.resolve(name)?
        }
        RefSpec::Branch(name) => {
            if !staging.fetch_ref(&format!("refs/heads/{}", name), name)? {
                return Err(not_found());
            }
            staging.resolve(name)?
        }
        RefSpec::Commit(sha) => {
            return Err(Error::UnsupportedRefKind(format!(
                "cannot fetch remote reference from just a commit id ({})",
                sha
            )))
        }
        RefSpec::Default => staging.resolve(DEFAULT_BRANCH)?,
    };

    sha.map(|sha| PinnedCommit::new(ref_spec.clone(), sha))
        .ok_or_else(not_found)
}

/// Ensures `target` holds a checkout detached at the pinned commit.
///
/// Returns false when the directory already existed and was reused.
fn materialize(
    staging: &StagingRepo,
    target: &Path,
    pinned: &PinnedCommit,
    origin: &str,
) -> Result<bool> {
    if target.is_dir() {
        tracing::info!(target = %target.display(), "reusing existing clone");
        return Ok(false);
    }

    staging.pin(pinned.sha())?;
    if let Err(e) = clone_detached(staging.path(), target, pinned.sha(), origin) {
        if target.exists() {
            if let Err(cleanup) = std::fs::remove_dir_all(target) {
                tracing::warn!(error = %cleanup, target = %target.display(), "failed to remove partial clone");
            }
        }
        return Err(e);
    }

    tracing::info!(target = %target.display(), sha = %pinned.sha(), "cloned project");
    Ok(true)
}

fn clone_detached(source: &Path, target: &Path, sha: &str, origin: &str) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| Error::Git(format!("clone target {} has no parent", target.display())))?;

    let output = git(
        parent,
        [
            OsStr::new("clone"),
            OsStr::new("--quiet"),
            OsStr::new("--no-checkout"),
            source.as_os_str(),
            target.as_os_str(),
        ],
    )?;
    check(&output, "clone")?;

    for args in [
        ["checkout", "--quiet", "--detach", sha],
        ["reset", "--quiet", "--hard", sha],
        ["remote", "set-url", "origin", origin],
    ] {
        let output = git(target, args)?;
        check(&output, args[0])?;
    }
    Ok(())
}

fn check(output: &std::process::Output, step: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(Error::Git(format!(
        "git {} failed: {}",
        step,
        cli::stderr(output)
    )))
}
