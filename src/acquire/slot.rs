//! Named slot symlinks pointing at content-addressed clones.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::lifecycle;

/// A slot `root/{dirname}` and the clone `root/{project}-{sha}` it should point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentSlot {
    dirname: String,
    symlink_path: PathBuf,
    target_clone_path: PathBuf,
}

/// What currently occupies a slot path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing at the slot path.
    Vacant,
    /// A symlink whose target no longer exists.
    Dangling(PathBuf),
    /// A symlink already resolving to the wanted clone.
    Current,
    /// A symlink resolving to another existing directory.
    Elsewhere(PathBuf),
    /// Something other than a symlink.
    Occupied,
}

impl DeploymentSlot {
    /// Describes the slot `root/dirname` for the clone `root/clone_dir_name`.
    pub fn new(root: &Path, dirname: impl Into<String>, clone_dir_name: &str) -> Self {
        let dirname = dirname.into();
        Self {
            symlink_path: root.join(&dirname),
            target_clone_path: root.join(clone_dir_name),
            dirname,
        }
    }

    /// The slot's name under the project root.
    pub fn dirname(&self) -> &str {
        &self.dirname
    }

    /// Path of the slot symlink.
    pub fn symlink_path(&self) -> &Path {
        &self.symlink_path
    }

    /// Path of the content-addressed clone the slot points at.
    pub fn target_clone_path(&self) -> &Path {
        &self.target_clone_path
    }

    /// Inspects what is at the slot path right now.
    pub fn inspect(&self) -> Result<SlotState> {
        let meta = match std::fs::symlink_metadata(&self.symlink_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SlotState::Vacant),
            Err(e) => return Err(e.into()),
        };
        if !meta.file_type().is_symlink() {
            return Ok(SlotState::Occupied);
        }

        let link = std::fs::read_link(&self.symlink_path)?;
        let existing = if link.is_relative() {
            self.symlink_path
                .parent()
                .map(|parent| parent.join(&link))
                .unwrap_or(link)
        } else {
            link
        };

        if !existing.exists() {
            Ok(SlotState::Dangling(existing))
        } else if same_location(&existing, &self.target_clone_path) {
            Ok(SlotState::Current)
        } else {
            Ok(SlotState::Elsewhere(existing))
        }
    }

    /// Clears the slot path so it can be linked to the target clone.
    ///
    /// Returns true when the slot already points at the target and nothing
    /// else needs to happen.
    pub fn reconcile(&self, do_update: bool) -> Result<bool> {
        match self.inspect()? {
            SlotState::Vacant => Ok(false),
            SlotState::Current => {
                tracing::info!(slot = %self.symlink_path.display(), "slot already points at target");
                Ok(true)
            }
            SlotState::Dangling(old) => {
                tracing::info!(slot = %self.symlink_path.display(), old = %old.display(), "removing dangling slot");
                std::fs::remove_file(&self.symlink_path).map_err(|e| Error::SlotUnrepairable {
                    slot: self.symlink_path.clone(),
                    reason: format!("dangling symlink cannot be removed: {}", e),
                })?;
                Ok(false)
            }
            SlotState::Occupied => Err(Error::SlotConflict {
                slot: self.symlink_path.clone(),
                existing: self.symlink_path.clone(),
            }),
            SlotState::Elsewhere(old) if !do_update => Err(Error::SlotConflict {
                slot: self.symlink_path.clone(),
                existing: old,
            }),
            SlotState::Elsewhere(old) => {
                self.replace(&old)?;
                Ok(false)
            }
        }
    }

    /// Unlinks the slot, then stops and deletes the deployment it pointed at.
    ///
    /// Only the unlink can fail the call; stopping and deleting are best-effort.
    fn replace(&self, old: &Path) -> Result<()> {
        tracing::info!(slot = %self.symlink_path.display(), old = %old.display(), "replacing slot");

        if let Err(e) = std::fs::remove_file(&self.symlink_path) {
            if self.symlink_path.exists() {
                return Err(Error::SlotUnrepairable {
                    slot: self.symlink_path.clone(),
                    reason: format!("existing link cannot be removed: {}", e),
                });
            }
        }

        if let Err(e) = lifecycle::stop(old, true) {
            tracing::warn!(error = %e, old = %old.display(), "failed to stop previous deployment");
        }
        if let Err(e) = std::fs::remove_dir_all(old) {
            tracing::warn!(error = %e, old = %old.display(), "failed to remove previous deployment");
        }
        Ok(())
    }

    /// Creates the slot symlink pointing at the target clone.
    pub fn link(&self) -> Result<()> {
        std::os::unix::fs::symlink(&self.target_clone_path, &self.symlink_path)?;
        tracing::info!(
            slot = %self.symlink_path.display(),
            target = %self.target_clone_path.display(),
            "linked slot"
        );
        Ok(())
    }
}

fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn slot(root: &Path) -> DeploymentSlot {
        DeploymentSlot::new(root, "widgets-m-1a2b3c4", "widgets-1a2b3c4d")
    }

    #[test]
    fn vacant_slot_needs_link() {
        let root = TempDir::new().unwrap();
        let slot = slot(root.path());
        assert_eq!(slot.inspect().unwrap(), SlotState::Vacant);
        assert!(!slot.reconcile(false).unwrap());
    }

    #[test]
    fn current_slot_is_left_alone() {
        let root = TempDir::new().unwrap();
        let slot = slot(root.path());
        std::fs::create_dir(slot.target_clone_path()).unwrap();
        slot.link().unwrap();

        assert_eq!(slot.inspect().unwrap(), SlotState::Current);
        assert!(slot.reconcile(false).unwrap());
        assert!(slot.symlink_path().exists());
    }

    #[test]
    fn relative_link_to_target_counts_as_current() {
        let root = TempDir::new().unwrap();
        let slot = slot(root.path());
        std::fs::create_dir(slot.target_clone_path()).unwrap();
        symlink("widgets-1a2b3c4d", slot.symlink_path()).unwrap();
        assert_eq!(slot.inspect().unwrap(), SlotState::Current);
    }

    #[test]
    fn dangling_slot_is_removed() {
        let root = TempDir::new().unwrap();
        let slot = slot(root.path());
        symlink(root.path().join("gone"), slot.symlink_path()).unwrap();

        assert!(matches!(slot.inspect().unwrap(), SlotState::Dangling(_)));
        assert!(!slot.reconcile(false).unwrap());
        assert!(std::fs::symlink_metadata(slot.symlink_path()).is_err());
    }

    #[test]
    fn slot_pointing_elsewhere_conflicts_without_update() {
        let root = TempDir::new().unwrap();
        let slot = slot(root.path());
        let other = root.path().join("widgets-other");
        std::fs::create_dir(&other).unwrap();
        symlink(&other, slot.symlink_path()).unwrap();

        let err = slot.reconcile(false).unwrap_err();
        assert!(matches!(err, Error::SlotConflict { existing, .. } if existing == other));
        assert!(other.exists());
    }

    #[test]
    fn slot_pointing_elsewhere_is_replaced_with_update() {
        let root = TempDir::new().unwrap();
        let slot = slot(root.path());
        let other = root.path().join("widgets-other");
        std::fs::create_dir(&other).unwrap();
        std::fs::write(other.join("app.py"), "").unwrap();
        symlink(&other, slot.symlink_path()).unwrap();

        // no stop.sh in the old tree: stopping fails but replacement proceeds
        assert!(!slot.reconcile(true).unwrap());
        assert!(std::fs::symlink_metadata(slot.symlink_path()).is_err());
        assert!(!other.exists());
    }

    #[test]
    fn real_directory_in_slot_conflicts() {
        let root = TempDir::new().unwrap();
        let slot = slot(root.path());
        std::fs::create_dir(slot.symlink_path()).unwrap();

        assert_eq!(slot.inspect().unwrap(), SlotState::Occupied);
        assert!(matches!(
            slot.reconcile(true).unwrap_err(),
            Error::SlotConflict { .. }
        ));
    }
}
