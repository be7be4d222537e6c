//! Isolated interpreter environments.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::env::with_baseline_environment;

/// A venv inside a project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Venv {
    root: PathBuf,
    python: PathBuf,
    pip: PathBuf,
    installed: bool,
}

impl Venv {
    /// Describes the venv at `root` without creating anything.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let bin = root.join("bin");
        let python = bin.join("python3");
        let pip = bin.join("pip3");
        let installed = bin.join("activate").is_file() && python.exists();
        Self {
            root,
            python,
            pip,
            installed,
        }
    }

    /// Returns the venv `parent/name`, creating it with `host_python` if absent.
    ///
    /// An existing venv is reused as-is; this is never destructive.
    pub fn ensure(parent: &Path, name: &str, host_python: &str) -> Result<Self> {
        let existing = Self::at(parent.join(name));
        if existing.installed {
            tracing::info!(venv = %existing.root.display(), "reusing existing venv");
            return Ok(existing);
        }

        with_baseline_environment(|scope| {
            let mut cmd = scope.command(host_python);
            cmd.args(["-m", "venv", "--symlinks", name])
                .current_dir(parent);
            scope.run("create venv", &mut cmd)
        })?;

        let venv = Self::at(parent.join(name));
        if !venv.installed {
            return Err(Error::Venv {
                venv: venv.root,
                reason: "interpreter missing after creation".to_string(),
            });
        }
        tracing::info!(venv = %venv.root.display(), python = %venv.python().display(), "created venv");
        Ok(venv)
    }

    /// Root directory of the venv.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The venv's interpreter.
    pub fn python(&self) -> &Path {
        &self.python
    }

    /// The venv's pip.
    pub fn pip(&self) -> &Path {
        &self.pip
    }

    /// Path of an executable installed into the venv.
    pub fn bin(&self, name: &str) -> PathBuf {
        self.root.join("bin").join(name)
    }

    /// Whether the venv exists on disk with a usable interpreter.
    pub fn is_installed(&self) -> bool {
        self.installed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn describes_missing_venv_as_not_installed() {
        let dir = TempDir::new().unwrap();
        let venv = Venv::at(dir.path().join("dynvenv"));
        assert!(!venv.is_installed());
        assert_eq!(venv.python(), dir.path().join("dynvenv/bin/python3"));
        assert_eq!(venv.pip(), dir.path().join("dynvenv/bin/pip3"));
        assert_eq!(venv.bin("gunicorn"), dir.path().join("dynvenv/bin/gunicorn"));
    }

    #[test]
    fn ensure_reuses_existing_venv_without_running_python() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join(".venv/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("activate"), "").unwrap();
        std::fs::write(bin.join("python3"), "").unwrap();

        let venv = Venv::ensure(dir.path(), ".venv", "/nonexistent/python").unwrap();
        assert!(venv.is_installed());
        assert_eq!(venv.root(), dir.path().join(".venv"));
    }

    #[test]
    fn ensure_surfaces_interpreter_failure() {
        let dir = TempDir::new().unwrap();
        let err = Venv::ensure(dir.path(), "dynvenv", "false").unwrap_err();
        assert!(matches!(err, Error::SetupFailed { .. }));
    }

    #[test]
    #[ignore] // Requires python3 with the venv module
    fn ensure_creates_venv_with_host_python() {
        let dir = TempDir::new().unwrap();
        let venv = Venv::ensure(dir.path(), "dynvenv", "python3").unwrap();
        assert!(venv.is_installed());
        assert!(venv.pip().exists());
    }
}
