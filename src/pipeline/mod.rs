//! Project setup: detection, venv provisioning, dependency installation and
//! lifecycle script generation.

mod detect;
mod install;
mod scripts;
mod setup_py;

pub use detect::{classify, requirement_name, Framework, ProjectKind, ProjectManifest};
pub use install::{Installer, POETRY_EXPORT_FILE};
pub use scripts::{RunScripts, ScriptParams, WrittenScripts};
pub use setup_py::{extract_install_requires, read_install_requires};

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{DeployConfig, ProjectConfig};
use crate::error::{Error, Result};
use crate::sandbox::{with_venv, Venv};

/// Script that starts the process server.
pub const RUN_SCRIPT: &str = "run.sh";
/// Script that stops it with signal escalation.
pub const STOP_SCRIPT: &str = "stop.sh";
/// Unix socket the process server binds, relative to the project directory.
pub const SOCKET_FILE: &str = "gunicorn.sock";
/// Pid file the process server writes, relative to the project directory.
pub const PID_FILE: &str = "gunicorn.pid";
/// Native process-server configuration a project may ship.
pub const SERVER_CONFIG_FILE: &str = "gunicorn.conf.py";

/// Result of a completed setup.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedProject {
    pub project_dir: PathBuf,
    pub venv: PathBuf,
    pub manifest: ProjectManifest,
    pub params: ScriptParams,
    pub written: WrittenScripts,
}

/// Sets up checked-out projects for serving.
#[derive(Debug, Clone, Default)]
pub struct ProjectSetup {
    config: DeployConfig,
}

impl ProjectSetup {
    pub fn new(config: DeployConfig) -> Self {
        Self { config }
    }

    /// Sets up `project_dir`; false when the project type is not recognized.
    ///
    /// Install failures are errors, not a false return.
    pub fn setup(&self, project_dir: &Path) -> Result<bool> {
        match self.prepare(project_dir) {
            Ok(_) => Ok(true),
            Err(Error::UnrecognizedProjectType(dir)) => {
                tracing::warn!(project = %dir.display(), "unrecognized project type, nothing deployed");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Runs the full pipeline and reports what it produced.
    pub fn prepare(&self, project_dir: &Path) -> Result<PreparedProject> {
        let kind = ProjectKind::detect(project_dir);
        if kind == ProjectKind::Unknown {
            return Err(Error::UnrecognizedProjectType(project_dir.to_path_buf()));
        }
        tracing::info!(project = %project_dir.display(), ?kind, "detected project kind");

        // Read before any install work so a bad file fails fast.
        let project_config = ProjectConfig::load(project_dir)?;

        let venv = Venv::ensure(project_dir, kind.venv_name(), &self.config.python)?;
        let requirements = with_venv(venv.root(), |scope| {
            let installer = Installer::new(&self.config, project_dir, &venv, scope);
            let requirements = installer.install_project(kind)?;
            installer.install_server()?;
            Ok(requirements)
        })?;

        let manifest = ProjectManifest::new(kind, requirements);
        tracing::info!(
            project = %project_dir.display(),
            framework = ?manifest.detected_framework,
            requirements = manifest.requirements.len(),
            "classified project"
        );

        let params = ScriptParams::resolve(
            project_dir,
            venv.root(),
            &self.config,
            &project_config,
            &manifest,
        )?;
        let scripts = RunScripts::render(params);
        let written = scripts.write_if_absent(project_dir)?;

        Ok(PreparedProject {
            project_dir: project_dir.to_path_buf(),
            venv: venv.root().to_path_buf(),
            manifest,
            params: scripts.params,
            written,
        })
    }
}
