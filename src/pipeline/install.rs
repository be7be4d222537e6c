//! Dependency installation inside a project's venv.

use std::path::Path;

use crate::config::DeployConfig;
use crate::error::Result;
use crate::sandbox::{SandboxScope, Venv};

use super::detect::ProjectKind;
use super::setup_py;

/// Temporary file poetry exports locked requirements into.
pub const POETRY_EXPORT_FILE: &str = "tempreq.txt";

/// Runs install steps for one project within an activated venv scope.
pub struct Installer<'a> {
    config: &'a DeployConfig,
    project_dir: &'a Path,
    venv: &'a Venv,
    scope: &'a SandboxScope,
}

impl<'a> Installer<'a> {
    pub fn new(
        config: &'a DeployConfig,
        project_dir: &'a Path,
        venv: &'a Venv,
        scope: &'a SandboxScope,
    ) -> Self {
        Self {
            config,
            project_dir,
            venv,
            scope,
        }
    }

    /// Installs the project's dependencies and returns its requirement lines.
    pub fn install_project(&self, kind: ProjectKind) -> Result<Vec<String>> {
        self.bootstrap()?;
        match kind {
            ProjectKind::Poetry => self.install_poetry(),
            ProjectKind::SetupPy => self.install_setup_py(),
            ProjectKind::Requirements => self.install_requirements(),
            ProjectKind::Unknown => Ok(Vec::new()),
        }
    }

    /// Installs the process-server runtime.
    pub fn install_server(&self) -> Result<()> {
        self.pip("install server", &["install", &self.config.server_requirement])
    }

    fn bootstrap(&self) -> Result<()> {
        self.pip("install setuptools", &["install", "setuptools", "wheel"])
    }

    fn install_poetry(&self) -> Result<Vec<String>> {
        self.pip("install poetry", &["install", &self.config.poetry_requirement])?;

        let poetry = self.venv.bin("poetry");
        self.tool(
            "configure poetry",
            &poetry,
            &["config", "--local", "virtualenvs.in-project", "true"],
        )?;

        let export = self.project_dir.join(POETRY_EXPORT_FILE);
        let exported = self
            .tool(
                "export requirements",
                &poetry,
                &[
                    "export",
                    "-f",
                    "requirements.txt",
                    "--without-hashes",
                    "-o",
                    POETRY_EXPORT_FILE,
                ],
            )
            .and_then(|()| read_lines(&export));
        if export.exists() {
            if let Err(e) = std::fs::remove_file(&export) {
                tracing::warn!(error = %e, file = %export.display(), "failed to remove exported requirements");
            }
        }
        let requirements = exported?;

        self.tool("poetry install", &poetry, &["install"])?;
        Ok(requirements)
    }

    fn install_setup_py(&self) -> Result<Vec<String>> {
        let requirements = setup_py::read_install_requires(self.project_dir)?;
        self.pip("install project", &["install", "."])?;
        Ok(requirements)
    }

    fn install_requirements(&self) -> Result<Vec<String>> {
        let requirements = read_lines(&self.project_dir.join("requirements.txt"))?;
        self.pip("install requirements", &["install", "-r", "requirements.txt"])?;
        Ok(requirements)
    }

    fn pip(&self, step: &str, args: &[&str]) -> Result<()> {
        self.tool(step, self.venv.pip(), args)
    }

    fn tool(&self, step: &str, program: &Path, args: &[&str]) -> Result<()> {
        tracing::info!(step, project = %self.project_dir.display(), "running install step");
        let mut cmd = self.scope.command(program);
        cmd.args(args).current_dir(self.project_dir);
        self.scope.run(step, &mut cmd)?;
        Ok(())
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(str::to_string)
        .collect())
}
