//! The engine façade used by front ends.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::acquire::{GitAcquirer, RefSpec};
use crate::config::DeployConfig;
use crate::error::Result;
use crate::inventory::{self, ProjectEntry};
use crate::lifecycle;
use crate::pipeline::ProjectSetup;
use crate::request::{AddParams, AddRequest, AddResponse};

/// Result of an `add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    /// Slot symlink the project is reachable through.
    pub slot: PathBuf,
    /// Whether setup recognized and prepared the project.
    pub success: bool,
    /// Whether the run script was started.
    pub launched: bool,
}

impl From<&AddOutcome> for AddResponse {
    fn from(outcome: &AddOutcome) -> Self {
        AddResponse {
            success: outcome.success,
        }
    }
}

/// Acquires, sets up and runs projects under one root.
#[derive(Debug, Clone)]
pub struct Deployer {
    acquirer: GitAcquirer,
    setup: ProjectSetup,
    config: DeployConfig,
}

impl Deployer {
    pub fn new(root: impl Into<PathBuf>, config: DeployConfig) -> Self {
        Self {
            acquirer: GitAcquirer::new(root),
            setup: ProjectSetup::new(config.clone()),
            config,
        }
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        self.acquirer.root()
    }

    /// Validates a raw request, then runs [`Deployer::add`].
    ///
    /// Validation errors are returned before anything touches disk or network.
    pub fn handle_add(&self, request: &AddRequest) -> Result<AddOutcome> {
        let params = request.validate()?;
        self.add(&params)
    }

    /// Acquires the requested ref, sets the project up and optionally launches it.
    pub fn add(&self, params: &AddParams) -> Result<AddOutcome> {
        tracing::info!(origin = %params.origin, reference = %params.ref_spec, "adding project");
        self.add_ref(
            &params.origin,
            &params.ref_spec,
            params.dirname.as_deref(),
            params.do_update,
        )
    }

    /// Like [`Deployer::add`] with explicit arguments.
    pub fn add_ref(
        &self,
        origin: &str,
        ref_spec: &RefSpec,
        dirname: Option<&str>,
        do_update: bool,
    ) -> Result<AddOutcome> {
        let slot = self.acquirer.acquire(origin, ref_spec, dirname, do_update)?;
        let success = self.setup.setup(&slot)?;

        let launched = success && self.config.launch_after_setup;
        if launched {
            lifecycle::launch(&slot)?;
        }
        tracing::info!(slot = %slot.display(), success, launched, "finished adding project");

        Ok(AddOutcome {
            slot,
            success,
            launched,
        })
    }

    /// Lists deployed working directories under the root.
    pub fn list(&self) -> Result<Vec<ProjectEntry>> {
        inventory::list_projects(self.root())
    }

    /// Runs setup on an already checked-out project directory.
    pub fn setup(&self, project_dir: &Path) -> Result<bool> {
        self.setup.setup(project_dir)
    }

    pub fn launch(&self, project_dir: &Path) -> Result<()> {
        lifecycle::launch(project_dir)
    }

    pub fn stop(&self, project_dir: &Path, wait: bool) -> Result<()> {
        lifecycle::stop(project_dir, wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    #[test]
    fn invalid_request_fails_before_touching_the_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("deployments");
        let deployer = Deployer::new(&root, DeployConfig::default());

        let request = AddRequest {
            origin: Some("https://git.example.com/scm/team/widgets.git".to_string()),
            tag: Some("v1".to_string()),
            commit: Some("abc1234".to_string()),
            ..Default::default()
        };
        let err = deployer.handle_add(&request).unwrap_err();
        assert!(matches!(err, Error::InvalidRefSpec(_)));
        assert!(!root.exists());
    }

    #[test]
    fn outcome_maps_to_response_body() {
        let outcome = AddOutcome {
            slot: PathBuf::from("/srv/widgets-m-1a2b3c4"),
            success: false,
            launched: false,
        };
        assert_eq!(AddResponse::from(&outcome), AddResponse { success: false });
    }

    #[test]
    fn list_reads_the_root() {
        let dir = TempDir::new().unwrap();
        let deployer = Deployer::new(dir.path(), DeployConfig::default());
        assert!(deployer.list().unwrap().is_empty());
        assert_eq!(deployer.root(), dir.path());
    }
}
