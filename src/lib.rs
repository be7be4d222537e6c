//! Autodeploy - self-hosted deployment engine for Python web projects
//!
//! This library pins a git ref to an exact commit, materializes it in a
//! content-addressed directory behind a named slot symlink, provisions an
//! isolated venv, installs the project's dependencies and generates the
//! `run.sh` / `stop.sh` pair that serves it on a local Unix socket.

pub mod acquire;
pub mod config;
pub mod deploy;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod pipeline;
pub mod request;
pub mod sandbox;

pub use error::{Error, RefSpecError, Result};

pub use acquire::{
    guess_project_name, path_friendly, project_name, Acquisition, DeploymentSlot, GitAcquirer,
    PinnedCommit, RefSpec, SlotState, DEFAULT_BRANCH,
};
pub use config::{DeployConfig, ProjectConfig, Validate, ValidationResult};
pub use deploy::{AddOutcome, Deployer};
pub use inventory::{list_projects, ProjectEntry};
pub use lifecycle::{launch, stop};
pub use pipeline::{
    Framework, PreparedProject, ProjectKind, ProjectManifest, ProjectSetup, RunScripts,
    ScriptParams,
};
pub use request::{is_truthy, AddParams, AddRequest, AddResponse, ErrorResponse};
pub use sandbox::{with_baseline_environment, with_venv, EnvOverlay, SandboxScope, Venv};
