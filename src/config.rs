//! Engine and per-project configuration.
//!
//! [`DeployConfig`] controls the engine itself (interpreter, pinned tool
//! requirements, run-script defaults). [`ProjectConfig`] is the optional
//! `autodeploy.toml` a deployed project can ship to override how its run
//! script is generated.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming an engine configuration file.
pub const CONFIG_ENV: &str = "AUTODEPLOY_CONFIG";

/// File name of the optional per-project configuration.
pub const PROJECT_CONFIG_FILE: &str = "autodeploy.toml";

/// Log levels accepted by the process server.
pub const KNOWN_LOG_LEVELS: &[&str] = &["debug", "info", "warning", "error", "critical"];

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

/// Engine-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Host interpreter used to create venvs.
    #[serde(default = "default_python")]
    pub python: String,
    /// Requirement string for the process-server runtime.
    #[serde(default = "default_server_requirement")]
    pub server_requirement: String,
    /// Requirement string for the poetry tool.
    #[serde(default = "default_poetry_requirement")]
    pub poetry_requirement: String,
    /// Log level baked into generated run scripts.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Worker count when neither the project nor classification sets one.
    #[serde(default = "default_workers")]
    pub workers: u32,
    /// Thread count when the project does not set one.
    #[serde(default = "default_threads")]
    pub threads: u32,
    /// Launch the run script after a successful `add`.
    #[serde(default = "default_launch_after_setup")]
    pub launch_after_setup: bool,
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_server_requirement() -> String {
    "gunicorn>=20.0.1,<20.99".to_string()
}

fn default_poetry_requirement() -> String {
    "poetry>=1.0.2,<2.0".to_string()
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_workers() -> u32 {
    1
}

fn default_threads() -> u32 {
    4
}

fn default_launch_after_setup() -> bool {
    true
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            server_requirement: default_server_requirement(),
            poetry_requirement: default_poetry_requirement(),
            log_level: default_log_level(),
            workers: default_workers(),
            threads: default_threads(),
            launch_after_setup: default_launch_after_setup(),
        }
    }
}

impl DeployConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: DeployConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))?;

        for warning in config.validate().into_result()? {
            tracing::warn!(path = %path.display(), "{}", warning);
        }
        Ok(config)
    }

    /// Loads the file named by `AUTODEPLOY_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}

impl Validate for DeployConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.python.trim().is_empty() {
            result.add_error("python cannot be empty");
        }
        if self.server_requirement.trim().is_empty() {
            result.add_error("server_requirement cannot be empty");
        }
        if self.workers == 0 {
            result.add_error("workers must be at least 1");
        }
        if self.threads == 0 {
            result.add_error("threads must be at least 1");
        }
        if !KNOWN_LOG_LEVELS.contains(&self.log_level.as_str()) {
            result.add_warning(format!("unknown log_level '{}'", self.log_level));
        }

        result
    }
}

/// Optional per-project overrides read from `autodeploy.toml`.
///
/// Unknown keys are ignored so projects can share the file with other tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Entrypoint module handed to the process server.
    #[serde(default)]
    pub app_module: Option<String>,
    /// Worker process count.
    #[serde(default)]
    pub workers: Option<u32>,
    /// Threads per worker.
    #[serde(default)]
    pub threads: Option<u32>,
    /// Worker class passed as `-k`.
    #[serde(default)]
    pub worker_class: Option<String>,
}

impl ProjectConfig {
    /// Reads `autodeploy.toml` from `project_dir`; an absent file yields defaults.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(PROJECT_CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: ProjectConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))?;

        let validation = config.validate();
        for warning in &validation.warnings {
            tracing::warn!(path = %path.display(), "{}", warning);
        }
        validation.into_result()?;
        Ok(config)
    }
}

impl Validate for ProjectConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.workers == Some(0) {
            result.add_error("workers must be at least 1");
        }
        if self.threads == Some(0) {
            result.add_error("threads must be at least 1");
        }
        if let Some(module) = &self.app_module {
            if module.trim().is_empty() {
                result.add_error("app_module cannot be empty");
            } else if module.contains(char::is_whitespace) {
                result.add_warning(format!("app_module '{}' contains whitespace", module));
            }
        }
        if let Some(class) = &self.worker_class {
            if class.trim().is_empty() {
                result.add_error("worker_class cannot be empty");
            }
        }

        result
    }
}
