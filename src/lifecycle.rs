//! Launching and stopping deployments through their generated scripts.
//!
//! Both operations run under the baseline environment so a venv active in
//! the engine's own process never leaks into the deployed application.

use std::path::Path;

use crate::error::{Error, Result};
use crate::pipeline::{RUN_SCRIPT, STOP_SCRIPT};
use crate::sandbox::with_baseline_environment;

/// File receiving the output of detached scripts.
pub const NOHUP_LOG: &str = "nohup.out";

/// Starts `run.sh` detached from the caller.
///
/// The script is started through a short-lived shell that backgrounds it
/// under `nohup`, so it outlives the caller and is never left as a zombie.
pub fn launch(project_dir: &Path) -> Result<()> {
    require_script(project_dir, RUN_SCRIPT)?;
    tracing::info!(project = %project_dir.display(), "launching deployment");
    spawn_detached(project_dir, RUN_SCRIPT)
}

/// Runs `stop.sh`.
///
/// With `wait` the script runs to completion and a non-zero exit is an
/// error; otherwise it is started detached and not observed.
pub fn stop(project_dir: &Path, wait: bool) -> Result<()> {
    let script = require_script(project_dir, STOP_SCRIPT)?;
    tracing::info!(project = %project_dir.display(), wait, "stopping deployment");

    if !wait {
        return spawn_detached(project_dir, STOP_SCRIPT);
    }

    let status = with_baseline_environment(|scope| {
        Ok(scope
            .command(format!("./{}", STOP_SCRIPT))
            .current_dir(project_dir)
            .status()?)
    })?;
    if !status.success() {
        return Err(Error::ScriptFailed { script, status });
    }
    Ok(())
}

fn require_script(project_dir: &Path, name: &str) -> Result<std::path::PathBuf> {
    let script = project_dir.join(name);
    if !script.is_file() {
        return Err(Error::MissingScript(script));
    }
    Ok(script)
}

fn spawn_detached(project_dir: &Path, script: &str) -> Result<()> {
    let line = format!("nohup ./{} >>{} 2>&1 </dev/null &", script, NOHUP_LOG);
    let status = with_baseline_environment(|scope| {
        Ok(scope
            .command("/bin/sh")
            .args(["-c", &line])
            .current_dir(project_dir)
            .status()?)
    })?;
    if !status.success() {
        return Err(Error::ScriptFailed {
            script: project_dir.join(script),
            status,
        });
    }
    Ok(())
}
