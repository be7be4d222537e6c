//! Thin wrapper over the `git` CLI.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Runs `git` in `cwd`, isolated from any ambient repository selection and
/// unable to prompt for credentials.
pub(crate) fn git<I, S>(cwd: &Path, args: I) -> std::io::Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new("git");
    cmd.current_dir(cwd)
        .args(args)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .env_remove("GIT_INDEX_FILE")
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null());

    tracing::debug!(cwd = %cwd.display(), args = ?cmd.get_args().collect::<Vec<_>>(), "running git");
    let output = cmd.output()?;
    if !output.status.success() {
        tracing::debug!(status = %output.status, stderr = %stderr(&output), "git exited non-zero");
    }
    Ok(output)
}

/// Trimmed stderr of a finished command.
pub(crate) fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Trimmed stdout of a finished command.
pub(crate) fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
