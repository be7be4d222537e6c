//! Scoped process environments for external tool invocations.
//!
//! A scope never mutates the engine's own process environment. It computes
//! an [`EnvOverlay`] from a snapshot taken on entry and applies it to each
//! [`Command`] spawned through the scope, so leaving the scope (normally, by
//! `?`, or by unwinding) leaves the parent environment exactly as it was.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::{Error, Result};

/// Variables cleared for every sandboxed command.
pub const CLEARED_VARS: &[&str] = &[
    "VIRTUAL_ENV",
    "PYTHON_HOME",
    "PS1",
    "PYTHONPATH",
    "LIBRARY_ROOTS",
];

/// Shell-internal names never imported from an activation dump.
const EXCLUDED_SHELL_VARS: &[&str] = &[
    "IFS", "OPTIND", "PPID", "PS2", "PS4", "LINENO", "PWD", "OLDPWD", "_",
];

/// Longest stderr excerpt kept in a [`Error::SetupFailed`].
const STDERR_TAIL: usize = 2000;

/// Environment changes applied to every command spawned inside a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    unset: BTreeSet<String>,
    set: BTreeMap<String, String>,
}

impl EnvOverlay {
    /// Baseline isolation computed from the current process environment.
    pub fn baseline() -> Self {
        Self::baseline_from(std::env::vars_os().filter_map(|(k, v)| {
            Some((k.into_string().ok()?, v.into_string().ok()?))
        }))
    }

    /// Baseline isolation computed from an explicit environment snapshot.
    ///
    /// Every name in [`CLEARED_VARS`] is removed. `PATH` loses its first
    /// segment when that segment is a `venv/bin` directory.
    pub fn baseline_from<I, K, V>(snapshot: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut overlay = Self {
            unset: CLEARED_VARS.iter().map(|v| v.to_string()).collect(),
            set: BTreeMap::new(),
        };

        for (name, value) in snapshot {
            let name = name.into();
            if name != "PATH" {
                continue;
            }
            if let Some(stripped) = strip_venv_path_segment(&value.into()) {
                overlay.set.insert(name, stripped);
            }
        }

        overlay
    }

    /// Layers explicit assignments over this overlay.
    pub fn with_vars(mut self, vars: BTreeMap<String, String>) -> Self {
        for (name, value) in vars {
            self.unset.remove(&name);
            self.set.insert(name, value);
        }
        self
    }

    /// Applies the overlay to a command.
    pub fn apply<'a>(&self, cmd: &'a mut Command) -> &'a mut Command {
        for name in &self.unset {
            cmd.env_remove(name);
        }
        cmd.envs(&self.set)
    }

    /// Value a spawned command would see for `name`.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.set.get(name) {
            return Some(value.clone());
        }
        if self.unset.contains(name) {
            return None;
        }
        std::env::var(name).ok()
    }

    /// Names removed from spawned commands.
    pub fn unset_vars(&self) -> &BTreeSet<String> {
        &self.unset
    }

    /// Names assigned in spawned commands.
    pub fn set_vars(&self) -> &BTreeMap<String, String> {
        &self.set
    }
}

/// Returns `path` without its first segment when that segment ends in `venv/bin`.
///
/// A `PATH` consisting of that single segment is left alone.
pub fn strip_venv_path_segment(path: &str) -> Option<String> {
    let (first, rest) = path.split_once(':')?;
    if first.trim_end_matches('/').ends_with("venv/bin") {
        Some(rest.to_string())
    } else {
        None
    }
}

/// Parses a shell `set` dump, keeping only assignments after `marker`.
pub fn parse_env_dump(output: &str, marker: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let mut past_marker = false;

    for line in output.lines() {
        if !past_marker {
            past_marker = line.trim() == marker;
            continue;
        }
        let Some((name, value)) = line.trim_end().split_once('=') else {
            continue;
        };
        if !is_shell_name(name) || EXCLUDED_SHELL_VARS.contains(&name) {
            continue;
        }
        vars.insert(name.to_string(), unquote(value).to_string());
    }

    vars
}

fn is_shell_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// An active sandbox scope.
#[derive(Debug, Clone)]
pub struct SandboxScope {
    overlay: EnvOverlay,
    venv: Option<PathBuf>,
}

impl SandboxScope {
    /// The overlay applied to commands from this scope.
    pub fn overlay(&self) -> &EnvOverlay {
        &self.overlay
    }

    /// The venv this scope activates, if any.
    pub fn venv(&self) -> Option<&Path> {
        self.venv.as_deref()
    }

    /// Builds a command carrying this scope's environment.
    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut cmd = Command::new(program);
        self.overlay.apply(&mut cmd);
        cmd
    }

    /// Runs `cmd` to completion, failing with [`Error::SetupFailed`] on a non-zero exit.
    pub fn run(&self, step: &str, cmd: &mut Command) -> Result<Output> {
        tracing::debug!(
            step,
            program = ?cmd.get_program(),
            args = ?cmd.get_args().collect::<Vec<_>>(),
            cwd = ?cmd.get_current_dir(),
            "running sandboxed command"
        );

        let output = cmd.output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(step, status = %output.status, stdout = %stdout, stderr = %stderr, "command finished");

        if !output.status.success() {
            return Err(Error::SetupFailed {
                step: step.to_string(),
                status: output.status,
                stderr: tail(&stderr, STDERR_TAIL).to_string(),
            });
        }
        Ok(output)
    }
}

fn tail(text: &str, max: usize) -> &str {
    let text = text.trim_end();
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Runs `body` with the baseline environment: venv variables cleared and any
/// leading `venv/bin` removed from `PATH`.
pub fn with_baseline_environment<T>(body: impl FnOnce(&SandboxScope) -> Result<T>) -> Result<T> {
    let scope = SandboxScope {
        overlay: EnvOverlay::baseline(),
        venv: None,
    };
    body(&scope)
}

/// Runs `body` with the venv at `venv` activated on top of the baseline.
///
/// The activation script is sourced in a subshell which then prints a unique
/// marker and its variables; every assignment after the marker becomes part
/// of the overlay.
pub fn with_venv<T>(venv: &Path, body: impl FnOnce(&SandboxScope) -> Result<T>) -> Result<T> {
    let baseline = EnvOverlay::baseline();
    let vars = activation_vars(venv, &baseline)?;
    tracing::debug!(venv = %venv.display(), count = vars.len(), "imported venv activation overlay");

    let scope = SandboxScope {
        overlay: baseline.with_vars(vars),
        venv: Some(venv.to_path_buf()),
    };
    body(&scope)
}

fn activation_vars(venv: &Path, baseline: &EnvOverlay) -> Result<BTreeMap<String, String>> {
    let activate = venv.join("bin").join("activate");
    if !activate.is_file() {
        return Err(Error::Venv {
            venv: venv.to_path_buf(),
            reason: format!("missing activation script {}", activate.display()),
        });
    }

    let marker = format!("~~AUTODEPLOY-{}~~", uuid::Uuid::new_v4().simple());
    let mut cmd = Command::new("/bin/sh");
    cmd.args(["-c", ". \"$1\" && echo \"$2\" && set", "sh"])
        .arg(&activate)
        .arg(&marker);
    if let Some(parent) = venv.parent() {
        cmd.current_dir(parent);
    }
    baseline.apply(&mut cmd);

    let output = cmd.output()?;
    if !output.status.success() {
        return Err(Error::Venv {
            venv: venv.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(parse_env_dump(&String::from_utf8_lossy(&output.stdout), &marker))
}
