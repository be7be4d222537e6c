//! Generation of the `run.sh` / `stop.sh` pair.
//!
//! Existing deployments invoke these scripts directly, so their layout and
//! behavior are kept stable. A script already present in the project
//! directory is never overwritten.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{DeployConfig, ProjectConfig};
use crate::error::Result;

use super::detect::ProjectManifest;
use super::{PID_FILE, RUN_SCRIPT, SERVER_CONFIG_FILE, SOCKET_FILE, STOP_SCRIPT};

/// Entrypoint modules probed in order when none is configured.
const ENTRYPOINTS: &[(&str, &str)] = &[
    ("app.py", "app"),
    ("wsgi.py", "wsgi"),
    ("application.py", "application"),
];

const FALLBACK_ENTRYPOINT: &str = "app";

/// Everything baked into the generated scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptParams {
    pub venv: PathBuf,
    pub log_level: String,
    pub workers: u32,
    pub threads: u32,
    pub worker_class: Option<String>,
    pub app_module: String,
    pub proc_name: String,
    /// Whether the server reads the project's own `gunicorn.conf.py`.
    pub server_config: bool,
}

impl ScriptParams {
    /// Resolves parameters: project config over framework classification
    /// over engine defaults.
    pub fn resolve(
        project_dir: &Path,
        venv_root: &Path,
        config: &DeployConfig,
        project: &ProjectConfig,
        manifest: &ProjectManifest,
    ) -> Result<Self> {
        let app_module = match &project.app_module {
            Some(module) => module.clone(),
            None => entrypoint(project_dir).to_string(),
        };
        let worker_class = project
            .worker_class
            .clone()
            .or_else(|| manifest.worker_class().map(str::to_string));

        let absolute = std::path::absolute(project_dir)?;
        let proc_name = absolute
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            venv: std::path::absolute(venv_root)?,
            log_level: config.log_level.clone(),
            workers: project.workers.unwrap_or(config.workers),
            threads: project.threads.unwrap_or(config.threads),
            worker_class,
            app_module,
            proc_name,
            server_config: project_dir.join(SERVER_CONFIG_FILE).is_file(),
        })
    }

    fn extra_args(&self) -> String {
        let mut extra = Vec::new();
        if self.server_config {
            extra.push(format!("-c ./{}", SERVER_CONFIG_FILE));
        }
        if let Some(class) = &self.worker_class {
            extra.push(format!("-k {}", class));
        }
        extra.join(" ")
    }
}

fn entrypoint(project_dir: &Path) -> &'static str {
    ENTRYPOINTS
        .iter()
        .find(|(file, _)| project_dir.join(file).exists())
        .map(|(_, module)| *module)
        .unwrap_or(FALLBACK_ENTRYPOINT)
}

/// Rendered script contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunScripts {
    pub params: ScriptParams,
    pub run: String,
    pub stop: String,
}

/// Which scripts a call to [`RunScripts::write_if_absent`] created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WrittenScripts {
    pub run: bool,
    pub stop: bool,
}

impl RunScripts {
    pub fn render(params: ScriptParams) -> Self {
        let venv = params.venv.display();
        let run = format!(
            "#!/bin/sh\n\
             . {venv}/bin/activate\n\
             exec {venv}/bin/gunicorn --log-level {log_level} -b unix:./{sock} --pid ./{pid} \
             --workers {workers} --threads {threads} -n {name} {extra} {target}\n",
            log_level = params.log_level,
            sock = SOCKET_FILE,
            pid = PID_FILE,
            workers = params.workers,
            threads = params.threads,
            name = params.proc_name,
            extra = params.extra_args(),
            target = params.app_module,
        );
        let stop = stop_script();
        Self { params, run, stop }
    }

    /// Writes each script unless a file of that name already exists.
    pub fn write_if_absent(&self, project_dir: &Path) -> Result<WrittenScripts> {
        let written = WrittenScripts {
            run: write_executable(&project_dir.join(RUN_SCRIPT), &self.run)?,
            stop: write_executable(&project_dir.join(STOP_SCRIPT), &self.stop)?,
        };
        tracing::info!(
            project = %project_dir.display(),
            run = written.run,
            stop = written.stop,
            "wrote lifecycle scripts"
        );
        Ok(written)
    }
}

fn stop_script() -> String {
    format!(
        r#"#!/bin/sh
PIDFILE=./{pid}
SOCKFILE=./{sock}
if [ ! -f "$PIDFILE" ]; then
    exit 0
fi

read PID <$PIDFILE
kill -WINCH $PID
sleep 5
if [ -f "$PIDFILE" ]; then
    kill -TERM $PID
    sleep 10
fi

if [ -f "$PIDFILE" ]; then
    kill -9 $PID
    sleep 1
fi

rm -rf "$SOCKFILE"
rm -rf "$PIDFILE"
exit 0
"#,
        pid = PID_FILE,
        sock = SOCKET_FILE,
    )
}

/// Creates `path` with `content`, executable by everyone.
///
/// Returns false, leaving the file untouched, when it already exists.
fn write_executable(path: &Path, content: &str) -> Result<bool> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            tracing::debug!(script = %path.display(), "keeping existing script");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))?;
    Ok(true)
}
