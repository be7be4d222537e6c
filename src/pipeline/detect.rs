//! Project type detection and application framework classification.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// How a checked-out project declares its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectKind {
    /// `pyproject.toml`, installed with poetry.
    Poetry,
    /// `setup.py`, installed with pip.
    SetupPy,
    /// Bare `requirements.txt`.
    Requirements,
    /// Nothing recognized.
    Unknown,
}

impl ProjectKind {
    /// Detects the kind from the files in `project_dir`; first match wins.
    pub fn detect(project_dir: &Path) -> Self {
        [
            (ProjectKind::Poetry, "pyproject.toml"),
            (ProjectKind::SetupPy, "setup.py"),
            (ProjectKind::Requirements, "requirements.txt"),
        ]
        .into_iter()
        .find(|(_, file)| project_dir.join(file).is_file())
        .map(|(kind, _)| kind)
        .unwrap_or(ProjectKind::Unknown)
    }

    /// Directory name of the venv created for this kind.
    ///
    /// Poetry gets `.venv` so `virtualenvs.in-project` picks up the same one.
    pub fn venv_name(&self) -> &'static str {
        match self {
            ProjectKind::Poetry => ".venv",
            _ => "dynvenv",
        }
    }
}

/// Application frameworks that need a dedicated worker class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Sanic,
    Tornado,
    Flask,
}

impl Framework {
    /// Frameworks in classification priority order.
    pub const PRIORITY: [Framework; 3] = [Framework::Sanic, Framework::Tornado, Framework::Flask];

    /// Package name as it appears in requirement lines.
    pub fn package(&self) -> &'static str {
        match self {
            Framework::Sanic => "sanic",
            Framework::Tornado => "tornado",
            Framework::Flask => "flask",
        }
    }

    /// Process-server worker class, or None for plain WSGI apps.
    pub fn worker_class(&self) -> Option<&'static str> {
        match self {
            Framework::Sanic => Some("sanic.worker.GunicornWorker"),
            Framework::Tornado => Some("tornado"),
            Framework::Flask => None,
        }
    }
}

/// Bare package name of one requirement line, if it names a package.
///
/// Indented continuation lines and `--option` lines carry no package.
pub fn requirement_name(line: &str) -> Option<String> {
    if line.starts_with("  ") || line.starts_with('\t') || line.starts_with("--") {
        return None;
    }
    let line = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let line = line
        .trim()
        .trim_end_matches('\\')
        .trim()
        .trim_start_matches(['-', '!', ' ']);
    let end = line
        .find(['=', '>', '<', '!', ' ', '~', ';', '['])
        .unwrap_or(line.len());
    let name = line[..end].trim();
    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}

/// Classifies an application from its requirement lines.
pub fn classify<S: AsRef<str>>(requirements: &[S]) -> Option<Framework> {
    let names: Vec<String> = requirements
        .iter()
        .filter_map(|line| requirement_name(line.as_ref()))
        .collect();
    Framework::PRIORITY
        .into_iter()
        .find(|framework| names.iter().any(|name| name == framework.package()))
}

/// What the pipeline learned about a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub kind: ProjectKind,
    /// Raw requirement lines, in declaration order.
    pub requirements: Vec<String>,
    pub detected_framework: Option<Framework>,
}

impl ProjectManifest {
    /// Builds a manifest, classifying the framework from `requirements`.
    pub fn new(kind: ProjectKind, requirements: Vec<String>) -> Self {
        let detected_framework = classify(&requirements);
        Self {
            kind,
            requirements,
            detected_framework,
        }
    }

    /// Worker class implied by the detected framework.
    pub fn worker_class(&self) -> Option<&'static str> {
        self.detected_framework.and_then(|f| f.worker_class())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detection_prefers_pyproject_over_setup_py_and_requirements() {
        let dir = TempDir::new().unwrap();
        assert_eq!(ProjectKind::detect(dir.path()), ProjectKind::Unknown);

        std::fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
        assert_eq!(ProjectKind::detect(dir.path()), ProjectKind::Requirements);

        std::fs::write(dir.path().join("setup.py"), "").unwrap();
        assert_eq!(ProjectKind::detect(dir.path()), ProjectKind::SetupPy);

        std::fs::write(dir.path().join("pyproject.toml"), "").unwrap();
        assert_eq!(ProjectKind::detect(dir.path()), ProjectKind::Poetry);
    }

    #[test]
    fn directories_named_like_manifests_are_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("setup.py")).unwrap();
        assert_eq!(ProjectKind::detect(dir.path()), ProjectKind::Unknown);
    }

    #[test]
    fn venv_name_depends_on_kind() {
        assert_eq!(ProjectKind::Poetry.venv_name(), ".venv");
        assert_eq!(ProjectKind::SetupPy.venv_name(), "dynvenv");
        assert_eq!(ProjectKind::Requirements.venv_name(), "dynvenv");
    }

    #[test]
    fn requirement_names_are_bare_package_names() {
        assert_eq!(requirement_name("flask==2.0.1").as_deref(), Some("flask"));
        assert_eq!(requirement_name("Sanic>=20.12,<21").as_deref(), Some("sanic"));
        assert_eq!(
            requirement_name("tornado ; python_version >= \"3.6\"").as_deref(),
            Some("tornado")
        );
        assert_eq!(requirement_name("requests[socks]~=2.25").as_deref(), Some("requests"));
        assert_eq!(requirement_name("gunicorn \\").as_deref(), Some("gunicorn"));
        assert_eq!(requirement_name("pyyaml!=5.4 # pinned").as_deref(), Some("pyyaml"));
    }

    #[test]
    fn option_comment_and_continuation_lines_have_no_name() {
        assert_eq!(requirement_name("# a comment"), None);
        assert_eq!(requirement_name(""), None);
        assert_eq!(requirement_name("--index-url https://pypi.example.com"), None);
        assert_eq!(requirement_name("    --hash=sha256:abcd"), None);
    }

    #[test]
    fn classification_follows_framework_priority() {
        assert_eq!(classify(&["flask==1.1", "sanic==20.12"]), Some(Framework::Sanic));
        assert_eq!(classify(&["Flask", "tornado>=6"]), Some(Framework::Tornado));
        assert_eq!(classify(&["flask"]), Some(Framework::Flask));
        assert_eq!(classify(&["django", "# sanic"]), None);
        assert_eq!(classify::<&str>(&[]), None);
    }

    #[test]
    fn manifest_exposes_worker_class() {
        let sanic = ProjectManifest::new(ProjectKind::Requirements, vec!["sanic\n".to_string()]);
        assert_eq!(sanic.worker_class(), Some("sanic.worker.GunicornWorker"));

        let flask = ProjectManifest::new(ProjectKind::Requirements, vec!["flask".to_string()]);
        assert_eq!(flask.detected_framework, Some(Framework::Flask));
        assert_eq!(flask.worker_class(), None);

        let generic = ProjectManifest::new(ProjectKind::Poetry, vec!["django".to_string()]);
        assert_eq!(generic.worker_class(), None);
    }
}
