//! Names derived from origin URLs and refs.

use crate::error::{Error, Result};

/// Guesses a project name from an origin URL.
///
/// Strips a leading scheme and a trailing `/browse`, `/git` or `.git`, then
/// takes the last non-empty path segment.
pub fn guess_project_name(origin: &str) -> Result<String> {
    let mut rest = origin.trim();
    for scheme in ["https://", "http://", "ssh://"] {
        if let Some(stripped) = rest.strip_prefix(scheme) {
            rest = stripped;
            break;
        }
    }
    for suffix in ["/browse", "/git", ".git"] {
        if let Some(stripped) = rest.strip_suffix(suffix) {
            rest = stripped;
        }
    }

    rest.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidParameter(format!("origin '{}' has no project name", origin)))
}

/// Makes a string safe as a single path component: drops `/`, maps `_` and `.` to `-`.
pub fn path_friendly(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c != '/')
        .map(|c| if c == '_' || c == '.' { '-' } else { c })
        .collect()
}

/// The sanitized project name used in every on-disk name.
pub fn project_name(origin: &str) -> Result<String> {
    let name = path_friendly(&guess_project_name(origin)?);
    if name.is_empty() {
        return Err(Error::InvalidParameter(format!(
            "origin '{}' has no project name",
            origin
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_project_name_from_https_origin() {
        assert_eq!(
            project_name("https://git.example.com/scm/team/widgets.git").unwrap(),
            "widgets"
        );
    }

    #[test]
    fn derives_project_name_from_browse_and_git_suffixes() {
        assert_eq!(
            guess_project_name("https://stash.example.com/projects/OPS/repos/deploy-tool/browse")
                .unwrap(),
            "deploy-tool"
        );
        assert_eq!(
            guess_project_name("http://example.com/team/gadgets/git").unwrap(),
            "gadgets"
        );
        assert_eq!(
            guess_project_name("ssh://git@example.com:7999/team/sprockets.git").unwrap(),
            "sprockets"
        );
    }

    #[test]
    fn derives_project_name_from_local_paths_and_trailing_slashes() {
        assert_eq!(guess_project_name("/srv/origins/widgets/").unwrap(), "widgets");
        assert_eq!(guess_project_name("git@github.com:org/my_app.git").unwrap(), "my_app");
    }

    #[test]
    fn sanitizes_project_name() {
        assert_eq!(
            project_name("https://example.com/org/my_app.v2.git").unwrap(),
            "my-app-v2"
        );
    }

    #[test]
    fn rejects_origin_without_segments() {
        assert!(guess_project_name("https://").is_err());
        assert!(project_name("///").is_err());
    }

    #[test]
    fn path_friendly_replaces_separators() {
        assert_eq!(path_friendly("feature/new_ui.v1"), "featurenew-ui-v1");
        assert_eq!(path_friendly("../etc"), "--etc");
    }
}
