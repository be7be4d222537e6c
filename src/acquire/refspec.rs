//! Ref selection and pinned commits.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RefSpecError;

use super::naming::path_friendly;

/// Branch resolved when no ref is selected.
pub const DEFAULT_BRANCH: &str = "master";

/// Which ref of the origin to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum RefSpec {
    /// A tag name.
    Tag(String),
    /// A branch name.
    Branch(String),
    /// A raw commit id. Never resolvable; see [`crate::Error::UnsupportedRefKind`].
    Commit(String),
    /// The origin's `master` branch.
    Default,
}

impl RefSpec {
    /// Builds a selection from the three optional request selectors.
    ///
    /// Exactly one must be present; empty strings count as absent.
    pub fn from_selectors(
        tag: Option<&str>,
        branch: Option<&str>,
        commit: Option<&str>,
    ) -> Result<Self, RefSpecError> {
        fn present(s: Option<&str>) -> Option<&str> {
            s.filter(|v| !v.is_empty())
        }

        match (present(tag), present(branch), present(commit)) {
            (None, None, None) => Err(RefSpecError::Missing),
            (Some(_), Some(_), Some(_)) => Err(RefSpecError::Conflicting(
                "Cannot have all three tag and branch and commit parameters",
            )),
            (Some(_), Some(_), None) => Err(RefSpecError::Conflicting(
                "Cannot have both tag and branch parameters",
            )),
            (None, Some(_), Some(_)) => Err(RefSpecError::Conflicting(
                "Cannot have both branch and commit parameters",
            )),
            (Some(_), None, Some(_)) => Err(RefSpecError::Conflicting(
                "Cannot have both commit and tag parameters",
            )),
            (Some(t), None, None) => Ok(RefSpec::Tag(t.to_string())),
            (None, Some(b), None) => Ok(RefSpec::Branch(b.to_string())),
            (None, None, Some(c)) => Ok(RefSpec::Commit(c.to_string())),
        }
    }

    /// Short kind label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RefSpec::Tag(_) => "tag",
            RefSpec::Branch(_) => "branch",
            RefSpec::Commit(_) => "commit",
            RefSpec::Default => "default",
        }
    }
}

impl fmt::Display for RefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefSpec::Tag(name) => write!(f, "Tag {}", name),
            RefSpec::Branch(name) => write!(f, "Branch {}", name),
            RefSpec::Commit(sha) => write!(f, "Commit {}", sha),
            RefSpec::Default => write!(f, "{} ref", DEFAULT_BRANCH),
        }
    }
}

/// A ref resolved to an exact commit after a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedCommit {
    ref_spec: RefSpec,
    resolved_sha: String,
    short_sha: String,
}

impl PinnedCommit {
    pub(crate) fn new(ref_spec: RefSpec, resolved_sha: impl Into<String>) -> Self {
        let resolved_sha = resolved_sha.into();
        let short_sha = resolved_sha.chars().take(7).collect();
        Self {
            ref_spec,
            resolved_sha,
            short_sha,
        }
    }

    /// The selection this commit was resolved from.
    pub fn ref_spec(&self) -> &RefSpec {
        &self.ref_spec
    }

    /// Full 40-hex commit id.
    pub fn sha(&self) -> &str {
        &self.resolved_sha
    }

    /// First seven hex characters of the commit id.
    pub fn short_sha(&self) -> &str {
        &self.short_sha
    }

    /// Slot-name fragment following the project name, e.g. `br-main-1a2b3c4`.
    pub fn dirname_fragment(&self) -> String {
        match &self.ref_spec {
            RefSpec::Tag(name) => format!("tag-{}-{}", path_friendly(name), self.short_sha),
            RefSpec::Branch(name) => format!("br-{}-{}", path_friendly(name), self.short_sha),
            RefSpec::Commit(_) => format!("sha-{}", self.short_sha),
            RefSpec::Default => format!("m-{}", self.short_sha),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d";

    #[test]
    fn exactly_one_selector_is_accepted() {
        assert_eq!(
            RefSpec::from_selectors(Some("v1.0"), None, None),
            Ok(RefSpec::Tag("v1.0".to_string()))
        );
        assert_eq!(
            RefSpec::from_selectors(None, Some("main"), None),
            Ok(RefSpec::Branch("main".to_string()))
        );
        assert_eq!(
            RefSpec::from_selectors(None, None, Some(SHA)),
            Ok(RefSpec::Commit(SHA.to_string()))
        );
    }

    #[test]
    fn missing_selectors_are_rejected() {
        assert_eq!(
            RefSpec::from_selectors(None, None, None),
            Err(RefSpecError::Missing)
        );
        assert_eq!(
            RefSpec::from_selectors(Some(""), Some(""), None),
            Err(RefSpecError::Missing)
        );
    }

    #[test]
    fn empty_selectors_do_not_conflict_with_a_real_one() {
        assert_eq!(
            RefSpec::from_selectors(Some(""), Some("main"), None),
            Ok(RefSpec::Branch("main".to_string()))
        );
        assert_eq!(
            RefSpec::from_selectors(Some("v2"), Some(""), Some("")),
            Ok(RefSpec::Tag("v2".to_string()))
        );
    }

    #[test]
    fn ref_kinds_have_short_labels() {
        assert_eq!(RefSpec::Tag("v1".to_string()).kind(), "tag");
        assert_eq!(RefSpec::Branch("main".to_string()).kind(), "branch");
        assert_eq!(RefSpec::Commit(SHA.to_string()).kind(), "commit");
        assert_eq!(RefSpec::Default.kind(), "default");
    }

    #[test]
    fn conflicting_selectors_are_rejected() {
        let cases = [
            (Some("t"), Some("b"), Some("c"), "all three"),
            (Some("t"), Some("b"), None, "tag and branch"),
            (None, Some("b"), Some("c"), "branch and commit"),
            (Some("t"), None, Some("c"), "commit and tag"),
        ];
        for (tag, branch, commit, expected) in cases {
            match RefSpec::from_selectors(tag, branch, commit) {
                Err(RefSpecError::Conflicting(msg)) => assert!(msg.contains(expected), "{msg}"),
                other => panic!("expected conflict for {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn pinned_commit_fragments_follow_ref_kind() {
        let tag = PinnedCommit::new(RefSpec::Tag("v1.2_rc".to_string()), SHA);
        assert_eq!(tag.short_sha(), "1a2b3c4");
        assert_eq!(tag.dirname_fragment(), "tag-v1-2-rc-1a2b3c4");

        let branch = PinnedCommit::new(RefSpec::Branch("feature/x".to_string()), SHA);
        assert_eq!(branch.dirname_fragment(), "br-featurex-1a2b3c4");

        let default = PinnedCommit::new(RefSpec::Default, SHA);
        assert_eq!(default.dirname_fragment(), "m-1a2b3c4");
        assert_eq!(default.sha(), SHA);
        assert_eq!(default.ref_spec(), &RefSpec::Default);
    }

    #[test]
    fn ref_spec_serializes_as_tagged_union() {
        let json = serde_json::to_string(&RefSpec::Branch("main".to_string())).unwrap();
        assert_eq!(json, r#"{"kind":"branch","name":"main"}"#);
        let json = serde_json::to_string(&RefSpec::Default).unwrap();
        assert_eq!(json, r#"{"kind":"default"}"#);
    }
}
