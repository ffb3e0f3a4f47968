//! The TOML release descriptor.
//!
//! A release is described by a file named after its tag, e.g. `v1.7.0.toml`:
//!
//! ```toml
//! project_name = "containerd"
//! github_repo = "containerd/containerd"
//! commit = "v1.7.0"
//! previous = "v1.6.0"
//! pre_release = false
//! match_deps = "^github.com/(containerd/[a-zA-Z0-9-]+)$"
//! ignore_deps = ["github.com/example/vendored"]
//!
//! preface = """\
//! The first release of the 1.7 series."""
//!
//! [notes.sandbox]
//! title = "Sandbox API"
//! description = "A new API for sandboxes."
//!
//! [rename_deps.runc]
//! old = "github.com/opencontainers/runc"
//! new = "github.com/opencontainers/runc/v2"
//!
//! [override_deps."github.com/containerd/ttrpc"]
//! previous = "v1.1.0"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::reconcile::{OverrideRule, RenameRule};
use crate::{Error, Result};

/// A free-form section of the release notes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Note {
    pub title: String,
    pub description: String,
}

/// A manually listed breaking change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakingNote {
    pub commit: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectRename {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyOverride {
    pub previous: String,
}

/// Release descriptor as written by the release author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Release {
    pub project_name: String,
    /// `owner/name` on GitHub.
    pub github_repo: String,
    pub commit: String,
    pub previous: String,
    pub pre_release: bool,
    pub preface: String,
    pub notes: BTreeMap<String, Note>,
    pub breaking: BTreeMap<String, BreakingNote>,

    /// Dependencies whose own change logs are included.
    pub match_deps: String,
    pub rename_deps: BTreeMap<String, ProjectRename>,
    pub ignore_deps: Vec<String>,
    pub override_deps: BTreeMap<String, DependencyOverride>,
    /// Module directory inside the repository, for multi-module projects.
    pub sub_path: String,
}

impl Release {
    /// Parses a descriptor from TOML text.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::Toml`] for malformed TOML or mistyped fields.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn rename_rules(&self) -> Vec<RenameRule> {
        self.rename_deps
            .iter()
            .map(|(label, rename)| RenameRule {
                label: label.clone(),
                old: rename.old.clone(),
                new: rename.new.clone(),
            })
            .collect()
    }

    pub fn override_rules(&self) -> Vec<OverrideRule> {
        self.override_deps
            .iter()
            .map(|(name, o)| OverrideRule {
                name: name.clone(),
                previous: o.previous.clone(),
            })
            .collect()
    }

    pub fn ignore_set(&self) -> BTreeSet<String> {
        self.ignore_deps.iter().cloned().collect()
    }

    pub fn subpath(&self) -> Option<&str> {
        Some(self.sub_path.as_str()).filter(|s| !s.is_empty())
    }
}

/// Reads the release descriptor at `path`.
///
/// ## Errors
///
/// - [`Error::ReleaseFile`] when the file does not exist
/// - [`Error::Toml`] when it cannot be parsed
pub fn load_release(path: &Path) -> Result<Release> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::ReleaseFile(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    Release::parse(&text)
}

/// Tag named by a release file: its file name without `.toml`.
///
/// ## Examples
///
/// ```
/// use relnotes_lib::config::parse_tag;
/// use std::path::Path;
///
/// assert_eq!(parse_tag(Path::new("releases/v1.7.0.toml")), "v1.7.0");
/// ```
pub fn parse_tag(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(".toml") {
        Some(stem) => stem.to_string(),
        None => name,
    }
}

/// Version shown in the notes: the tag without leading `v`s.
pub fn version_from_tag(tag: &str) -> &str {
    tag.trim_start_matches('v')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RELEASE: &str = r#"
project_name = "containerd"
github_repo = "containerd/containerd"
commit = "v1.7.1"
previous = "v1.7.0"
pre_release = true
match_deps = "^github.com/(containerd/[a-zA-Z0-9-]+)$"
ignore_deps = ["github.com/a/b", "github.com/c/d"]
sub_path = "api"

preface = """\
Patch release.
"""

[notes.first]
title = "Highlight"
description = "Something big."

[breaking.cgroups]
commit = "abc1234"
description = "cgroups v1 removed"

[rename_deps.runc]
old = "github.com/old/runc"
new = "github.com/new/runc"

[override_deps."github.com/containerd/ttrpc"]
previous = "v1.1.0"
"#;

    #[test]
    fn test_parse_release() {
        let release = Release::parse(RELEASE).unwrap();
        assert_eq!(release.project_name, "containerd");
        assert_eq!(release.github_repo, "containerd/containerd");
        assert_eq!(release.commit, "v1.7.1");
        assert_eq!(release.previous, "v1.7.0");
        assert!(release.pre_release);
        assert_eq!(release.preface, "Patch release.\n");
        assert_eq!(release.notes["first"].title, "Highlight");
        assert_eq!(release.breaking["cgroups"].commit, "abc1234");
        assert_eq!(release.subpath(), Some("api"));
        assert_eq!(release.ignore_set().len(), 2);
    }

    #[test]
    fn test_rules_from_release() {
        let release = Release::parse(RELEASE).unwrap();
        assert_eq!(
            release.rename_rules(),
            vec![RenameRule {
                label: "runc".to_string(),
                old: "github.com/old/runc".to_string(),
                new: "github.com/new/runc".to_string(),
            }]
        );
        assert_eq!(
            release.override_rules(),
            vec![OverrideRule {
                name: "github.com/containerd/ttrpc".to_string(),
                previous: "v1.1.0".to_string(),
            }]
        );
    }

    #[test]
    fn test_minimal_release_uses_defaults() {
        let release = Release::parse("commit = \"HEAD\"\n").unwrap();
        assert_eq!(release.commit, "HEAD");
        assert!(release.previous.is_empty());
        assert!(release.notes.is_empty());
        assert_eq!(release.subpath(), None);
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        assert!(matches!(
            Release::parse("pre_release = \"yes\"\n"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_load_release_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v1.0.0.toml");
        assert!(matches!(load_release(&path), Err(Error::ReleaseFile(p)) if p == path));

        fs::write(&path, RELEASE).unwrap();
        assert_eq!(load_release(&path).unwrap().project_name, "containerd");
    }

    #[test]
    fn test_tag_and_version() {
        assert_eq!(parse_tag(Path::new("v2.0.0-rc.1.toml")), "v2.0.0-rc.1");
        assert_eq!(parse_tag(Path::new("/tmp/notes")), "notes");
        assert_eq!(version_from_tag("v2.0.0"), "2.0.0");
        assert_eq!(version_from_tag("2.0.0"), "2.0.0");
    }
}
