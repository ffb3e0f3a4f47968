//! Uniform dependency model shared by every manifest format.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::Serialize;

use crate::version::Normalized;

/// A single dependency at one revision of the project.
///
/// `name` is the identity of the record. `resolved_commit` is only set when
/// the declared reference already is a commit, or after remote resolution.
/// `source_url` of `None` means the repository must be discovered before any
/// revision lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyRecord {
    pub name: String,
    /// Tag, branch, or commit as written in the manifest.
    pub declared_ref: String,
    pub resolved_commit: Option<String>,
    pub source_url: Option<String>,
    /// Previous reference, set when the dependency was updated or overridden.
    pub previous_ref: Option<String>,
    pub is_new: bool,
}

impl DependencyRecord {
    /// Creates a record from a manifest entry, deriving the source URL from
    /// the known hosting conventions.
    pub fn new(name: impl Into<String>, declared_ref: impl Into<String>) -> Self {
        let name = name.into();
        let source_url = known_git_url(&name);
        Self {
            name,
            declared_ref: declared_ref.into(),
            resolved_commit: None,
            source_url,
            previous_ref: None,
            is_new: false,
        }
    }

    /// Creates a record from a normalized module version.
    pub fn from_normalized(name: impl Into<String>, version: Normalized) -> Self {
        let resolved_commit = version.is_commit.then(|| version.reference.clone());
        Self {
            resolved_commit,
            ..Self::new(name, version.reference)
        }
    }

    /// Sets an explicit source URL.
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Sets the resolved commit.
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.resolved_commit = Some(commit.into());
        self
    }
}

/// The dependencies of a project at one revision, keyed by name.
///
/// Inserting a record with an existing name replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    records: BTreeMap<String, DependencyRecord>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: DependencyRecord) {
        self.records.insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<&DependencyRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DependencyRecord> {
        self.records.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates records in name order.
    pub fn iter(&self) -> btree_map::Values<'_, String, DependencyRecord> {
        self.records.values()
    }
}

impl FromIterator<DependencyRecord> for DependencySet {
    fn from_iter<I: IntoIterator<Item = DependencyRecord>>(iter: I) -> Self {
        let mut set = DependencySet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

impl IntoIterator for DependencySet {
    type Item = DependencyRecord;
    type IntoIter = btree_map::IntoValues<String, DependencyRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_values()
    }
}

impl<'a> IntoIterator for &'a DependencySet {
    type Item = &'a DependencyRecord;
    type IntoIter = btree_map::Values<'a, String, DependencyRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values()
    }
}

/// Derives a clone URL for module paths on well-known hosts.
///
/// Returns `None` when the path must be resolved through `?go-get=1`
/// discovery instead.
///
/// ## Examples
///
/// ```
/// use relnotes_lib::dependency::known_git_url;
///
/// assert_eq!(
///     known_git_url("github.com/someorg/somerepo/v2").as_deref(),
///     Some("https://github.com/someorg/somerepo")
/// );
/// assert_eq!(
///     known_git_url("k8s.io/client-go").as_deref(),
///     Some("https://github.com/kubernetes/client-go")
/// );
/// assert_eq!(known_git_url("github.com/invalid"), None);
/// ```
pub fn known_git_url(name: &str) -> Option<String> {
    let (host, rest) = name.split_once('/')?;
    if host.is_empty() {
        return None;
    }

    // only the first segment after these hosts names the repository
    let first_segment = || rest.split('/').next().filter(|s| !s.is_empty());

    match host {
        "github.com" => {
            let parts: Vec<&str> = name.split('/').collect();
            if parts.len() < 3 {
                return None;
            }
            Some(format!("https://{}", parts[..3].join("/")))
        }
        "k8s.io" => first_segment().map(|repo| format!("https://github.com/kubernetes/{repo}")),
        "sigs.k8s.io" => {
            first_segment().map(|repo| format!("https://github.com/kubernetes-sigs/{repo}"))
        }
        _ => None,
    }
}
