//! Dependency reconciliation between two revisions.
//!
//! Given the dependency sets of the previous and current release, decides
//! which dependencies are new or actually changed. A declared reference that
//! differs only in spelling (a pseudo-version with a new timestamp, a tag
//! pointing at the same commit) is not a change: both sides are resolved to
//! commits before comparing.
//!
//! ## Examples
//!
//! ```
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use relnotes_lib::cache::NoopCache;
//! use relnotes_lib::dependency::{DependencyRecord, DependencySet};
//! use relnotes_lib::reconcile::reconcile;
//! use relnotes_lib::resolver::Resolver;
//!
//! # async fn example() -> relnotes_lib::Result<()> {
//! let previous: DependencySet = [DependencyRecord::new("github.com/a/b", "v1.0.0")].into_iter().collect();
//! let current: DependencySet = [
//!     DependencyRecord::new("github.com/a/b", "v1.0.0"),
//!     DependencyRecord::new("github.com/c/d", "v0.1.0"),
//! ].into_iter().collect();
//!
//! let resolver = Resolver::with_defaults(Arc::new(NoopCache), reqwest::Client::new());
//! let updated = reconcile(&previous, &current, &BTreeSet::new(), &resolver).await?;
//! assert_eq!(updated.len(), 1);
//! assert!(updated[0].is_new);
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::Result;
use crate::dependency::{DependencyRecord, DependencySet};
use crate::resolver::Resolver;

/// Renames a dependency between the previous and current revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRule {
    /// Short name used in logs.
    pub label: String,
    pub old: String,
    pub new: String,
}

/// Forces the previous reference of a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRule {
    pub name: String,
    pub previous: String,
}

/// Rewrites names in the previous set so renamed dependencies match their
/// current name.
pub fn apply_renames(previous: DependencySet, renames: &[RenameRule]) -> DependencySet {
    if renames.is_empty() {
        return previous;
    }
    let by_old: BTreeMap<&str, &RenameRule> = renames.iter().map(|r| (r.old.as_str(), r)).collect();

    previous
        .into_iter()
        .map(|mut dep| {
            if let Some(rule) = by_old.get(dep.name.as_str()) {
                debug!("Renamed {} from {} to {}", rule.label, dep.name, rule.new);
                dep.name = rule.new.clone();
            }
            dep
        })
        .collect()
}

/// Sets the forced previous reference on matching current dependencies.
pub fn apply_overrides(current: DependencySet, overrides: &[OverrideRule]) -> DependencySet {
    if overrides.is_empty() {
        return current;
    }
    let by_name: BTreeMap<&str, &str> = overrides
        .iter()
        .filter(|o| !o.previous.is_empty())
        .map(|o| (o.name.as_str(), o.previous.as_str()))
        .collect();

    current
        .into_iter()
        .map(|mut dep| {
            if let Some(previous) = by_name.get(dep.name.as_str()) {
                debug!("Overrode previous version of {} to {}", dep.name, previous);
                dep.previous_ref = Some(previous.to_string());
            }
            dep
        })
        .collect()
}

/// Computes the dependencies that are new or changed in `current`.
///
/// The result is sorted by name. Every record either has `is_new` set or a
/// `previous_ref` different from its `declared_ref`.
///
/// ## Errors
///
/// Any URL or revision resolution failure aborts the whole computation with
/// an [`Error::Dependency`](crate::Error::Dependency) naming the dependency.
pub async fn reconcile(
    previous: &DependencySet,
    current: &DependencySet,
    ignore: &BTreeSet<String>,
    resolver: &Resolver,
) -> Result<Vec<DependencyRecord>> {
    let mut updated = Vec::new();

    for cur in current {
        if ignore.contains(&cur.name) {
            continue;
        }

        let Some(prev) = previous.get(&cur.name) else {
            let mut dep = cur.clone();
            dep.is_new = true;
            updated.push(dep);
            continue;
        };

        if let Some(forced) = &cur.previous_ref {
            if forced != &cur.declared_ref {
                debug!("Override dependency: {:?} {} -> {}", cur.name, forced, cur.declared_ref);
                updated.push(cur.clone());
            }
            continue;
        }

        if prev.declared_ref == cur.declared_ref {
            continue;
        }

        let mut prev = prev.clone();
        let mut cur = cur.clone();
        let prev_had_url = prev.source_url.is_some();
        resolve_commit(&mut prev, None, resolver)
            .await
            .map_err(|e| e.for_dependency(&cur.name))?;
        // a URL carried over from a rename or a replace belongs to the previous side only
        let discovered = if prev_had_url {
            None
        } else {
            prev.source_url.clone()
        };
        resolve_commit(&mut cur, discovered, resolver)
            .await
            .map_err(|e| e.for_dependency(&cur.name))?;

        if prev.resolved_commit != cur.resolved_commit {
            debug!(
                "Updated dependency: {:?} {}({}) -> {}({})",
                prev.name,
                prev.declared_ref,
                prev.resolved_commit.as_deref().unwrap_or_default(),
                cur.declared_ref,
                cur.resolved_commit.as_deref().unwrap_or_default()
            );
            cur.previous_ref = Some(prev.declared_ref);
            updated.push(cur);
        }
    }

    updated.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(updated)
}

/// Fills in `resolved_commit`, discovering the source URL first if needed.
///
/// `fallback_url` is a URL just discovered for the same name, used instead
/// of discovering again when the record has no URL.
async fn resolve_commit(
    dep: &mut DependencyRecord,
    fallback_url: Option<String>,
    resolver: &Resolver,
) -> Result<()> {
    if dep.resolved_commit.is_some() {
        return Ok(());
    }
    let url = match (&dep.source_url, fallback_url) {
        (Some(url), _) => url.clone(),
        (None, Some(url)) => url,
        (None, None) => resolver.resolve_url(&dep.name).await?,
    };
    let commit = resolver.resolve_revision(&url, &dep.declared_ref).await?;
    dep.source_url = Some(url);
    dep.resolved_commit = Some(commit);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::cache::NoopCache;
    use crate::resolver::testing::{FakeDiscovery, FakeLister};
    use std::sync::Arc;

    const C1: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const C2: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn set(records: Vec<DependencyRecord>) -> DependencySet {
        records.into_iter().collect()
    }

    fn resolver(lister: &Arc<FakeLister>, discovery: FakeDiscovery) -> Resolver {
        Resolver::new(Arc::new(NoopCache), Arc::new(discovery), lister.clone())
    }

    fn no_ignores() -> BTreeSet<String> {
        BTreeSet::new()
    }

    #[tokio::test]
    async fn test_new_dependency_is_always_included() {
        let lister = Arc::new(FakeLister::default());
        let resolver = resolver(&lister, FakeDiscovery::default());

        let previous = set(vec![]);
        let current = set(vec![DependencyRecord::new("example.com/pkg", "v1.0.0")]);

        let updated = reconcile(&previous, &current, &no_ignores(), &resolver)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert!(updated[0].is_new);
        assert_eq!(updated[0].previous_ref, None);
        assert_eq!(lister.calls(), 0);
    }

    #[tokio::test]
    async fn test_unchanged_ref_needs_no_resolution() {
        let lister = Arc::new(FakeLister::default());
        let resolver = resolver(&lister, FakeDiscovery::default());

        let previous = set(vec![DependencyRecord::new("example.com/pkg", "v1.0.0")]);
        let current = previous.clone();

        let updated = reconcile(&previous, &current, &no_ignores(), &resolver)
            .await
            .unwrap();
        assert!(updated.is_empty());
        assert_eq!(lister.calls(), 0);
    }

    #[tokio::test]
    async fn test_ignored_dependency_is_never_included() {
        let lister = Arc::new(FakeLister::default());
        let resolver = resolver(&lister, FakeDiscovery::default());

        let previous = set(vec![DependencyRecord::new("github.com/a/b", "v1.0.0")]);
        let current = set(vec![
            DependencyRecord::new("github.com/a/b", "v2.0.0"),
            DependencyRecord::new("github.com/c/d", "v1.0.0"),
        ]);
        let ignore: BTreeSet<String> =
            ["github.com/a/b".to_string(), "github.com/c/d".to_string()].into();

        let updated = reconcile(&previous, &current, &ignore, &resolver)
            .await
            .unwrap();
        assert!(updated.is_empty());
        assert_eq!(lister.calls(), 0);
    }

    #[tokio::test]
    async fn test_override_forces_inclusion_or_exclusion() {
        let lister = Arc::new(FakeLister::default());
        let resolver = resolver(&lister, FakeDiscovery::default());

        let previous = set(vec![
            DependencyRecord::new("github.com/a/b", "v1.0.0"),
            DependencyRecord::new("github.com/c/d", "v1.0.0"),
        ]);
        let current = set(vec![
            DependencyRecord::new("github.com/a/b", "v1.0.0"),
            DependencyRecord::new("github.com/c/d", "v3.0.0"),
        ]);
        let current = apply_overrides(
            current,
            &[
                OverrideRule {
                    name: "github.com/a/b".to_string(),
                    previous: "v0.9.0".to_string(),
                },
                OverrideRule {
                    name: "github.com/c/d".to_string(),
                    previous: "v3.0.0".to_string(),
                },
            ],
        );

        let updated = reconcile(&previous, &current, &no_ignores(), &resolver)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].name, "github.com/a/b");
        assert_eq!(updated[0].previous_ref.as_deref(), Some("v0.9.0"));
        assert_eq!(lister.calls(), 0);
    }

    #[tokio::test]
    async fn test_changed_commit_is_included_with_previous_ref() {
        let lister = Arc::new(
            FakeLister::default()
                .with_ref("https://example.com/pkg", "refs/tags/v1.0.0", C1)
                .with_ref("https://example.com/pkg", "refs/tags/v1.1.0", C2),
        );
        let discovery =
            FakeDiscovery::default().with_page("example.com/pkg", "https://example.com/pkg");
        let resolver = resolver(&lister, discovery);

        let previous = set(vec![DependencyRecord::new("example.com/pkg", "v1.0.0")]);
        let current = set(vec![DependencyRecord::new("example.com/pkg", "v1.1.0")]);

        let updated = reconcile(&previous, &current, &no_ignores(), &resolver)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        let dep = &updated[0];
        assert_eq!(dep.name, "example.com/pkg");
        assert_eq!(dep.previous_ref.as_deref(), Some("v1.0.0"));
        assert_eq!(dep.declared_ref, "v1.1.0");
        assert_eq!(dep.resolved_commit.as_deref(), Some("bbbbbbbbbbbb"));
        assert!(!dep.is_new);
    }

    #[tokio::test]
    async fn test_same_commit_under_different_refs_is_excluded() {
        let lister = Arc::new(
            FakeLister::default().with_ref("https://github.com/a/b", "refs/tags/v1.0.0", C1),
        );
        let resolver = resolver(&lister, FakeDiscovery::default());

        // pseudo-version pointing at the commit the tag resolves to
        let previous = set(vec![DependencyRecord::new("github.com/a/b", "v1.0.0")]);
        let current = set(vec![
            DependencyRecord::new("github.com/a/b", "aaaaaaaaaaaa").with_commit("aaaaaaaaaaaa"),
        ]);

        let updated = reconcile(&previous, &current, &no_ignores(), &resolver)
            .await
            .unwrap();
        assert!(updated.is_empty());
        assert_eq!(lister.calls(), 1);
    }

    #[tokio::test]
    async fn test_resolution_failure_names_dependency() {
        let lister = Arc::new(FakeLister::default());
        let resolver = resolver(&lister, FakeDiscovery::default());

        let previous = set(vec![DependencyRecord::new("example.com/pkg", "v1.0.0")]);
        let current = set(vec![DependencyRecord::new("example.com/pkg", "v1.1.0")]);

        let err = reconcile(&previous, &current, &no_ignores(), &resolver)
            .await
            .unwrap_err();
        match err {
            Error::Dependency { name, source } => {
                assert_eq!(name, "example.com/pkg");
                assert!(matches!(*source, Error::HttpStatus { status: 404, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_discovered_url_is_reused_for_current() {
        let lister = Arc::new(
            FakeLister::default()
                .with_ref("https://go.example.com/pkg", "refs/tags/v1.0.0", C1)
                .with_ref("https://go.example.com/pkg", "refs/tags/v1.1.0", C2),
        );
        let discovery = Arc::new(
            FakeDiscovery::default().with_page("example.com/pkg", "https://go.example.com/pkg"),
        );
        let resolver = Resolver::new(Arc::new(NoopCache), discovery.clone(), lister.clone());

        let previous = set(vec![DependencyRecord::new("example.com/pkg", "v1.0.0")]);
        let current = set(vec![DependencyRecord::new("example.com/pkg", "v1.1.0")]);

        let updated = reconcile(&previous, &current, &no_ignores(), &resolver)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(
            updated[0].source_url.as_deref(),
            Some("https://go.example.com/pkg")
        );
        assert_eq!(discovery.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rename_matches_previous_under_new_name() {
        let lister = Arc::new(FakeLister::default());
        let resolver = resolver(&lister, FakeDiscovery::default());

        let previous = set(vec![DependencyRecord::new("github.com/old/name", "v1.0.0")]);
        let previous = apply_renames(
            previous,
            &[RenameRule {
                label: "name".to_string(),
                old: "github.com/old/name".to_string(),
                new: "github.com/new/name".to_string(),
            }],
        );
        let current = set(vec![DependencyRecord::new("github.com/new/name", "v1.0.0")]);

        let updated = reconcile(&previous, &current, &no_ignores(), &resolver)
            .await
            .unwrap();
        assert!(updated.is_empty());
        assert!(previous.contains("github.com/new/name"));
        assert!(!previous.contains("github.com/old/name"));
    }

    #[tokio::test]
    async fn test_rename_to_unknown_host_discovers_new_repository() {
        let lister = Arc::new(
            FakeLister::default()
                .with_ref("https://github.com/old/x", "refs/tags/v1.0.0", C1)
                .with_ref("https://github.com/old/x", "refs/tags/v2.0.0", C1)
                .with_ref("https://go.example.com/x", "refs/tags/v2.0.0", C2),
        );
        let discovery = Arc::new(
            FakeDiscovery::default().with_page("example.com/x", "https://go.example.com/x"),
        );
        let resolver = Resolver::new(Arc::new(NoopCache), discovery.clone(), lister.clone());

        let previous = apply_renames(
            set(vec![DependencyRecord::new("github.com/old/x", "v1.0.0")]),
            &[RenameRule {
                label: "x".to_string(),
                old: "github.com/old/x".to_string(),
                new: "example.com/x".to_string(),
            }],
        );
        let current = set(vec![DependencyRecord::new("example.com/x", "v2.0.0")]);

        let updated = reconcile(&previous, &current, &no_ignores(), &resolver)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].previous_ref.as_deref(), Some("v1.0.0"));
        assert_eq!(updated[0].source_url.as_deref(), Some("https://go.example.com/x"));
        assert_eq!(updated[0].resolved_commit.as_deref(), Some("bbbbbbbbbbbb"));
        assert_eq!(discovery.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replaced_fork_url_is_not_used_for_current() {
        let lister = Arc::new(
            FakeLister::default()
                .with_ref("https://github.com/fork/pkg", "refs/tags/v1.0.0", C1)
                .with_ref("https://github.com/fork/pkg", "refs/tags/v1.1.0", C1)
                .with_ref("https://go.example.com/pkg", "refs/tags/v1.1.0", C2),
        );
        let discovery =
            FakeDiscovery::default().with_page("example.com/pkg", "https://go.example.com/pkg");
        let resolver = resolver(&lister, discovery);

        let mut forked = DependencyRecord::new("example.com/pkg", "v1.0.0");
        forked.source_url = Some("https://github.com/fork/pkg".to_string());
        let previous = set(vec![forked]);
        let current = set(vec![DependencyRecord::new("example.com/pkg", "v1.1.0")]);

        let updated = reconcile(&previous, &current, &no_ignores(), &resolver)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].source_url.as_deref(), Some("https://go.example.com/pkg"));
    }

    #[tokio::test]
    async fn test_output_is_sorted_by_name() {
        let lister = Arc::new(FakeLister::default());
        let resolver = resolver(&lister, FakeDiscovery::default());

        let current = set(vec![
            DependencyRecord::new("github.com/z/z", "v1.0.0"),
            DependencyRecord::new("github.com/a/a", "v1.0.0"),
            DependencyRecord::new("github.com/m/m", "v1.0.0"),
        ]);
        let updated = reconcile(&set(vec![]), &current, &no_ignores(), &resolver)
            .await
            .unwrap();
        let names: Vec<&str> = updated.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["github.com/a/a", "github.com/m/m", "github.com/z/z"]);
    }
}
