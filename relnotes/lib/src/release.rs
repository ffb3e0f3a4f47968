//! End-to-end release note generation.
//!
//! [`ReleaseBuilder::generate`] runs every step in order: change log and
//! contributors of the project, manifest parsing at both revisions,
//! rename and override rules, reconciliation, and the change logs of
//! dependencies matching `match_deps`.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Result;
use crate::changes::{
    Change, Contributor, Contributors, HighlightCategory, ProjectChanges, group_highlights,
};
use crate::config::{Release, version_from_tag};
use crate::dependency::{DependencyRecord, DependencySet};
use crate::git::{GitContext, GitRepo};
use crate::github::{ChangeProcessor, GithubClient};
use crate::manifest;
use crate::reconcile::{apply_overrides, apply_renames, reconcile};
use crate::resolver::Resolver;

/// Everything the renderer needs.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseNotes {
    pub release: Release,
    pub tag: String,
    pub version: String,
    pub highlights: Vec<HighlightCategory>,
    pub contributors: Vec<Contributor>,
    /// The project's own changes first, then one entry per matched
    /// dependency.
    pub changes: Vec<ProjectChanges>,
    pub dependencies: Vec<DependencyRecord>,
}

/// Run options that do not come from the release descriptor.
#[derive(Debug, Clone, Default)]
pub struct ReleaseOptions {
    pub tag: String,
    /// Look up pull requests and link commits on GitHub.
    pub linkify: bool,
    /// Directory holding dependency clones. A temporary directory is used
    /// when unset.
    pub clone_root: Option<PathBuf>,
}

pub struct ReleaseBuilder {
    release: Release,
    options: ReleaseOptions,
}

impl ReleaseBuilder {
    pub fn new(release: Release, tag: impl Into<String>) -> Self {
        Self {
            release,
            options: ReleaseOptions {
                tag: tag.into(),
                ..ReleaseOptions::default()
            },
        }
    }

    pub fn with_linkify(mut self, linkify: bool) -> Self {
        self.options.linkify = linkify;
        self
    }

    pub fn with_clone_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.clone_root = Some(root.into());
        self
    }

    /// Generates the release notes for `repo`.
    ///
    /// ## Errors
    ///
    /// Any failure aborts generation: unreadable revisions, missing or
    /// malformed manifests, dependency resolution errors, GitHub lookups
    /// (with linkify), and clone or fetch failures for matched dependencies.
    pub async fn generate(
        self,
        repo: &GitRepo,
        resolver: &Resolver,
        github: &GithubClient,
    ) -> Result<ReleaseNotes> {
        let release = &self.release;
        let tag = self.options.tag.clone();
        info!("Welcome to the {} release tool...", release.project_name);

        let mut contributors = Contributors::new();
        let mut projects = Vec::new();

        let mut changes = repo.log_range(&release.previous, &release.commit)?;
        self.format_changes(&mut changes, Some(&release.github_repo), "", github)
            .await?;
        repo.contributors(&release.previous, &release.commit, &mut contributors)?;
        info!("creating new release {tag} with {} new changes...", changes.len());
        projects.push(ProjectChanges::new("", changes));

        let current = manifest::load(repo, &release.commit, release.subpath())?;
        let previous = if release.previous.is_empty() {
            DependencySet::new()
        } else {
            manifest::load(repo, &release.previous, release.subpath())?.dependencies
        };
        debug!(kind = %current.kind, replaced = current.replaced.len(), "parsed dependencies");

        let previous = apply_renames(previous, &release.rename_rules());
        let current = apply_overrides(current.dependencies, &release.override_rules());
        let dependencies = reconcile(&previous, &current, &release.ignore_set(), resolver).await?;

        if !release.match_deps.is_empty() && !dependencies.is_empty() {
            let context = GitContext {
                mailmap: repo.context().mailmap.clone(),
                subpaths: Vec::new(),
            };
            self.dependency_changes(
                &dependencies,
                &context,
                resolver,
                github,
                &mut contributors,
                &mut projects,
            )
            .await?;
        }

        let mut release = self.release;
        release.preface = release.preface.trim_end().to_string();
        Ok(ReleaseNotes {
            version: version_from_tag(&tag).to_string(),
            tag,
            highlights: group_highlights(&projects),
            contributors: contributors.order(),
            changes: projects,
            dependencies,
            release,
        })
    }

    async fn format_changes(
        &self,
        changes: &mut [Change],
        github_repo: Option<&str>,
        link_name: &str,
        github: &GithubClient,
    ) -> Result<()> {
        match github_repo.filter(|r| !r.is_empty()) {
            Some(repo) if self.options.linkify => {
                let processor = ChangeProcessor::new(github, repo, link_name);
                for change in changes.iter_mut() {
                    processor.process(change).await?;
                }
            }
            _ => {
                if self.options.linkify {
                    warn!("linkify needs a GitHub repository, leaving changes unlinked");
                }
                changes.iter_mut().for_each(Change::format_plain);
            }
        }
        Ok(())
    }

    async fn dependency_changes(
        &self,
        dependencies: &[DependencyRecord],
        context: &GitContext,
        resolver: &Resolver,
        github: &GithubClient,
        contributors: &mut Contributors,
        projects: &mut Vec<ProjectChanges>,
    ) -> Result<()> {
        let pattern = Regex::new(&self.release.match_deps)?;

        let temp;
        let root: &Path = match &self.options.clone_root {
            Some(root) => root.as_path(),
            None => {
                temp = tempfile::Builder::new().prefix("tmp-clone-").tempdir()?;
                temp.path()
            }
        };

        for dep in dependencies {
            let Some(caps) = pattern.captures(&dep.name) else {
                continue;
            };
            debug!("Matched dependency {} with {}", dep.name, self.release.match_deps);
            let Some(previous) = dep.previous_ref.as_deref() else {
                debug!(name = %dep.name, "new dependency, skipping change log");
                continue;
            };
            let name = match caps.get(1) {
                Some(m) => m.as_str().to_string(),
                None => base_name(&dep.name).to_string(),
            };

            let url = match &dep.source_url {
                Some(url) => url.clone(),
                None => resolver
                    .resolve_url(&dep.name)
                    .await
                    .map_err(|e| e.for_dependency(&dep.name))?,
            };

            let dir = root.join(&name);
            if let Some(parent) = dir.parent() {
                fs::create_dir_all(parent)?;
            }
            let (clone, cloned) = GitRepo::clone_or_open(&url, &dir, context.clone())
                .map_err(|e| e.for_dependency(&name))?;
            if !cloned {
                clone
                    .ensure_revision(&dep.declared_ref)
                    .map_err(|e| e.for_dependency(&name))?;
            }

            let mut changes = clone
                .log_range(previous, &dep.declared_ref)
                .map_err(|e| e.for_dependency(&name))?;
            clone
                .contributors(previous, &dep.declared_ref, contributors)
                .map_err(|e| e.for_dependency(&name))?;

            let github_repo = github_repo(&dep.name);
            if self.options.linkify && github_repo.is_none() {
                debug!("linkify only supported for Github, skipping {}", dep.name);
            }
            let link_name = github_repo.clone().unwrap_or_default();
            self.format_changes(&mut changes, github_repo.as_deref(), &link_name, github)
                .await?;

            projects.push(ProjectChanges::new(name, changes));
        }
        Ok(())
    }
}

/// `owner/name` for dependencies hosted on GitHub.
fn github_repo(name: &str) -> Option<String> {
    let rest = name.strip_prefix("github.com/")?;
    let mut parts = rest.split('/');
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => {
            Some(format!("{owner}/{repo}"))
        }
        _ => None,
    }
}

fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
