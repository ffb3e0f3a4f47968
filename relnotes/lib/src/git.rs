//! Local source control access through libgit2.
//!
//! [`GitRepo`] answers the questions a release needs from a repository:
//! file contents at a revision, the commits between two revisions, and who
//! wrote them. Options that `git` would take from `-c` flags or trailing
//! path arguments live in an explicit [`GitContext`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use git2::{AutotagOption, Commit, FetchOptions, Mailmap, Oid, Repository, Sort, Tree};
use tracing::debug;

use crate::Result;
use crate::changes::{Change, Contributors};
use crate::manifest::ManifestSource;

/// Length of the abbreviated commit ids shown in change logs.
pub const SHORT_ID_LEN: usize = 7;

/// Options applied to every repository operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitContext {
    /// Mailmap file used to canonicalize author names. When unset, the
    /// repository's own `.mailmap` is used.
    pub mailmap: Option<PathBuf>,
    /// Restricts logs to commits touching these paths.
    pub subpaths: Vec<String>,
}

impl GitContext {
    pub fn with_mailmap(mut self, path: impl Into<PathBuf>) -> Self {
        self.mailmap = Some(path.into());
        self
    }

    pub fn with_subpaths(mut self, subpaths: Vec<String>) -> Self {
        self.subpaths = subpaths;
        self
    }
}

/// A local repository.
pub struct GitRepo {
    repo: Repository,
    context: GitContext,
}

impl GitRepo {
    /// Opens the repository at `path`.
    ///
    /// ## Errors
    ///
    /// Returns an error if `path` is not inside a git repository.
    pub fn open(path: impl AsRef<Path>, context: GitContext) -> Result<Self> {
        let repo = Repository::discover(path)?;
        Ok(Self { repo, context })
    }

    /// Opens `dir` when it already holds a clone, otherwise clones `url`
    /// into it. The flag is `true` when a fresh clone was made.
    ///
    /// ## Errors
    ///
    /// Returns an error if the clone fails or `dir` is not a repository.
    pub fn clone_or_open(url: &str, dir: &Path, context: GitContext) -> Result<(Self, bool)> {
        if dir.exists() {
            let repo = Repository::open(dir)?;
            return Ok((Self { repo, context }, false));
        }
        debug!("git clone {url} {}", dir.display());
        let repo = Repository::clone(url, dir)?;
        Ok((Self { repo, context }, true))
    }

    pub fn context(&self) -> &GitContext {
        &self.context
    }

    /// Fetches `origin` when `rev` is not known locally.
    ///
    /// ## Errors
    ///
    /// Returns an error if there is no `origin` remote or the fetch fails.
    pub fn ensure_revision(&self, rev: &str) -> Result<()> {
        if self.repo.revparse_single(rev).is_ok() {
            return Ok(());
        }
        debug!(rev, "git fetch origin");
        let mut remote = self.repo.find_remote("origin")?;
        let mut options = FetchOptions::new();
        options.download_tags(AutotagOption::All);
        remote.fetch::<&str>(&[], Some(&mut options), None)?;
        Ok(())
    }

    /// Full commit id of `rev`.
    ///
    /// ## Errors
    ///
    /// Returns an error if `rev` does not name a commit.
    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        Ok(self.commit(rev)?.id().to_string())
    }

    fn commit(&self, rev: &str) -> Result<Commit<'_>> {
        Ok(self.repo.revparse_single(rev)?.peel_to_commit()?)
    }

    /// Commits in `previous..current`, newest first in topological order.
    ///
    /// An empty `previous` lists every ancestor of `current`.
    ///
    /// ## Errors
    ///
    /// Returns an error if either revision cannot be resolved.
    pub fn log_range(&self, previous: &str, current: &str) -> Result<Vec<Change>> {
        let mut changes = Vec::new();
        for commit in self.walk(previous, current)? {
            let id = commit.id().to_string();
            let summary = String::from_utf8_lossy(commit.summary_bytes().unwrap_or_default());
            changes.push(Change::new(&id[..SHORT_ID_LEN], summary.into_owned()).with_oid(&id));
        }
        debug!(previous, current, count = changes.len(), "read change log");
        Ok(changes)
    }

    /// Adds the authors of `previous..current` to `contributors`.
    ///
    /// Author identities go through the mailmap first.
    ///
    /// ## Errors
    ///
    /// Returns an error if either revision cannot be resolved or the mailmap
    /// cannot be read.
    pub fn contributors(
        &self,
        previous: &str,
        current: &str,
        contributors: &mut Contributors,
    ) -> Result<()> {
        let mailmap = self.mailmap()?;
        for commit in self.walk(previous, current)? {
            let author = commit.author_with_mailmap(&mailmap)?;
            let name = String::from_utf8_lossy(author.name_bytes());
            let email = String::from_utf8_lossy(author.email_bytes());
            contributors.add(&name, &email);
        }
        Ok(())
    }

    fn mailmap(&self) -> Result<Mailmap> {
        let Some(path) = &self.context.mailmap else {
            return Ok(self.repo.mailmap()?);
        };
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Mailmap::from_buffer(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no mailmap file");
                Ok(Mailmap::new()?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn walk(&self, previous: &str, current: &str) -> Result<Vec<Commit<'_>>> {
        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(self.commit(current)?.id())?;
        if !previous.is_empty() {
            walk.hide(self.commit(previous)?.id())?;
        }

        let mut commits = Vec::new();
        for oid in walk {
            let commit = self.repo.find_commit(oid?)?;
            if self.touches_subpaths(&commit)? {
                commits.push(commit);
            }
        }
        Ok(commits)
    }

    /// Whether `commit` changed any configured sub-path relative to its
    /// first parent. Merge commits that bring changes in are kept this way.
    fn touches_subpaths(&self, commit: &Commit<'_>) -> Result<bool> {
        if self.context.subpaths.is_empty() {
            return Ok(true);
        }
        let tree = commit.tree()?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };
        Ok(self.context.subpaths.iter().any(|sub| {
            entry_id(Some(&tree), sub) != entry_id(parent_tree.as_ref(), sub)
        }))
    }
}

fn entry_id(tree: Option<&Tree<'_>>, path: &str) -> Option<Oid> {
    tree?.get_path(Path::new(path)).ok().map(|entry| entry.id())
}

impl ManifestSource for GitRepo {
    fn show(&self, revision: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let Ok(commit) = self.commit(revision) else {
            debug!(revision, "unknown revision");
            return Ok(None);
        };
        let Ok(entry) = commit.tree()?.get_path(Path::new(path)) else {
            return Ok(None);
        };
        let object = entry.to_object(&self.repo)?;
        Ok(object.as_blob().map(|blob| blob.content().to_vec()))
    }
}
