//! Remote reference listing (`git ls-remote`).

use git2::{Direction, Remote};
use tracing::debug;

use super::BoxFuture;
use crate::Result;

/// Lists references advertised by a remote repository.
pub trait RevisionLister: Send + Sync {
    /// Returns `hash\tref` lines for every advertised reference matching one
    /// of `patterns`, the way `git ls-remote <url> <patterns>...` does.
    ///
    /// ## Errors
    ///
    /// Fails when the remote cannot be reached or is not a repository.
    fn list<'a>(&'a self, url: &'a str, patterns: &'a [String]) -> BoxFuture<'a, Result<String>>;
}

/// [`RevisionLister`] backed by libgit2.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitRemoteLister;

impl GitRemoteLister {
    fn list_blocking(url: &str, patterns: &[String]) -> Result<String> {
        let mut remote = Remote::create_detached(url)?;
        remote.connect(Direction::Fetch)?;

        let mut out = String::new();
        for head in remote.list()? {
            if patterns.iter().any(|p| ref_matches(head.name(), p)) {
                out.push_str(&format!("{}\t{}\n", head.oid(), head.name()));
            }
        }
        remote.disconnect()?;

        debug!(url, lines = out.lines().count(), "listed remote refs");
        Ok(out)
    }
}

impl RevisionLister for GitRemoteLister {
    fn list<'a>(&'a self, url: &'a str, patterns: &'a [String]) -> BoxFuture<'a, Result<String>> {
        Box::pin(std::future::ready(Self::list_blocking(url, patterns)))
    }
}

/// Matches a reference name against an `ls-remote` pattern: the whole name,
/// or a tail of it starting after a `/`.
pub fn ref_matches(name: &str, pattern: &str) -> bool {
    if name == pattern {
        return true;
    }
    name.strip_suffix(pattern)
        .is_some_and(|prefix| prefix.ends_with('/'))
}
