//! Remote revision resolution.
//!
//! Turns a dependency into a canonical commit id so that two declared
//! references can be compared by content rather than by spelling. Two steps
//! may be needed:
//!
//! 1. [`Resolver::resolve_url`] finds the repository of a module path through
//!    `?go-get=1` discovery when no known-host rule applied.
//! 2. [`Resolver::resolve_revision`] lists the remote for the reference (and
//!    its peeled tag form) and returns the 12 character commit id.
//!
//! Both steps go through the [`Cache`](crate::cache::Cache) so that a run
//! never asks the network twice for the same thing.

pub mod discovery;
pub mod lister;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::cache::Cache;
use crate::manifest::vendor_conf::SHORT_COMMIT_LEN;
use crate::{Error, Result};

pub use discovery::{HttpDiscovery, ImportDiscovery, parse_go_import};
pub use lister::{GitRemoteLister, RevisionLister};

/// Boxed future type for async trait methods.
///
/// This type alias provides dyn-compatible async method returns.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Cache shared between the resolver and the GitHub client.
pub type SharedCache = Arc<dyn Cache + Send + Sync>;

/// Resolves module paths to repositories and references to commits.
pub struct Resolver {
    cache: SharedCache,
    discovery: Box<dyn ImportDiscovery>,
    lister: Box<dyn RevisionLister>,
    /// In-process results, so a non-persistent cache still avoids repeats.
    seen: Mutex<HashMap<String, String>>,
}

impl Resolver {
    pub fn new(
        cache: SharedCache,
        discovery: impl ImportDiscovery + 'static,
        lister: impl RevisionLister + 'static,
    ) -> Self {
        Self {
            cache,
            discovery: Box::new(discovery),
            lister: Box::new(lister),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// A resolver using HTTP discovery and libgit2 remote listing.
    pub fn with_defaults(cache: SharedCache, client: reqwest::Client) -> Self {
        Self::new(cache, HttpDiscovery::new(client), GitRemoteLister)
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(hit) = self.seen.lock().ok().and_then(|seen| seen.get(key).cloned()) {
            debug!(cache = "hit", "{key}");
            return Some(hit);
        }
        let hit = self
            .cache
            .get(key)
            .map(|b| String::from_utf8_lossy(&b).into_owned())?;
        debug!(cache = "hit", "{key}");
        self.remember(key, &hit);
        Some(hit)
    }

    fn remember(&self, key: &str, value: &str) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(key.to_string(), value.to_string());
        }
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.remember(key, value);
        self.cache.put(key, value.as_bytes())
    }

    /// Discovers the git repository URL of a module path.
    ///
    /// ## Errors
    ///
    /// - [`Error::HttpStatus`] / [`Error::Http`] when the discovery request fails
    /// - [`Error::NoImportMetaFound`] when the page has no `go-import` git tag
    pub async fn resolve_url(&self, name: &str) -> Result<String> {
        let url = discovery_url(name);
        if let Some(hit) = self.lookup(&url) {
            return Ok(hit);
        }
        debug!(cache = "miss", "{url}");

        let body = self.discovery.fetch(&url).await?;
        let resolved = parse_go_import(&body).ok_or_else(|| Error::NoImportMetaFound {
            name: name.to_string(),
        })?;

        self.store(&url, &resolved)?;
        Ok(resolved)
    }

    /// Resolves `reference` in the repository at `url` to a short commit id.
    ///
    /// When listing fails, the last path segment of the URL is dropped and
    /// the listing retried, which finds modules nested inside a parent
    /// repository. This stops once fewer than three segments remain.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::RevisionNotFound`] when every URL failed or the
    /// listing had no entry for the reference.
    pub async fn resolve_revision(&self, url: &str, reference: &str) -> Result<String> {
        let key = format!("git ls-remote {url} {reference} {reference}^{{}}");
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }
        debug!(cache = "miss", "{key}");

        let not_found = || Error::RevisionNotFound {
            url: url.to_string(),
            reference: reference.to_string(),
        };

        let patterns = vec![reference.to_string(), format!("{reference}^{{}}")];
        let mut current = url.to_string();
        let output = loop {
            match self.lister.list(&current, &patterns).await {
                Ok(output) => break output,
                Err(e) => {
                    debug!(key = %key, url = %current, error = %e, "ls-remote failed");
                    current = next_url_try(&current).ok_or_else(not_found)?;
                }
            }
        };

        let commit = parse_ls_remote(&output).ok_or_else(not_found)?;
        self.store(&key, &commit)?;
        Ok(commit)
    }
}

/// URL queried for `?go-get=1` discovery of a module path.
pub fn discovery_url(name: &str) -> String {
    format!("https://{name}?go-get=1")
}

/// Drops the last path segment of a repository URL.
///
/// Returns `None` once fewer than three segments (host included) remain.
///
/// ## Examples
///
/// ```
/// use relnotes_lib::resolver::next_url_try;
///
/// assert_eq!(
///     next_url_try("https://github.com/org/repo/sub").as_deref(),
///     Some("https://github.com/org/repo")
/// );
/// assert_eq!(next_url_try("https://github.com/org"), None);
/// ```
pub fn next_url_try(url: &str) -> Option<String> {
    let (prefix, rest) = match url.strip_prefix("https://") {
        Some(rest) => ("https://", rest),
        None => ("", url),
    };
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.len() < 3 {
        return None;
    }
    Some(format!("{prefix}{}", parts[..parts.len() - 1].join("/")))
}

/// Picks the commit id out of `ls-remote` output.
///
/// Peeled tag entries (`ref^{}`) point at the commit rather than the tag
/// object, so once one is seen, plain entries are ignored.
pub fn parse_ls_remote(output: &str) -> Option<String> {
    let mut commit: Option<&str> = None;
    let mut peeled = false;

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [hash, name] = fields.as_slice() else {
            continue;
        };
        if name.ends_with("^{}") {
            peeled = true;
        } else if peeled {
            continue;
        }
        commit = Some(*hash);
    }

    commit.map(|c| c.chars().take(SHORT_COMMIT_LEN).collect())
}
