//! GitHub metadata for change log lines.
//!
//! Merge commits created by pull requests carry the PR number in their
//! summary (`Merge pull request #123 from user/branch`). With linkify
//! enabled, [`ChangeProcessor`] looks those up through the REST API to get
//! the title, labels, and release note, and turns every other commit into a
//! link to the commit page.
//!
//! API responses are cached under keys naming the URL and the fields kept,
//! so a warm cache can regenerate notes offline.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::changes::Change;
use crate::resolver::SharedCache;
use crate::{Error, Result};

/// Default REST API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const WEB_URL: &str = "https://github.com";

static MERGE_PR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Merge pull request(?: #([0-9]+))? from (\S+)$").expect("merge regex is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestLabel {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The subset of a pull request kept in the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub labels: Vec<PullRequestLabel>,
    #[serde(default)]
    pub body: Option<String>,
}

/// The subset of a repository security advisory kept in the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryInfo {
    #[serde(rename = "cve_id", default)]
    pub cve: Option<String>,
    #[serde(rename = "html_url", default)]
    pub link: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

/// Basic-auth credentials for the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub token: String,
}

impl Credentials {
    /// Reads `GITHUB_ACTOR` and `GITHUB_TOKEN`. Both must be set.
    pub fn from_env() -> Option<Self> {
        let user = std::env::var("GITHUB_ACTOR").ok().filter(|v| !v.is_empty())?;
        let token = std::env::var("GITHUB_TOKEN").ok().filter(|v| !v.is_empty())?;
        Some(Self { user, token })
    }
}

/// Cached client for the pull request and advisory endpoints.
pub struct GithubClient {
    client: Client,
    base_url: String,
    cache: SharedCache,
    /// Skip cache reads; responses are still written back.
    refresh: bool,
    credentials: Option<Credentials>,
}

impl GithubClient {
    /// Creates a client for the public API with credentials from the
    /// environment.
    pub fn new(client: Client, cache: SharedCache) -> Self {
        Self {
            client,
            base_url: DEFAULT_API_URL.to_string(),
            cache,
            refresh: false,
            credentials: Credentials::from_env(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Fetches a pull request.
    ///
    /// See <https://docs.github.com/en/rest/pulls/pulls#get-a-pull-request>.
    ///
    /// ## Errors
    ///
    /// - [`Error::HttpStatus`] for responses with status >= 400
    /// - [`Error::EmptyTitle`] when the pull request has no title
    pub async fn pull_request(&self, repo: &str, number: u64) -> Result<PullRequestInfo> {
        let url = format!("{}/repos/{repo}/pulls/{number}", self.base_url);
        let key = format!("{url} title labels");
        if let Some(info) = self.cached::<PullRequestInfo>(&key) {
            return Ok(info);
        }

        let info: PullRequestInfo = self.get_json(&url).await?;
        if info.title.is_empty() {
            return Err(Error::EmptyTitle(url));
        }
        self.store(&key, &info);
        Ok(info)
    }

    /// Fetches a repository security advisory.
    ///
    /// See <https://docs.github.com/en/rest/security-advisories/repository-advisories>.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::HttpStatus`] for responses with status >= 400.
    pub async fn advisory(&self, repo: &str, ghsa: &str) -> Result<AdvisoryInfo> {
        let url = format!("{}/repos/{repo}/security-advisories/{ghsa}", self.base_url);
        let key = format!("{url} cve link summary description severity");
        if let Some(info) = self.cached::<AdvisoryInfo>(&key) {
            return Ok(info);
        }

        let info: AdvisoryInfo = self.get_json(&url).await?;
        self.store(&key, &info);
        Ok(info)
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if self.refresh {
            return None;
        }
        let bytes = self.cache.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(info) => {
                debug!(cache = "hit", "{key}");
                Some(info)
            }
            Err(e) => {
                debug!(key, error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, info: &T) {
        let written = serde_json::to_vec(info)
            .map_err(Error::from)
            .and_then(|bytes| self.cache.put(key, &bytes));
        if let Err(e) = written {
            debug!(key, error = %e, "failed to cache response");
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(cache = "miss", "{url}");
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", "relnotes")
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .timeout(Duration::from_secs(30));
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.user, Some(&credentials.token));
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if status >= 400 {
            if status >= 403 {
                warn!(
                    "Forbidden response, try setting GITHUB_ACTOR and GITHUB_TOKEN environment variables"
                );
            }
            return Err(Error::HttpStatus {
                status,
                url: url.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

/// Formats change log lines with GitHub links and metadata.
pub struct ChangeProcessor<'a> {
    github: &'a GithubClient,
    /// `owner/name` of the repository the commits belong to.
    repo: String,
    /// Prefix shown before `#123` in pull request links.
    link_name: String,
}

impl<'a> ChangeProcessor<'a> {
    pub fn new(github: &'a GithubClient, repo: impl Into<String>, link_name: impl Into<String>) -> Self {
        Self {
            github,
            repo: repo.into(),
            link_name: link_name.into(),
        }
    }

    /// Fills in the title, link, flags, and formatted line of a change.
    ///
    /// ## Errors
    ///
    /// Fails when a referenced pull request or advisory cannot be fetched.
    pub async fn process(&self, change: &mut Change) -> Result<()> {
        if let Some(caps) = MERGE_PR.captures(&change.description) {
            let source = caps.get(2).map_or("", |m| m.as_str()).to_string();
            if let Some(number) = caps.get(1) {
                let number: u64 = number.as_str().parse().map_err(|_| {
                    Error::InvalidFormat(format!("pull request number in {:?}", change.description))
                })?;
                let info = self.github.pull_request(&self.repo, number).await?;
                self.pr_change(change, &info, number);
            } else if source.starts_with("GHSA-") {
                let info = self.github.advisory(&self.repo, &source).await?;
                self.advisory_change(change, &info, &source);
            } else {
                debug!("Nothing matched: {:?}", change.description);
            }
            change.is_merge = true;
        } else if change.description.starts_with("Merge") {
            debug!("Not matched: {:?}", change.description);
        }

        if change.formatted.is_empty() {
            let id = if change.oid.is_empty() {
                &change.commit
            } else {
                &change.oid
            };
            change.title = change.description.clone();
            change.link = format!("{WEB_URL}/{}/commit/{id}", self.repo);
            change.formatted = format!("[`{}`]({}) {}", change.commit, change.link, change.description);
        }
        Ok(())
    }

    fn pr_change(&self, change: &mut Change, info: &PullRequestInfo, number: u64) {
        for label in &info.labels {
            match label.name.as_str() {
                "impact/changelog" => change.is_highlight = true,
                "impact/breaking" => change.is_breaking = true,
                "impact/deprecation" => change.is_deprecation = true,
                name if name.starts_with("area/") => {
                    if let Some(description) = label.description.as_deref().filter(|d| !d.is_empty()) {
                        change.categories.insert(description.to_string());
                    }
                }
                _ => {}
            }
        }
        change.category = change.categories.iter().next().cloned().unwrap_or_default();

        change.title = strip_title_prefix(&info.title).to_string();
        if change.link.is_empty() {
            change.link = format!("{WEB_URL}/{}/pull/{number}", self.repo);
        }
        let reference = format!("([{}#{number}]({}))", self.link_name, change.link);
        change.formatted = format!("{} {reference}", change.title);
        change.highlight = match info.body.as_deref().and_then(release_note) {
            Some(note) => format!("{note} {reference}"),
            None => change.formatted.clone(),
        };
    }

    fn advisory_change(&self, change: &mut Change, info: &AdvisoryInfo, ghsa: &str) {
        change.is_security = true;
        change.link = match info.link.as_deref().filter(|l| !l.is_empty()) {
            Some(link) => link.to_string(),
            None => format!("{WEB_URL}/{}/security/advisories/{ghsa}", self.repo),
        };
        let summary = info
            .summary
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("Github Security Advisory");
        change.title = summary.to_string();
        change.formatted = format!("{summary} [{ghsa}]({})", change.link);

        let details: Vec<&str> = [info.cve.as_deref(), info.severity.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if !details.is_empty() {
            change.formatted = format!("[{}] {}", details.join(", "), change.formatted);
        }
        change.highlight = change.formatted.clone();
    }
}

/// Drops a leading `[area]` tag from a pull request title.
///
/// ## Examples
///
/// ```
/// use relnotes_lib::github::strip_title_prefix;
///
/// assert_eq!(strip_title_prefix("[release/1.7] Fix leak"), "Fix leak");
/// assert_eq!(strip_title_prefix("Fix leak"), "Fix leak");
/// ```
pub fn strip_title_prefix(title: &str) -> &str {
    if let Some(rest) = title.strip_prefix('[')
        && let Some(idx) = rest.find(']')
        && idx > 0
    {
        return rest[idx + 1..].trim();
    }
    title
}

/// Extracts the note from a ```` ```release-note ```` fenced block.
///
/// Lines are joined with spaces. An empty note or `NONE` counts as no note.
pub fn release_note(body: &str) -> Option<String> {
    const FENCE: &str = "```release-note";
    let start = body.find(FENCE)? + FENCE.len();
    let rest = &body[start..];
    let rest = &rest[rest.find('\n')? + 1..];
    let end = rest.find("```")?;

    let note = rest[..end]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if note.is_empty() || note.eq_ignore_ascii_case("none") {
        return None;
    }
    Some(note)
}
