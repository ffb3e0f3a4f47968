//! Commit lines, contributors, and highlight grouping.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info};

/// One commit in a project's change log.
///
/// `formatted` is the rendered line. It is filled in by a change processor
/// (see [`crate::github`]) or by [`Change::format_plain`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Change {
    /// Abbreviated commit id.
    pub commit: String,
    /// Full commit id, when known.
    pub oid: String,
    /// Commit summary line.
    pub description: String,
    pub title: String,
    pub link: String,
    pub formatted: String,
    /// Line used in the highlights section; may carry a release note
    /// instead of the title.
    pub highlight: String,
    pub is_merge: bool,
    pub is_highlight: bool,
    pub is_breaking: bool,
    pub is_deprecation: bool,
    pub is_security: bool,
    /// Area descriptions taken from the pull request labels.
    pub categories: BTreeSet<String>,
    /// Highlight group this change is listed under.
    pub category: String,
}

impl Change {
    pub fn new(commit: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_oid(mut self, oid: impl Into<String>) -> Self {
        self.oid = oid.into();
        self
    }

    /// Fills `formatted` with the commit id and summary when nothing else did.
    pub fn format_plain(&mut self) {
        if self.formatted.is_empty() {
            self.title = self.description.clone();
            self.formatted = format!("`{}` {}", self.commit, self.description);
        }
    }
}

/// The change log of one project. `name` is empty for the main project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectChanges {
    pub name: String,
    pub changes: Vec<Change>,
}

impl ProjectChanges {
    pub fn new(name: impl Into<String>, changes: Vec<Change>) -> Self {
        Self {
            name: name.into(),
            changes,
        }
    }
}

/// A commit author, aggregated by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contributor {
    pub name: String,
    pub email: String,
    pub commits: usize,
    /// Other names seen with the same email.
    pub other_names: Vec<String>,
}

/// Authors seen across every project in a release, keyed by email.
#[derive(Debug, Clone, Default)]
pub struct Contributors {
    by_email: BTreeMap<String, Contributor>,
}

impl Contributors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` belongs to an automated account.
    pub fn is_bot(name: &str) -> bool {
        name == "bot" || name.contains("[bot]")
    }

    /// Counts one commit by `name <email>`. Bot accounts are skipped.
    pub fn add(&mut self, name: &str, email: &str) {
        if Self::is_bot(name) {
            debug!("Skipping bot contributor: {name} <{email}>");
            return;
        }
        match self.by_email.get_mut(email) {
            Some(c) => {
                c.commits += 1;
                if c.name != name && !c.other_names.iter().any(|n| n == name) {
                    c.other_names.push(name.to_string());
                }
            }
            None => {
                self.by_email.insert(
                    email.to_string(),
                    Contributor {
                        name: name.to_string(),
                        email: email.to_string(),
                        commits: 1,
                        other_names: Vec::new(),
                    },
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_email.is_empty()
    }

    /// Contributors by commit count descending, then name ascending.
    ///
    /// Logs mailmap suggestions for authors seen under several names or
    /// emails.
    pub fn order(&self) -> Vec<Contributor> {
        let all = self.sorted();
        for c in &all {
            debug!("Contributor: {} <{}> with {} commits", c.name, c.email, c.commits);
        }
        for suggestion in mailmap_suggestions(&all) {
            info!("Mailmap suggestion: {suggestion}");
        }
        all
    }

    fn sorted(&self) -> Vec<Contributor> {
        let mut all: Vec<Contributor> = self.by_email.values().cloned().collect();
        all.sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.name.cmp(&b.name)));
        all
    }
}

/// Suggested `.mailmap` entries for an ordered contributor list.
pub fn mailmap_suggestions(ordered: &[Contributor]) -> Vec<String> {
    let mut suggestions = Vec::new();
    let mut name_email: HashMap<&str, &str> = HashMap::new();

    for c in ordered {
        for other in &c.other_names {
            suggestions.push(format!(
                "\"{} <{}>\" also has name {:?}",
                c.name, c.email, other
            ));
        }
        match name_email.get(c.name.as_str()) {
            Some(first) => suggestions.push(format!(
                "\"{} <{}> <{}>\" has multiple emails",
                c.name, first, c.email
            )),
            None => {
                name_email.insert(&c.name, &c.email);
            }
        }
    }
    suggestions
}

/// A highlighted change and the project it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightChange {
    pub project: String,
    pub change: Change,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightCategory {
    pub name: String,
    pub changes: Vec<HighlightChange>,
}

pub const SECURITY_CATEGORY: &str = "Security Advisories";
pub const BREAKING_CATEGORY: &str = "Breaking";
pub const DEPRECATION_CATEGORY: &str = "Deprecations";

/// Groups highlighted changes across projects.
///
/// Regular highlights are grouped by category in name order, followed by
/// security advisories, breaking changes, and deprecations. A breaking or
/// deprecating change can appear both in its category and in its own group.
pub fn group_highlights(projects: &[ProjectChanges]) -> Vec<HighlightCategory> {
    let mut security = Vec::new();
    let mut breaking = Vec::new();
    let mut deprecation = Vec::new();
    let mut categories: BTreeMap<&str, Vec<HighlightChange>> = BTreeMap::new();

    for project in projects {
        for c in &project.changes {
            let entry = || HighlightChange {
                project: project.name.clone(),
                change: c.clone(),
            };
            if c.is_security {
                security.push(entry());
            } else if c.is_highlight {
                categories.entry(c.category.as_str()).or_default().push(entry());
            }

            if c.is_deprecation {
                deprecation.push(entry());
            } else if c.is_breaking {
                breaking.push(entry());
            }
        }
    }

    let mut highlights: Vec<HighlightCategory> = categories
        .into_iter()
        .map(|(name, changes)| HighlightCategory {
            name: name.to_string(),
            changes,
        })
        .collect();

    for (name, changes) in [
        (SECURITY_CATEGORY, security),
        (BREAKING_CATEGORY, breaking),
        (DEPRECATION_CATEGORY, deprecation),
    ] {
        if !changes.is_empty() {
            highlights.push(HighlightCategory {
                name: name.to_string(),
                changes,
            });
        }
    }
    highlights
}
