//! Legacy `vendor.conf` parsing.
//!
//! Each line is `name ref [url]`. `#` starts a comment. Full 40 character
//! commit ids are shortened to the 12 characters used by module
//! pseudo-versions so both formats compare equal.

use std::sync::LazyLock;

use regex::Regex;

use crate::dependency::{DependencyRecord, DependencySet};
use crate::{Error, Result};

/// Length commit ids are truncated to.
pub const SHORT_COMMIT_LEN: usize = 12;

static FULL_SHA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9a-f]{40}$").expect("valid sha regex"));

/// Strips comments and surrounding whitespace from a line.
///
/// Returns an empty string for blank or fully commented lines.
pub fn sanitize_line<'a>(line: &'a str, comment: &str) -> &'a str {
    let line = line.trim();
    match line.find(comment) {
        Some(0) => "",
        Some(idx) => line[..idx].trim(),
        None => line,
    }
}

pub fn parse(text: &str) -> Result<DependencySet> {
    let mut deps = DependencySet::new();

    for raw in text.lines() {
        let line = sanitize_line(raw, "#");
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(Error::InvalidFormat(format!("invalid config format: {line}")));
        }

        let mut record = if FULL_SHA.is_match(parts[1]) {
            let short = &parts[1][..SHORT_COMMIT_LEN];
            DependencyRecord::new(parts[0], short).with_commit(short)
        } else {
            DependencyRecord::new(parts[0], parts[1])
        };

        if let Some(url) = parts.get(2) {
            record = record.with_source_url(*url);
        }
        deps.insert(record);
    }

    Ok(deps)
}
