//! `vendor/modules.txt` parsing.
//!
//! Only `# ...` header lines matter. They come in these shapes:
//!
//! ```text
//! # name version
//! # old => new version                (replace without old version)
//! # old oldversion => new version     (replace)
//! # old => ./local/path               (filesystem replace)
//! # old oldversion => ./local/path    (filesystem replace)
//! ```
//!
//! Package lines and `## explicit` markers are ignored.

use std::collections::BTreeMap;

use crate::dependency::{DependencyRecord, DependencySet};
use crate::version::normalize;
use crate::{Error, Result};

pub fn parse(text: &str, replaced: &mut BTreeMap<String, String>) -> Result<DependencySet> {
    let mut deps = DependencySet::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts[0] != "#" {
            continue;
        }

        let version = match parts.as_slice() {
            [_, _, version] => *version,
            // the versioned form of this replace also appears, so it carries the dependency
            [_, old, "=>", new, _] => {
                replaced.insert(old.to_string(), new.to_string());
                continue;
            }
            [_, old, _, "=>", new, version] => {
                replaced.insert(old.to_string(), new.to_string());
                *version
            }
            [_, old, "=>", path] | [_, old, _, "=>", path] => {
                replaced.insert(old.to_string(), path.to_string());
                continue;
            }
            _ => return Err(Error::InvalidFormat(line.to_string())),
        };

        let normalized = normalize(version);
        if normalized.is_invalid() {
            return Err(Error::InvalidFormat(format!(
                "poorly formatted version {version} in {line}"
            )));
        }
        deps.insert(DependencyRecord::from_normalized(parts[1], normalized));
    }

    Ok(deps)
}
