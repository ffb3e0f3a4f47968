//! Version and commit normalization for module versions.
//!
//! Module versions come in two shapes: plain semantic version tags
//! (`v1.2.3`, `v1.0.0-rc1`) and pseudo-versions that embed a commit id
//! (`v0.0.0-20171204204709-577dee27f20d`). Comparing previous and current
//! dependencies only makes sense on the canonical part, so pseudo-versions
//! are reduced to their commit id.
//!
//! ## Examples
//!
//! ```
//! use relnotes_lib::version::normalize;
//!
//! let n = normalize("v0.0.0-20171204204709-577dee27f20d");
//! assert_eq!(n.reference, "577dee27f20d");
//! assert!(n.is_commit);
//!
//! let n = normalize("v16.2.1+incompatible");
//! assert_eq!(n.reference, "v16.2.1");
//! assert!(!n.is_commit);
//! ```

/// Suffix the module system appends to pre-module major versions.
const INCOMPATIBLE: &str = "+incompatible";

/// Result of normalizing a version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Tag, branch, or commit id. Empty when the token was malformed.
    pub reference: String,
    /// Whether `reference` is a commit id taken from a pseudo-version.
    pub is_commit: bool,
}

impl Normalized {
    /// Returns true when normalization failed.
    pub fn is_invalid(&self) -> bool {
        self.reference.is_empty()
    }
}

/// Normalizes a module version into a tag or a commit id.
///
/// - more than three `-` separated segments is an error (empty reference)
/// - exactly three segments is a pseudo-version; the last segment is the commit
/// - one or two segments is a tag, possibly a pre-release, used as is
///
/// A trailing `+incompatible` annotation is cut in every case.
pub fn normalize(token: &str) -> Normalized {
    let segments: Vec<&str> = token.split('-').filter(|s| !s.is_empty()).collect();

    if segments.len() > 3 {
        return Normalized {
            reference: String::new(),
            is_commit: false,
        };
    }

    let (reference, is_commit) = if segments.len() == 3 {
        (segments[2], true)
    } else {
        (token, false)
    };

    let reference = match reference.find(INCOMPATIBLE) {
        Some(idx) if idx > 0 => &reference[..idx],
        _ => reference,
    };

    Normalized {
        reference: reference.to_string(),
        is_commit,
    }
}
