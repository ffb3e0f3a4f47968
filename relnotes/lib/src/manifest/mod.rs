//! Dependency manifest parsing.
//!
//! Three manifest formats are supported, each producing the same
//! [`DependencySet`](crate::dependency::DependencySet):
//!
//! - [`vendor_conf`]: the legacy flat `vendor.conf` file
//! - [`modules_txt`]: the generated `vendor/modules.txt` lock manifest
//! - [`go_mod`]: the `go.mod` module-definition file
//!
//! [`load`] tries them in a fixed order against a revision and the first
//! file found wins.
//!
//! ## Examples
//!
//! ```
//! use relnotes_lib::manifest::ManifestKind;
//!
//! let output = ManifestKind::ModulesTxt
//!     .parse(b"# example.com/pkg v1.0.0\nexample.com/pkg\n")
//!     .unwrap();
//! assert_eq!(output.dependencies.get("example.com/pkg").unwrap().declared_ref, "v1.0.0");
//! ```

pub mod go_mod;
pub mod modules_txt;
pub mod vendor_conf;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::dependency::DependencySet;
use crate::{Error, Result};

/// Provides file contents at a given revision.
///
/// Returns `Ok(None)` when the file does not exist at that revision.
pub trait ManifestSource {
    fn show(&self, revision: &str, path: &str) -> Result<Option<Vec<u8>>>;
}

/// The supported manifest formats, in lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// `vendor.conf`: `name ref [url]` per line
    VendorConf,
    /// `vendor/modules.txt`: `# name version` lines written by `go mod vendor`
    ModulesTxt,
    /// `go.mod`: `require` and `replace` directives
    GoMod,
}

impl ManifestKind {
    /// Path of the manifest relative to the module root.
    pub fn file_name(self) -> &'static str {
        match self {
            ManifestKind::VendorConf => "vendor.conf",
            ManifestKind::ModulesTxt => "vendor/modules.txt",
            ManifestKind::GoMod => "go.mod",
        }
    }

    /// Parses manifest contents of this kind.
    pub fn parse(self, contents: &[u8]) -> Result<ManifestOutput> {
        let text = String::from_utf8_lossy(contents);
        let mut replaced = BTreeMap::new();
        let dependencies = match self {
            ManifestKind::VendorConf => vendor_conf::parse(&text)?,
            ManifestKind::ModulesTxt => modules_txt::parse(&text, &mut replaced)?,
            ManifestKind::GoMod => go_mod::parse(&text, &mut replaced)?,
        };
        Ok(ManifestOutput {
            kind: self,
            dependencies,
            replaced,
        })
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Parsed manifest along with its diagnostic replacement map.
#[derive(Debug, Clone)]
pub struct ManifestOutput {
    pub kind: ManifestKind,
    pub dependencies: DependencySet,
    /// `original name -> replacement name`, for reporting only.
    pub replaced: BTreeMap<String, String>,
}

/// Candidate manifest paths for a revision, in lookup order.
///
/// `vendor.conf` is only looked up at the repository root. When a module
/// sub-path is given, its manifests are tried before the root ones.
pub fn candidates(subpath: Option<&str>) -> Vec<(ManifestKind, String)> {
    let mut paths = vec![(
        ManifestKind::VendorConf,
        ManifestKind::VendorConf.file_name().to_string(),
    )];

    if let Some(sub) = subpath.filter(|s| !s.is_empty()) {
        for kind in [ManifestKind::ModulesTxt, ManifestKind::GoMod] {
            let joined = Path::new(sub).join(kind.file_name());
            paths.push((kind, joined.to_string_lossy().into_owned()));
        }
    }

    for kind in [ManifestKind::ModulesTxt, ManifestKind::GoMod] {
        paths.push((kind, kind.file_name().to_string()));
    }
    paths
}

/// Loads and parses the first manifest found at `revision`.
///
/// ## Errors
///
/// Returns [`Error::NoManifestFound`] when none of the candidates exist, and
/// [`Error::InvalidFormat`] when the manifest found is malformed.
pub fn load(
    source: &impl ManifestSource,
    revision: &str,
    subpath: Option<&str>,
) -> Result<ManifestOutput> {
    for (kind, path) in candidates(subpath) {
        if let Some(contents) = source.show(revision, &path)? {
            debug!(revision, path = %path, "parsing {kind}");
            return kind.parse(&contents);
        }
    }
    Err(Error::NoManifestFound {
        revision: revision.to_string(),
    })
}
