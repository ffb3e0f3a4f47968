use std::path::PathBuf;

/// Error types for the relnotes library.
///
/// Every failure aborts the run; there is no partial-result mode. Errors
/// raised while resolving a single dependency are wrapped in
/// [`Error::Dependency`] so the offending name is reported.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// None of the supported manifest files exist at the revision.
    #[error("finding dependency file failed: no supported manifest at {revision}")]
    NoManifestFound { revision: String },

    /// A manifest line or directive could not be parsed.
    #[error("unknown file format: {0}")]
    InvalidFormat(String),

    /// The `?go-get=1` page had no usable `go-import` meta tag.
    #[error("no go-import meta tag for {name}")]
    NoImportMetaFound { name: String },

    /// Remote listing produced no hash for the requested reference.
    #[error("revision {reference} not found at {url}")]
    RevisionNotFound { url: String, reference: String },

    /// An HTTP endpoint answered with status >= 400.
    #[error("unexpected status code {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Resolution for a single dependency failed.
    #[error("dependency {name}: {source}")]
    Dependency {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// The release descriptor could not be found.
    #[error("please specify the release file as the first argument: {0} does not exist")]
    ReleaseFile(PathBuf),

    /// A pull request came back without a title.
    #[error("unexpected empty title for {0}")]
    EmptyTitle(String),

    /// Log output did not have the expected shape.
    #[error("unparsable git log output: {0}")]
    UnparsableLog(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Git operation failed.
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// IO error occurred during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The release descriptor is not valid TOML.
    #[error("invalid release file: {0}")]
    Toml(#[from] toml::de::Error),

    /// Cached metadata could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `match_deps` is not a valid regular expression.
    #[error("unable to compile 'match_deps' regexp: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Wraps this error with the name of the dependency being resolved.
    pub fn for_dependency(self, name: impl Into<String>) -> Self {
        Error::Dependency {
            name: name.into(),
            source: Box::new(self),
        }
    }
}

/// Convenience Result type for relnotes operations.
pub type Result<T> = std::result::Result<T, Error>;
