//! Release note generation for Go projects.
//!
//! Given a release descriptor naming the previous and current revisions,
//! the library collects the commit log and contributors between them,
//! works out which dependencies actually changed, and renders a markdown
//! document. The central piece is the dependency diff: declared versions
//! are resolved to commits on their source repositories, so a version
//! bump that points at the same code is not reported.

pub mod cache;
pub mod changes;
pub mod config;
pub mod dependency;
pub mod error;
pub mod git;
pub mod github;
pub mod manifest;
pub mod reconcile;
pub mod release;
pub mod render;
pub mod resolver;
pub mod version;

pub use error::{Error, Result};
pub use release::{ReleaseBuilder, ReleaseNotes};
pub use render::render;
