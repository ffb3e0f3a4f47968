//! `?go-get=1` repository discovery.
//!
//! Module paths on custom domains (`golang.org/x/sync`, `gopkg.in/yaml.v3`)
//! serve an HTML page with a `go-import` meta tag naming the repository:
//!
//! ```html
//! <meta name="go-import" content="golang.org/x/sync git https://go.googlesource.com/sync">
//! ```

use std::sync::LazyLock;

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::warn;

use super::BoxFuture;
use crate::{Error, Result};

static GO_IMPORT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[name="go-import"]"#).expect("go-import selector is valid")
});

/// Fetches the discovery page for a module path.
pub trait ImportDiscovery: Send + Sync {
    /// Performs a GET on `url` and returns the response body.
    ///
    /// ## Errors
    ///
    /// Fails on transport errors and on any status >= 400.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// [`ImportDiscovery`] over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpDiscovery {
    client: Client,
}

impl HttpDiscovery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ImportDiscovery for HttpDiscovery {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();
            if status >= 400 {
                if status >= 403 {
                    warn!("Forbidden response, try setting GITHUB_ACTOR and GITHUB_TOKEN environment variables");
                }
                return Err(Error::HttpStatus {
                    status,
                    url: url.to_string(),
                });
            }
            Ok(response.text().await?)
        })
    }
}

/// Extracts the git repository URL from a discovery page.
///
/// Only `go-import` tags of the form `<prefix> git <url>` are accepted.
///
/// ## Examples
///
/// ```
/// use relnotes_lib::resolver::discovery::parse_go_import;
///
/// let html = r#"<html><head>
/// <meta name="go-import" content="golang.org/x/sync git https://go.googlesource.com/sync">
/// </head></html>"#;
/// assert_eq!(
///     parse_go_import(html).as_deref(),
///     Some("https://go.googlesource.com/sync")
/// );
/// ```
pub fn parse_go_import(body: &str) -> Option<String> {
    let document = Html::parse_document(body);
    document.select(&GO_IMPORT).find_map(|meta| {
        let content = meta.value().attr("content")?;
        match content.split_whitespace().collect::<Vec<_>>().as_slice() {
            [_, "git", url] => Some(url.to_string()),
            _ => None,
        }
    })
}
