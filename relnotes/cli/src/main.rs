//! Relnotes CLI - release notes from a TOML release descriptor
//!
//! Run from the root of the project repository.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use relnotes_lib::cache::{DirCache, NoopCache};
use relnotes_lib::config::{load_release, parse_tag};
use relnotes_lib::git::{GitContext, GitRepo};
use relnotes_lib::github::GithubClient;
use relnotes_lib::resolver::{Resolver, SharedCache};
use relnotes_lib::{ReleaseBuilder, render};
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relnotes", version)]
#[command(about = "Generate release notes between two revisions of a Go project", long_about = None)]
struct Cli {
    /// Release descriptor, named after the release tag (e.g. v1.7.0.toml)
    #[arg(value_name = "RELEASE")]
    release: PathBuf,

    /// Print the release notes to stdout
    #[arg(short = 'n', long)]
    dry: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    log_verbosity: u8,

    /// Show debug output (same as -vv)
    #[arg(short, long)]
    debug: bool,

    /// Output logs as JSON
    #[arg(long)]
    json: bool,

    /// Tag name for the release [default: release file name]
    #[arg(short, long)]
    tag: Option<String>,

    /// Add GitHub links and pull request titles to the change log
    #[arg(short, long)]
    linkify: bool,

    /// Cache directory for remote lookups and dependency clones
    #[arg(long, value_name = "DIR", env = "RELEASE_TOOL_CACHE")]
    cache: Option<PathBuf>,

    /// Ignore cached GitHub responses and fetch them again
    #[arg(long)]
    refresh_cache: bool,

    /// Mailmap file used to canonicalize contributor names
    #[arg(long, value_name = "FILE", default_value = ".mailmap")]
    mailmap: PathBuf,
}

/// Log filter for a `-v` count. `RUST_LOG` takes precedence when it parses.
fn log_filter(verbose: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(match verbose {
        0 => "warn",
        // -v: release progress and mailmap suggestions
        1 => "warn,relnotes_lib=info,relnotes=info",
        2 => "info,relnotes_lib=debug,relnotes=debug",
        _ => "debug,relnotes_lib=trace,relnotes=trace",
    })
}

fn init_tracing(verbose: u8, json: bool) {
    let registry = tracing_subscriber::registry().with(log_filter(verbose));
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(verbose >= 2)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

/// Cache backend and dependency clone directory for `--cache`.
fn open_cache(dir: Option<&PathBuf>) -> relnotes_lib::Result<(SharedCache, Option<PathBuf>)> {
    let Some(dir) = dir else {
        return Ok((Arc::new(NoopCache), None));
    };
    let dir = std::path::absolute(dir)?;
    fs::metadata(&dir)?;

    let git_root = dir.join("git");
    fs::create_dir_all(&git_root)?;
    let cache = DirCache::create(dir.join("object"))?;
    Ok((Arc::new(cache), Some(git_root)))
}

async fn run(cli: Cli) -> relnotes_lib::Result<()> {
    let tag = cli.tag.clone().unwrap_or_else(|| parse_tag(&cli.release));
    let (cache, clone_root) = open_cache(cli.cache.as_ref())?;

    let release = load_release(&cli.release)?;

    let context = GitContext::default()
        .with_mailmap(std::path::absolute(&cli.mailmap)?)
        .with_subpaths(release.subpath().map(|s| vec![s.to_string()]).unwrap_or_default());
    let repo = GitRepo::open(".", context)?;

    let client = reqwest::Client::builder().user_agent("relnotes").build()?;
    let resolver = Resolver::with_defaults(cache.clone(), client.clone());
    let github = GithubClient::new(client, cache).with_refresh(cli.refresh_cache);

    let mut builder = ReleaseBuilder::new(release, tag).with_linkify(cli.linkify);
    if let Some(root) = clone_root {
        builder = builder.with_clone_root(root);
    }
    let notes = builder.generate(&repo, &resolver, &github).await?;

    if cli.dry {
        print!("{}", render(&notes));
    } else {
        info!("release complete!");
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // GITHUB_ACTOR / GITHUB_TOKEN may come from a .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let verbosity = if cli.debug {
        cli.log_verbosity.max(2)
    } else {
        cli.log_verbosity
    };
    init_tracing(verbosity, cli.json);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
