use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use git2::{Oid, Repository, Signature};
use predicates::prelude::*;
use tempfile::TempDir;

const GO_MOD_V1: &str = "module example.com/proj\n\ngo 1.22\n\nrequire github.com/a/b v1.0.0\n";
const GO_MOD_V2: &str = "module example.com/proj\n\ngo 1.22\n\nrequire (\n\tgithub.com/a/b v1.0.0\n\tgithub.com/c/d v0.1.0 // indirect\n)\n";

const RELEASE: &str = r#"
project_name = "proj"
github_repo = "example/proj"
commit = "v1.1.0"
previous = "v1.0.0"
preface = "The second release."
"#;

fn commit_file(repo: &Repository, path: &str, contents: &str, message: &str) -> Oid {
    let root = repo.workdir().unwrap();
    fs::write(root.join(path), contents).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(path)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Alice", "alice@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// A repository tagged v1.0.0 and v1.1.0, where v1.1.0 adds one dependency.
fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    let first = commit_file(&repo, "go.mod", GO_MOD_V1, "Initial");
    repo.tag_lightweight("v1.0.0", &repo.find_object(first, None).unwrap(), false)
        .unwrap();
    let second = commit_file(&repo, "go.mod", GO_MOD_V2, "Add c/d");
    repo.tag_lightweight("v1.1.0", &repo.find_object(second, None).unwrap(), false)
        .unwrap();

    fs::write(dir.path().join("v1.1.0.toml"), RELEASE).unwrap();
    dir
}

// ============================================================================
// Help and Arguments
// ============================================================================

#[test]
fn test_help_flag() {
    cargo_bin_cmd!("relnotes")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generate release notes"))
        .stdout(predicate::str::contains("--dry"))
        .stdout(predicate::str::contains("--linkify"));
}

#[test]
fn test_release_file_is_required() {
    cargo_bin_cmd!("relnotes")
        .assert()
        .failure()
        .stderr(predicate::str::contains("RELEASE"));
}

#[test]
fn test_missing_release_file() {
    let dir = TempDir::new().unwrap();
    cargo_bin_cmd!("relnotes")
        .current_dir(dir.path())
        .env_remove("RELEASE_TOOL_CACHE")
        .args(["--dry", "v9.9.9.toml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("please specify the release file"));
}

// ============================================================================
// Dry Runs
// ============================================================================

#[test]
fn test_dry_run_prints_notes() {
    let dir = fixture();
    cargo_bin_cmd!("relnotes")
        .current_dir(dir.path())
        .env_remove("RELEASE_TOOL_CACHE")
        .env_remove("RUST_LOG")
        .args(["-n", "v1.1.0.toml"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("proj 1.1.0\n"))
        .stdout(predicate::str::contains("Welcome to the v1.1.0 release of proj!"))
        .stdout(predicate::str::contains("The second release."))
        .stdout(predicate::str::contains("* Alice"))
        .stdout(predicate::str::contains("`Add c/d`").not())
        .stdout(predicate::str::contains(" Add c/d"))
        .stdout(predicate::str::contains("* **github.com/c/d**"))
        .stdout(predicate::str::contains("v0.1.0 **_new_**"))
        .stdout(predicate::str::contains("github.com/a/b").not())
        .stdout(predicate::str::contains(
            "Previous release can be found at [v1.0.0](https://github.com/example/proj/releases/tag/v1.0.0)",
        ));
}

#[test]
fn test_tag_flag_overrides_file_name() {
    let dir = fixture();
    cargo_bin_cmd!("relnotes")
        .current_dir(dir.path())
        .env_remove("RELEASE_TOOL_CACHE")
        .args(["--dry", "--tag", "v1.1.0-rc.1", "v1.1.0.toml"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("proj 1.1.0-rc.1\n"));
}

#[test]
fn test_without_dry_prints_nothing() {
    let dir = fixture();
    cargo_bin_cmd!("relnotes")
        .current_dir(dir.path())
        .env_remove("RELEASE_TOOL_CACHE")
        .arg("v1.1.0.toml")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_cache_dir_layout() {
    let dir = fixture();
    let cache = TempDir::new().unwrap();
    cargo_bin_cmd!("relnotes")
        .current_dir(dir.path())
        .env("RELEASE_TOOL_CACHE", cache.path())
        .args(["--dry", "v1.1.0.toml"])
        .assert()
        .success();

    assert!(cache.path().join("object").is_dir());
    assert!(cache.path().join("git").is_dir());
}

#[test]
fn test_missing_cache_dir_fails() {
    let dir = fixture();
    cargo_bin_cmd!("relnotes")
        .current_dir(dir.path())
        .args(["--dry", "--cache", "does/not/exist", "v1.1.0.toml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_invalid_manifest_fails() {
    let dir = fixture();
    let repo = Repository::open(dir.path()).unwrap();
    let bad = commit_file(&repo, "go.mod", "module x\nrequire (\n", "Break go.mod");
    repo.tag_lightweight("v1.2.0", &repo.find_object(bad, None).unwrap(), false)
        .unwrap();
    fs::write(
        dir.path().join("v1.2.0.toml"),
        "project_name = \"proj\"\ncommit = \"v1.2.0\"\nprevious = \"v1.1.0\"\n",
    )
    .unwrap();

    cargo_bin_cmd!("relnotes")
        .current_dir(dir.path())
        .env_remove("RELEASE_TOOL_CACHE")
        .args(["--dry", "v1.2.0.toml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown file format"));
}

// ============================================================================
// Logging
// ============================================================================

#[test]
fn test_verbosity_enables_library_debug_logs() {
    let dir = fixture();
    cargo_bin_cmd!("relnotes")
        .current_dir(dir.path())
        .env_remove("RELEASE_TOOL_CACHE")
        .env_remove("RUST_LOG")
        .args(["--dry", "-vv", "v1.1.0.toml"])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsing go.mod"));
}

#[test]
fn test_rust_log_and_json_output() {
    let dir = fixture();
    cargo_bin_cmd!("relnotes")
        .current_dir(dir.path())
        .env_remove("RELEASE_TOOL_CACHE")
        .env("RUST_LOG", "relnotes_lib=debug")
        .args(["--dry", "--json", "v1.1.0.toml"])
        .assert()
        .success()
        .stderr(predicate::str::contains(r#""level":"DEBUG""#))
        .stderr(predicate::str::contains("parsing go.mod"));
}

#[test]
fn test_quiet_by_default() {
    let dir = fixture();
    cargo_bin_cmd!("relnotes")
        .current_dir(dir.path())
        .env_remove("RELEASE_TOOL_CACHE")
        .env_remove("RUST_LOG")
        .args(["--dry", "v1.1.0.toml"])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsing go.mod").not());
}
