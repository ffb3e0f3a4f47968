//! `go.mod` parsing.
//!
//! Reads the `require` and `replace` directives in both their single-line
//! and parenthesized block forms. Other directives (`module`, `go`,
//! `toolchain`, `exclude`, `retract`, `godebug`, `tool`, `ignore`) are
//! accepted and skipped.
//!
//! Replacements pointing at a local path have no remote identity and are
//! ignored. Any other replacement supersedes the reference and source URL of
//! the required module it replaces.

use std::collections::BTreeMap;

use tracing::debug;

use crate::dependency::{DependencyRecord, DependencySet, known_git_url};
use crate::version::normalize;
use crate::{Error, Result};

const KNOWN_VERBS: &[&str] = &[
    "module",
    "go",
    "toolchain",
    "godebug",
    "require",
    "replace",
    "exclude",
    "retract",
    "tool",
    "ignore",
];

/// A module path with an optional version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleVersion {
    pub path: String,
    pub version: Option<String>,
}

/// A `replace old [v] => new [v]` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    pub old: ModuleVersion,
    pub new: ModuleVersion,
}

impl Replace {
    /// Whether the replacement is a directory on disk.
    pub fn is_local(&self) -> bool {
        let p = &self.new.path;
        p.starts_with("./") || p.starts_with("../") || p.starts_with('/') || p == "." || p == ".."
    }
}

/// The parts of a `go.mod` file relevant to dependency tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoMod {
    pub module: Option<String>,
    pub require: Vec<ModuleVersion>,
    pub replace: Vec<Replace>,
}

/// Parses `go.mod` contents into a dependency set, recording every replace
/// directive in `replaced`.
pub fn parse(text: &str, replaced: &mut BTreeMap<String, String>) -> Result<DependencySet> {
    let go_mod = parse_go_mod(text)?;

    let mut deps = DependencySet::new();
    for require in &go_mod.require {
        let version = require.version.as_deref().unwrap_or_default();
        let normalized = normalize(version);
        if normalized.is_invalid() {
            return Err(Error::InvalidFormat(format!(
                "poorly formatted version in require section {} {}",
                require.path, version
            )));
        }
        deps.insert(DependencyRecord::from_normalized(&require.path, normalized));
    }

    for replace in &go_mod.replace {
        replaced.insert(replace.old.path.clone(), replace.new.path.clone());
        if replace.is_local() {
            continue;
        }

        let version = replace.new.version.as_deref().unwrap_or_default();
        let normalized = normalize(version);
        if normalized.is_invalid() {
            return Err(Error::InvalidFormat(format!(
                "poorly formatted version in replace section {} {}",
                replace.new.path, version
            )));
        }

        let Some(dep) = deps.get_mut(&replace.old.path) else {
            debug!(
                "dependency {} found in replace section, but doesn't exist in requires section. Skipping",
                replace.old.path
            );
            continue;
        };

        if let Some(old_version) = &replace.old.version
            && required_version(&go_mod, &replace.old.path) != Some(old_version.as_str())
        {
            debug!(
                "replace for {}@{} does not match required version. Skipping",
                replace.old.path, old_version
            );
            continue;
        }

        dep.resolved_commit = normalized.is_commit.then(|| normalized.reference.clone());
        dep.declared_ref = normalized.reference;
        dep.source_url = known_git_url(&replace.new.path);
    }

    Ok(deps)
}

fn required_version<'a>(go_mod: &'a GoMod, path: &str) -> Option<&'a str> {
    go_mod
        .require
        .iter()
        .find(|r| r.path == path)
        .and_then(|r| r.version.as_deref())
}

/// Parses the directive structure of a `go.mod` file.
pub fn parse_go_mod(text: &str) -> Result<GoMod> {
    let mut go_mod = GoMod::default();
    let mut block: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let tokens = tokenize(raw).map_err(|msg| invalid(line_no, raw, &msg))?;
        if tokens.is_empty() {
            continue;
        }

        if let Some(verb) = &block {
            if tokens.len() == 1 && tokens[0] == ")" {
                block = None;
                continue;
            }
            apply_directive(&mut go_mod, verb, &tokens).map_err(|msg| invalid(line_no, raw, &msg))?;
            continue;
        }

        let verb = tokens[0].as_str();
        if !KNOWN_VERBS.contains(&verb) {
            return Err(invalid(line_no, raw, "unknown directive"));
        }

        match &tokens[1..] {
            [open] if open == "(" => block = Some(verb.to_string()),
            [open, close] if open == "(" && close == ")" => {}
            args => apply_directive(&mut go_mod, verb, args)
                .map_err(|msg| invalid(line_no, raw, &msg))?,
        }
    }

    if let Some(verb) = block {
        return Err(Error::InvalidFormat(format!("unterminated {verb} block")));
    }
    Ok(go_mod)
}

fn invalid(line_no: usize, line: &str, msg: &str) -> Error {
    Error::InvalidFormat(format!("go.mod:{line_no}: {msg}: {}", line.trim()))
}

fn apply_directive(
    go_mod: &mut GoMod,
    verb: &str,
    args: &[String],
) -> std::result::Result<(), String> {
    match verb {
        "module" => match args {
            [path] => go_mod.module = Some(path.clone()),
            _ => return Err("usage: module module/path".to_string()),
        },
        "require" => match args {
            [path, version] => go_mod.require.push(ModuleVersion {
                path: path.clone(),
                version: Some(version.clone()),
            }),
            _ => return Err("usage: require module/path v1.2.3".to_string()),
        },
        "replace" => go_mod.replace.push(parse_replace(args)?),
        _ => {}
    }
    Ok(())
}

fn parse_replace(args: &[String]) -> std::result::Result<Replace, String> {
    let arrow = args
        .iter()
        .position(|a| a == "=>")
        .ok_or_else(|| "replace is missing =>".to_string())?;

    let old = match &args[..arrow] {
        [path] => ModuleVersion {
            path: path.clone(),
            version: None,
        },
        [path, version] => ModuleVersion {
            path: path.clone(),
            version: Some(version.clone()),
        },
        _ => return Err("usage: replace module/path [v1.2.3] => other/module v1.4".to_string()),
    };

    let new = match &args[arrow + 1..] {
        [path] => ModuleVersion {
            path: path.clone(),
            version: None,
        },
        [path, version] => ModuleVersion {
            path: path.clone(),
            version: Some(version.clone()),
        },
        _ => return Err("usage: replace module/path [v1.2.3] => other/module v1.4".to_string()),
    };

    let replace = Replace { old, new };
    if replace.new.version.is_none() && !replace.is_local() {
        return Err("replacement module without version must be directory path".to_string());
    }
    Ok(replace)
}

/// Splits a line into tokens, dropping `//` comments and unquoting
/// interpreted (`"..."`) and raw (`` `...` ``) strings.
fn tokenize(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '/' {
            chars.next();
            if chars.peek() == Some(&'/') {
                break;
            }
            let mut token = String::from('/');
            take_bare(&mut chars, &mut token);
            tokens.push(token);
            continue;
        }
        if c == '"' || c == '`' {
            chars.next();
            let mut token = String::new();
            let mut closed = false;
            while let Some(ch) = chars.next() {
                if ch == c {
                    closed = true;
                    break;
                }
                if ch == '\\' && c == '"' {
                    if let Some(escaped) = chars.next() {
                        token.push(escaped);
                    }
                    continue;
                }
                token.push(ch);
            }
            if !closed {
                return Err("unterminated quoted string".to_string());
            }
            tokens.push(token);
            continue;
        }
        if c == '(' || c == ')' {
            chars.next();
            tokens.push(c.to_string());
            continue;
        }
        let mut token = String::new();
        take_bare(&mut chars, &mut token);
        tokens.push(token);
    }

    Ok(tokens)
}

fn take_bare(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, token: &mut String) {
    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '"' || ch == '`' {
            break;
        }
        if ch == '/' {
            let mut lookahead = chars.clone();
            lookahead.next();
            if lookahead.peek() == Some(&'/') {
                break;
            }
        }
        token.push(ch);
        chars.next();
    }
}
