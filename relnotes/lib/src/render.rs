//! Markdown rendering of generated release notes.

use std::fmt::Write as _;

use crate::changes::ProjectChanges;
use crate::dependency::DependencyRecord;
use crate::release::ReleaseNotes;

/// Renders the release notes document.
pub fn render(notes: &ReleaseNotes) -> String {
    let release = &notes.release;
    let project = &release.project_name;
    let mut out = String::new();

    let _ = writeln!(out, "{project} {}\n", notes.version);
    let _ = write!(out, "Welcome to the {} release of {project}!", notes.tag);
    if release.pre_release {
        // trailing double space is a markdown line break
        let _ = write!(out, "  \n*This is a pre-release of {project}*");
    }
    out.push('\n');

    if !release.preface.is_empty() {
        let _ = writeln!(out, "\n{}", release.preface);
    }

    let _ = write!(
        out,
        "\nPlease try out the release binaries and report any issues at\nhttps://github.com/{}/issues.\n",
        release.github_repo
    );

    for note in release.notes.values() {
        let _ = write!(out, "\n### {}\n\n{}\n", note.title, note.description.trim_end());
    }

    if !release.breaking.is_empty() {
        out.push_str("\n### Breaking Changes\n\n");
        for breaking in release.breaking.values() {
            let _ = writeln!(out, "* `{}` {}", breaking.commit, breaking.description.trim_end());
        }
    }

    if !notes.highlights.is_empty() {
        out.push_str("\n### Highlights\n");
        for category in &notes.highlights {
            if !category.name.is_empty() {
                let _ = write!(out, "\n#### {}\n", category.name);
            }
            out.push('\n');
            for entry in &category.changes {
                let change = &entry.change;
                let line = if change.highlight.is_empty() {
                    &change.formatted
                } else {
                    &change.highlight
                };
                let _ = writeln!(out, "* {line}");
            }
        }
    }

    out.push_str("\n### Contributors\n\n");
    for contributor in &notes.contributors {
        let _ = writeln!(out, "* {}", contributor.name);
    }

    for changes in &notes.changes {
        render_project(&mut out, changes);
    }

    out.push_str("\n### Dependency Changes\n\n");
    if notes.dependencies.is_empty() {
        out.push_str("This release has no dependency changes\n");
    } else {
        render_dependencies(&mut out, &notes.dependencies);
    }

    if !release.previous.is_empty() {
        let _ = writeln!(
            out,
            "\nPrevious release can be found at [{previous}](https://github.com/{}/releases/tag/{previous})",
            release.github_repo,
            previous = release.previous
        );
    }
    out
}

fn render_project(out: &mut String, project: &ProjectChanges) {
    let count = project.changes.len();
    if project.name.is_empty() {
        out.push_str("\n### Changes\n");
    } else {
        let _ = write!(out, "\n### Changes from {}\n", project.name);
    }
    let _ = writeln!(
        out,
        "<details><summary>{count} commit{}</summary>\n<p>\n",
        if count == 1 { "" } else { "s" }
    );
    for change in &project.changes {
        let indent = if change.is_merge { "" } else { "  " };
        let _ = writeln!(out, "{indent}* {}", change.formatted);
    }
    out.push_str("</p>\n</details>\n");
}

/// One line per dependency, with the version column aligned.
fn render_dependencies(out: &mut String, dependencies: &[DependencyRecord]) {
    let cells: Vec<String> = dependencies
        .iter()
        .map(|dep| format!("* **{}**", dep.name))
        .collect();
    let width = cells.iter().map(|c| c.chars().count()).max().unwrap_or(0) + 2;
    let width = width.max(8);

    for (cell, dep) in cells.iter().zip(dependencies) {
        let version = match &dep.previous_ref {
            Some(previous) => format!("{previous} -> {}", dep.declared_ref),
            None => format!("{} **_new_**", dep.declared_ref),
        };
        let _ = writeln!(out, "{cell:<width$}{version}");
    }
}
