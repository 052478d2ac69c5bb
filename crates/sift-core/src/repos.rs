//! Repository discovery for multi-repository runs.

use std::path::{Path, PathBuf};

use anyhow::Context;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDir {
    pub name: String,
    pub path: PathBuf,
}

/// Git repositories directly under `dir`, sorted by name.
///
/// Hidden directories are skipped. At most `max_repos` entries are returned
/// when a limit is given.
///
/// # Errors
///
/// Returns an error if `dir` cannot be listed.
pub fn discover_repositories(dir: &Path, max_repos: Option<usize>) -> anyhow::Result<Vec<RepoDir>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list repositories in {}", dir.display()))?;

    let mut repos = Vec::new();
    for entry in entries {
        let entry = entry.context("failed to read directory entry")?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !path.is_dir() {
            continue;
        }
        if !path.join(".git").exists() {
            tracing::debug!(repo = %name, "skipping directory without .git");
            continue;
        }
        repos.push(RepoDir { name, path });
    }

    repos.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(max) = max_repos {
        repos.truncate(max);
    }
    Ok(repos)
}

/// Default repository name for `path`: its final component after
/// canonicalization.
///
/// # Errors
///
/// Returns an error if `path` does not exist.
pub fn repo_name_for(path: &Path) -> anyhow::Result<String> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("repository path not found: {}", path.display()))?;
    Ok(canonical
        .file_name()
        .map_or_else(|| "root".to_owned(), |n| n.to_string_lossy().into_owned()))
}
