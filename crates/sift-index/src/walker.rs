//! Repository walk: extension allow-list, ignore patterns, file metadata.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::HashCacheKey;
use crate::error::{IndexError, Result};
use crate::languages::{Lang, detect_language};

/// Walker configuration.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Accepted extensions, with or without the leading dot. Empty accepts all.
    pub extensions: Vec<String>,
    /// Ignore patterns: `dir/`, globs, or plain substrings of the relative path.
    pub ignore_patterns: Vec<String>,
    /// Honour `.gitignore` / `.ignore` files found in the tree.
    pub respect_gitignore: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            ignore_patterns: Vec::new(),
            respect_gitignore: true,
        }
    }
}

/// A candidate file found under the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub abs_path: PathBuf,
    /// Path relative to the repository root, `/`-separated.
    pub rel_path: String,
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub modified_ns: i64,
    pub language: Lang,
}

impl SourceFile {
    /// Stat `abs_path` and build a record relative to `root`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::FileUnreadable`] if the file cannot be stat'ed.
    pub fn from_path(root: &Path, abs_path: &Path) -> Result<Self> {
        let rel_path = relative_path(root, abs_path);
        let meta = std::fs::metadata(abs_path).map_err(|source| IndexError::FileUnreadable {
            path: rel_path.clone(),
            source,
        })?;
        let modified_ns = meta.modified().map_or(0, system_time_ns);
        Ok(Self {
            abs_path: abs_path.to_path_buf(),
            language: detect_language(abs_path),
            rel_path,
            size: meta.len(),
            modified_ns,
        })
    }

    /// Read the whole file.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::FileUnreadable`] on any IO failure.
    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.abs_path)
            .await
            .map_err(|source| IndexError::FileUnreadable {
                path: self.rel_path.clone(),
                source,
            })
    }

    #[must_use]
    pub fn cache_key(&self) -> HashCacheKey {
        HashCacheKey::new(self.rel_path.clone(), self.modified_ns, self.size)
    }
}

fn system_time_ns(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => i64::try_from(e.duration().as_nanos()).map_or(i64::MIN, |ns| -ns),
    }
}

fn relative_path(root: &Path, abs_path: &Path) -> String {
    let rel = abs_path.strip_prefix(root).unwrap_or(abs_path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug)]
enum IgnoreRule {
    /// `name/`: any path component equal to `name`.
    Dir(String),
    /// Wildcard pattern, matched against the file name and the relative path.
    Glob(glob::Pattern),
    /// Anything else: substring of the relative path.
    Substring(String),
}

/// Compiled ignore patterns.
#[derive(Debug, Default)]
pub struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    /// # Errors
    ///
    /// Returns [`IndexError::Pattern`] if a wildcard pattern does not compile.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut rules = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let pattern = raw.trim();
            if pattern.is_empty() {
                continue;
            }
            if let Some(dir) = pattern.strip_suffix('/') {
                rules.push(IgnoreRule::Dir(dir.trim_start_matches('/').to_owned()));
            } else if pattern.contains(['*', '?', '[']) {
                let compiled =
                    glob::Pattern::new(pattern).map_err(|source| IndexError::Pattern {
                        pattern: pattern.to_owned(),
                        source,
                    })?;
                rules.push(IgnoreRule::Glob(compiled));
            } else {
                rules.push(IgnoreRule::Substring(pattern.to_owned()));
            }
        }
        Ok(Self { rules })
    }

    /// Whether a directory with this name should not be descended into.
    #[must_use]
    pub fn ignores_dir(&self, name: &str) -> bool {
        self.rules
            .iter()
            .any(|r| matches!(r, IgnoreRule::Dir(d) if d == name))
    }

    /// Whether the file at `rel_path` is excluded.
    #[must_use]
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        self.rules.iter().any(|rule| match rule {
            IgnoreRule::Dir(dir) => rel_path.split('/').any(|c| c == dir),
            IgnoreRule::Glob(p) => p.matches(file_name) || p.matches(rel_path),
            IgnoreRule::Substring(s) => rel_path.contains(s.as_str()),
        })
    }
}

/// An entry the walk could not descend into or stat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkFailure {
    /// Relative path of the failed entry. Empty when the walker could not
    /// tell which entry failed, which covers the whole tree.
    pub rel_path: String,
    pub message: String,
}

impl WalkFailure {
    /// Whether `rel_path` is the failed entry or lies below it.
    #[must_use]
    pub fn covers(&self, rel_path: &str) -> bool {
        self.rel_path.is_empty()
            || rel_path == self.rel_path
            || rel_path
                .strip_prefix(self.rel_path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Result of walking one repository.
#[derive(Debug, Default)]
pub struct WalkOutput {
    /// Indexable files, sorted by relative path.
    pub files: Vec<SourceFile>,
    /// Entries below the root that could not be read, sorted by path.
    pub failures: Vec<WalkFailure>,
}

impl WalkOutput {
    /// Whether `rel_path` may exist but was hidden from the walk by a failure.
    #[must_use]
    pub fn is_obscured(&self, rel_path: &str) -> bool {
        self.failures.iter().any(|f| f.covers(rel_path))
    }
}

fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::Loop { child, .. } => Some(child.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Partial(errs) => errs.iter().find_map(error_path),
        _ => None,
    }
}

/// Walks a repository and yields indexable files in path order.
#[derive(Debug, Clone)]
pub struct FileWalker {
    extensions: Arc<Vec<String>>,
    rules: Arc<IgnoreRules>,
    respect_gitignore: bool,
}

impl FileWalker {
    /// # Errors
    ///
    /// Returns an error if an ignore pattern is invalid.
    pub fn new(config: &WalkerConfig) -> Result<Self> {
        let extensions = config
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Ok(Self {
            extensions: Arc::new(extensions),
            rules: Arc::new(IgnoreRules::new(&config.ignore_patterns)?),
            respect_gitignore: config.respect_gitignore,
        })
    }

    #[must_use]
    pub fn accepts_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }

    /// Enumerate candidate files under `root`, sorted by relative path.
    ///
    /// Entries below the root that cannot be read or stat'ed are returned in
    /// [`WalkOutput::failures`] instead of failing the walk.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a readable directory.
    pub fn walk(&self, root: &Path) -> Result<WalkOutput> {
        if !root.is_dir() {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            )));
        }

        let rules = Arc::clone(&self.rules);
        let walker = ignore::WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .ignore(self.respect_gitignore)
            .require_git(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && rules.ignores_dir(&entry.file_name().to_string_lossy()))
            })
            .build();

        let mut output = WalkOutput::default();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == Some(0) => return Err(e.into()),
                Err(e) => {
                    let rel_path = error_path(&e)
                        .map(|p| relative_path(root, p))
                        .unwrap_or_default();
                    tracing::warn!(path = %rel_path, "walk error: {e}");
                    output.failures.push(WalkFailure {
                        rel_path,
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.path();
            if !self.accepts_extension(path) {
                continue;
            }
            let rel_path = relative_path(root, path);
            if self.rules.is_ignored(&rel_path) {
                continue;
            }
            match SourceFile::from_path(root, path) {
                Ok(file) => output.files.push(file),
                Err(e) => {
                    tracing::warn!(path = %rel_path, "skipping file: {e}");
                    output.failures.push(WalkFailure {
                        rel_path,
                        message: e.to_string(),
                    });
                }
            }
        }

        output.files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        output.failures.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(output)
    }
}
