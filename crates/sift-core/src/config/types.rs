use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub repos: ReposConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_split_threshold")]
    pub split_threshold: f64,
    #[serde(default = "default_oversize_factor")]
    pub oversize_factor: f64,
    #[serde(default = "default_file_preview_chars")]
    pub file_preview_chars: usize,
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: Vec<String>,
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_respect_gitignore")]
    pub respect_gitignore: bool,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_batch_size() -> usize {
    16
}

fn default_split_threshold() -> f64 {
    0.6
}

fn default_oversize_factor() -> f64 {
    1.5
}

fn default_file_preview_chars() -> usize {
    5000
}

pub(crate) fn default_supported_extensions() -> Vec<String> {
    [
        ".py", ".js", ".jsx", ".ts", ".tsx", ".java", ".cpp", ".cc", ".hpp", ".c", ".h", ".cs",
        ".php", ".rb", ".go", ".rs", ".swift", ".kt", ".scala", ".md", ".txt", ".json", ".yml",
        ".yaml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub(crate) fn default_ignore_patterns() -> Vec<String> {
    [
        ".git/",
        "node_modules/",
        "__pycache__/",
        ".venv/",
        "venv/",
        "target/",
        "build/",
        "dist/",
        "*.min.js",
        "*.lock",
        "package-lock.json",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_respect_gitignore() -> bool {
    true
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
            split_threshold: default_split_threshold(),
            oversize_factor: default_oversize_factor(),
            file_preview_chars: default_file_preview_chars(),
            supported_extensions: default_supported_extensions(),
            ignore_patterns: default_ignore_patterns(),
            respect_gitignore: default_respect_gitignore(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_sqlite_path() -> String {
    ".sift/index.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ReposConfig {
    /// Folder whose repository sub-directories `index-all` walks by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_folder: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_repos: Option<usize>,
}
