use std::path::PathBuf;

use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SIFT_SQLITE_PATH") {
            self.storage.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("SIFT_SOURCE_FOLDER") {
            self.repos.source_folder = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SIFT_CHUNK_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                self.index.chunk_size = n;
            } else {
                tracing::warn!("ignoring invalid SIFT_CHUNK_SIZE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SIFT_CHUNK_OVERLAP") {
            if let Ok(n) = v.parse::<usize>() {
                self.index.chunk_overlap = n;
            } else {
                tracing::warn!("ignoring invalid SIFT_CHUNK_OVERLAP value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SIFT_BATCH_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                self.index.batch_size = n;
            } else {
                tracing::warn!("ignoring invalid SIFT_BATCH_SIZE value: {v}");
            }
        }
    }
}
