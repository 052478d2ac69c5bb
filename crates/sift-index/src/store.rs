use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::chunker::Chunk;
use crate::languages::Lang;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("read error: {0}")]
    Read(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("delete error: {0}")]
    Delete(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

const CHUNK_NAMESPACE: uuid::Uuid = uuid::Uuid::from_bytes([
    0x3c, 0x51, 0x9e, 0x07, 0x4a, 0x2d, 0x5b, 0x18, 0x9f, 0x6e, 0x21, 0xd4, 0x0b, 0x73, 0xa8,
    0xc5,
]);

/// Deterministic chunk id for the `ordinal`-th chunk of `path` in `repo`.
#[must_use]
pub fn chunk_id(repo: &str, path: &str, ordinal: usize) -> String {
    let key = format!("{repo}/{path}/{ordinal}");
    uuid::Uuid::new_v5(&CHUNK_NAMESPACE, key.as_bytes()).to_string()
}

/// What the change detector needs to know about a previously indexed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_ns: i64,
    pub content_hash: String,
}

/// File-level document stored once per indexed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub repo_name: String,
    /// Repository-relative, `/`-separated.
    pub path: String,
    pub size: u64,
    /// Nanoseconds since the Unix epoch.
    pub modified_ns: i64,
    /// SHA-256 hex digest of the raw file bytes.
    pub content_hash: String,
    pub language: Lang,
    pub preview: String,
}

impl FileRecord {
    #[must_use]
    pub fn metadata(&self) -> FileMetadata {
        FileMetadata {
            size: self.size,
            modified_ns: self.modified_ns,
            content_hash: self.content_hash.clone(),
        }
    }
}

/// Chunk document stored per segment of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub parent_path: String,
    pub index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub overlap: usize,
    pub line_start: usize,
    pub line_end: usize,
    pub content: String,
    pub size: usize,
    pub oversized: bool,
    pub language: Lang,
}

impl ChunkRecord {
    #[must_use]
    pub fn from_chunk(repo: &str, path: &str, language: Lang, chunk: Chunk) -> Self {
        Self {
            id: chunk_id(repo, path, chunk.index),
            parent_path: path.to_owned(),
            index: chunk.index,
            start_offset: chunk.start_offset,
            end_offset: chunk.end_offset,
            overlap: chunk.overlap,
            line_start: chunk.line_range.0,
            line_end: chunk.line_range.1,
            content: chunk.content,
            size: chunk.size,
            oversized: chunk.oversized,
            language,
        }
    }
}

/// One indexed file as listed by [`IndexStore::repository_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub language: Lang,
    pub size: u64,
    pub chunks: u64,
}

/// Per-repository overview for `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoInfo {
    pub name: String,
    pub files: usize,
    pub chunks: u64,
    pub total_bytes: u64,
    /// Display name and file count, most common first.
    pub languages: Vec<(String, usize)>,
    pub sample_files: Vec<FileSummary>,
}

impl RepoInfo {
    /// Most common language, ignoring plain text and unknown files when
    /// anything else is present.
    #[must_use]
    pub fn primary_language(&self) -> Option<&str> {
        let generic = [Lang::Text.display_name(), Lang::Unknown.display_name()];
        self.languages
            .iter()
            .find(|(name, _)| !generic.contains(&name.as_str()))
            .or_else(|| self.languages.first())
            .map(|(name, _)| name.as_str())
    }
}

/// Summarize `repo`, or `None` when nothing is indexed under that name.
///
/// # Errors
///
/// Returns an error if the store cannot list the repository's files.
pub async fn repository_info(
    store: &dyn IndexStore,
    repo: &str,
    sample: usize,
) -> Result<Option<RepoInfo>, StoreError> {
    let files = store.repository_files(repo).await?;
    if files.is_empty() {
        return Ok(None);
    }

    let mut by_language: HashMap<&'static str, usize> = HashMap::new();
    for file in &files {
        *by_language.entry(file.language.display_name()).or_default() += 1;
    }
    let mut languages: Vec<(String, usize)> = by_language
        .into_iter()
        .map(|(name, n)| (name.to_owned(), n))
        .collect();
    languages.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Ok(Some(RepoInfo {
        name: repo.to_owned(),
        files: files.len(),
        chunks: files.iter().map(|f| f.chunks).sum(),
        total_bytes: files.iter().map(|f| f.size).sum(),
        languages,
        sample_files: files.into_iter().take(sample).collect(),
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Files,
    Chunks,
}

impl CollectionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Chunks => "chunks",
        }
    }
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistence boundary for file and chunk documents.
///
/// Implementations own the embedding and retrieval side; the indexer only
/// reads previous metadata and writes or deletes records.
pub trait IndexStore: Send + Sync {
    /// Metadata of every file currently indexed for `repo`, keyed by path.
    fn file_metadata(
        &self,
        repo: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, FileMetadata>, StoreError>>;

    fn upsert_file(&self, repo: &str, record: FileRecord)
    -> BoxFuture<'_, Result<(), StoreError>>;

    /// Remove file records only; chunks are removed with [`Self::delete_chunks`].
    fn delete_files(&self, repo: &str, paths: Vec<String>)
    -> BoxFuture<'_, Result<(), StoreError>>;

    fn upsert_chunks(
        &self,
        repo: &str,
        path: &str,
        chunks: Vec<ChunkRecord>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn delete_chunks(&self, repo: &str, path: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    fn count(&self, kind: CollectionKind) -> BoxFuture<'_, Result<u64, StoreError>>;

    /// Remove every file and chunk of `repo`.
    fn delete_repository(&self, repo: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Indexed repositories with their file counts, sorted by name.
    fn repositories(&self) -> BoxFuture<'_, Result<Vec<(String, u64)>, StoreError>>;

    /// Files indexed for `repo` with their chunk counts, sorted by path.
    fn repository_files(&self, repo: &str)
    -> BoxFuture<'_, Result<Vec<FileSummary>, StoreError>>;

    /// Persist a changed file: record first, then replace its chunks.
    ///
    /// If the chunk half fails, the file record is removed again so the next
    /// run sees the file as new. Stores with transactions should override
    /// this and commit the pair atomically.
    fn commit_file(
        &self,
        repo: &str,
        record: FileRecord,
        chunks: Vec<ChunkRecord>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            let path = record.path.clone();
            self.upsert_file(&repo, record).await?;

            let replaced = async {
                self.delete_chunks(&repo, &path).await?;
                self.upsert_chunks(&repo, &path, chunks).await
            }
            .await;

            if let Err(e) = replaced {
                if let Err(undo) = self.delete_chunks(&repo, &path).await {
                    tracing::warn!(path = %path, "failed to drop partial chunks: {undo}");
                }
                if let Err(undo) = self.delete_files(&repo, vec![path.clone()]).await {
                    tracing::warn!(path = %path, "failed to roll back file record: {undo}");
                }
                return Err(e);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_deterministic() {
        assert_eq!(chunk_id("repo", "a.py", 0), chunk_id("repo", "a.py", 0));
        assert!(uuid::Uuid::parse_str(&chunk_id("repo", "a.py", 0)).is_ok());
    }

    #[test]
    fn chunk_id_distinguishes_repo_path_and_ordinal() {
        let base = chunk_id("repo", "a.py", 0);
        assert_ne!(base, chunk_id("repo", "a.py", 1));
        assert_ne!(base, chunk_id("repo", "b.py", 0));
        assert_ne!(base, chunk_id("other", "a.py", 0));
    }

    #[test]
    fn namespace_is_not_nil() {
        assert!(!CHUNK_NAMESPACE.is_nil());
    }

    #[test]
    fn from_chunk_copies_span() {
        let chunk = Chunk {
            index: 2,
            start_offset: 10,
            end_offset: 20,
            overlap: 3,
            line_range: (2, 4),
            content: "0123456789".into(),
            size: 10,
            oversized: false,
        };
        let rec = ChunkRecord::from_chunk("r", "src/x.rs", Lang::Rust, chunk);
        assert_eq!(rec.id, chunk_id("r", "src/x.rs", 2));
        assert_eq!(rec.parent_path, "src/x.rs");
        assert_eq!((rec.line_start, rec.line_end), (2, 4));
        assert_eq!(rec.overlap, 3);
        assert_eq!(rec.language, Lang::Rust);
    }

    fn record(path: &str, language: Lang, size: u64) -> FileRecord {
        FileRecord {
            repo_name: "svc".into(),
            path: path.into(),
            size,
            modified_ns: 1,
            content_hash: "h".into(),
            language,
            preview: String::new(),
        }
    }

    fn one_chunk(path: &str, language: Lang) -> Vec<ChunkRecord> {
        let chunk = Chunk {
            index: 0,
            start_offset: 0,
            end_offset: 1,
            overlap: 0,
            line_range: (1, 1),
            content: "x".into(),
            size: 1,
            oversized: false,
        };
        vec![ChunkRecord::from_chunk("svc", path, language, chunk)]
    }

    #[tokio::test]
    async fn repository_info_summarizes_languages() {
        let store = crate::in_memory_store::InMemoryStore::new();
        for (path, lang, size) in [
            ("README.md", Lang::Markdown, 5),
            ("notes.txt", Lang::Text, 7),
            ("notes2.txt", Lang::Text, 7),
            ("src/app.py", Lang::Python, 100),
            ("src/util.py", Lang::Python, 50),
        ] {
            store
                .commit_file("svc", record(path, lang, size), one_chunk(path, lang))
                .await
                .unwrap();
        }

        let info = repository_info(&store, "svc", 2).await.unwrap().unwrap();
        assert_eq!(info.files, 5);
        assert_eq!(info.chunks, 5);
        assert_eq!(info.total_bytes, 169);
        assert_eq!(info.languages[0].1, 2);
        assert_eq!(info.primary_language(), Some("Python"));
        let sample: Vec<_> = info.sample_files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(sample, vec!["README.md", "notes.txt"]);

        assert!(repository_info(&store, "missing", 5).await.unwrap().is_none());
    }

    #[test]
    fn primary_language_falls_back_to_text() {
        let info = RepoInfo {
            name: "docs".into(),
            files: 1,
            chunks: 1,
            total_bytes: 1,
            languages: vec![("Text".into(), 1)],
            sample_files: Vec::new(),
        };
        assert_eq!(info.primary_language(), Some("Text"));
    }

    #[test]
    fn collection_names() {
        assert_eq!(CollectionKind::Files.as_str(), "files");
        assert_eq!(CollectionKind::Chunks.as_str(), "chunks");
    }
}
