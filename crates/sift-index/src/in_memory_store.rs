use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::store::{
    BoxFuture, ChunkRecord, CollectionKind, FileMetadata, FileRecord, FileSummary, IndexStore,
    StoreError,
};

/// A mutating call observed by [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    UpsertFile { repo: String, path: String },
    DeleteFiles { repo: String, paths: Vec<String> },
    UpsertChunks { repo: String, path: String, count: usize },
    DeleteChunks { repo: String, path: String },
    DeleteRepository { repo: String },
}

impl StoreOp {
    #[must_use]
    pub fn is_chunk_op(&self) -> bool {
        matches!(self, Self::UpsertChunks { .. } | Self::DeleteChunks { .. })
    }

    #[must_use]
    pub fn is_upsert(&self) -> bool {
        matches!(self, Self::UpsertFile { .. } | Self::UpsertChunks { .. })
    }
}

#[derive(Default)]
struct RepoData {
    files: HashMap<String, FileRecord>,
    chunks: HashMap<String, Vec<ChunkRecord>>,
}

/// Process-local store that records every mutation.
///
/// Used for tests and dry runs. It can be switched unavailable, or made to
/// reject chunk upserts only, to exercise failure handling.
pub struct InMemoryStore {
    repos: RwLock<HashMap<String, RepoData>>,
    ops: Mutex<Vec<StoreOp>>,
    unavailable: AtomicBool,
    reject_chunks: AtomicBool,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            repos: RwLock::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            reject_chunks: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make subsequent chunk upserts fail while file writes still succeed.
    pub fn set_reject_chunks(&self, reject: bool) {
        self.reject_chunks.store(reject, Ordering::SeqCst);
    }

    /// Mutations recorded since creation or the last [`Self::clear_ops`].
    #[must_use]
    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    #[must_use]
    pub fn file(&self, repo: &str, path: &str) -> Option<FileRecord> {
        self.repos
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(repo)
            .and_then(|r| r.files.get(path).cloned())
    }

    /// Chunks of `path`, ordered by index.
    #[must_use]
    pub fn chunks(&self, repo: &str, path: &str) -> Vec<ChunkRecord> {
        self.repos
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(repo)
            .and_then(|r| r.chunks.get(path).cloned())
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }

    fn record(&self, op: StoreOp) {
        self.ops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

impl IndexStore for InMemoryStore {
    fn file_metadata(
        &self,
        repo: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, FileMetadata>, StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            self.check()?;
            let repos = self
                .repos
                .read()
                .map_err(|e| StoreError::Read(e.to_string()))?;
            Ok(repos
                .get(&repo)
                .map(|r| {
                    r.files
                        .iter()
                        .map(|(path, rec)| (path.clone(), rec.metadata()))
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn upsert_file(
        &self,
        repo: &str,
        record: FileRecord,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            self.check()?;
            let path = record.path.clone();
            self.repos
                .write()
                .map_err(|e| StoreError::Upsert(e.to_string()))?
                .entry(repo.clone())
                .or_default()
                .files
                .insert(path.clone(), record);
            self.record(StoreOp::UpsertFile { repo, path });
            Ok(())
        })
    }

    fn delete_files(
        &self,
        repo: &str,
        paths: Vec<String>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            self.check()?;
            {
                let mut repos = self
                    .repos
                    .write()
                    .map_err(|e| StoreError::Delete(e.to_string()))?;
                if let Some(data) = repos.get_mut(&repo) {
                    for path in &paths {
                        data.files.remove(path);
                    }
                }
            }
            self.record(StoreOp::DeleteFiles { repo, paths });
            Ok(())
        })
    }

    fn upsert_chunks(
        &self,
        repo: &str,
        path: &str,
        chunks: Vec<ChunkRecord>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let repo = repo.to_owned();
        let path = path.to_owned();
        Box::pin(async move {
            self.check()?;
            if self.reject_chunks.load(Ordering::SeqCst) {
                return Err(StoreError::Upsert(format!("chunks of {path} rejected")));
            }
            let count = chunks.len();
            self.repos
                .write()
                .map_err(|e| StoreError::Upsert(e.to_string()))?
                .entry(repo.clone())
                .or_default()
                .chunks
                .entry(path.clone())
                .or_default()
                .extend(chunks);
            self.record(StoreOp::UpsertChunks { repo, path, count });
            Ok(())
        })
    }

    fn delete_chunks(&self, repo: &str, path: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let repo = repo.to_owned();
        let path = path.to_owned();
        Box::pin(async move {
            self.check()?;
            {
                let mut repos = self
                    .repos
                    .write()
                    .map_err(|e| StoreError::Delete(e.to_string()))?;
                if let Some(data) = repos.get_mut(&repo) {
                    data.chunks.remove(&path);
                }
            }
            self.record(StoreOp::DeleteChunks { repo, path });
            Ok(())
        })
    }

    fn count(&self, kind: CollectionKind) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            self.check()?;
            let repos = self
                .repos
                .read()
                .map_err(|e| StoreError::Read(e.to_string()))?;
            let total: usize = repos
                .values()
                .map(|r| match kind {
                    CollectionKind::Files => r.files.len(),
                    CollectionKind::Chunks => r.chunks.values().map(Vec::len).sum(),
                })
                .sum();
            Ok(total as u64)
        })
    }

    fn delete_repository(&self, repo: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            self.check()?;
            self.repos
                .write()
                .map_err(|e| StoreError::Delete(e.to_string()))?
                .remove(&repo);
            self.record(StoreOp::DeleteRepository { repo });
            Ok(())
        })
    }

    fn repositories(&self) -> BoxFuture<'_, Result<Vec<(String, u64)>, StoreError>> {
        Box::pin(async move {
            self.check()?;
            let repos = self
                .repos
                .read()
                .map_err(|e| StoreError::Read(e.to_string()))?;
            let mut out: Vec<(String, u64)> = repos
                .iter()
                .filter(|(_, data)| !data.files.is_empty())
                .map(|(name, data)| (name.clone(), data.files.len() as u64))
                .collect();
            out.sort();
            Ok(out)
        })
    }

    fn repository_files(
        &self,
        repo: &str,
    ) -> BoxFuture<'_, Result<Vec<FileSummary>, StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            self.check()?;
            let repos = self
                .repos
                .read()
                .map_err(|e| StoreError::Read(e.to_string()))?;
            let Some(data) = repos.get(&repo) else {
                return Ok(Vec::new());
            };
            let mut out: Vec<FileSummary> = data
                .files
                .values()
                .map(|rec| FileSummary {
                    path: rec.path.clone(),
                    language: rec.language,
                    size: rec.size,
                    chunks: data.chunks.get(&rec.path).map_or(0, |c| c.len() as u64),
                })
                .collect();
            out.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::Lang;

    fn file(path: &str) -> FileRecord {
        FileRecord {
            repo_name: "repo".into(),
            path: path.into(),
            size: 10,
            modified_ns: 1,
            content_hash: "h".into(),
            language: Lang::Python,
            preview: String::new(),
        }
    }

    fn chunk(path: &str, index: usize) -> ChunkRecord {
        ChunkRecord {
            id: crate::store::chunk_id("repo", path, index),
            parent_path: path.into(),
            index,
            start_offset: 0,
            end_offset: 1,
            overlap: 0,
            line_start: 1,
            line_end: 1,
            content: "x".into(),
            size: 1,
            oversized: false,
            language: Lang::Python,
        }
    }

    #[tokio::test]
    async fn upsert_and_read_metadata() {
        let store = InMemoryStore::new();
        store.upsert_file("repo", file("a.py")).await.unwrap();
        let meta = store.file_metadata("repo").await.unwrap();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta["a.py"].content_hash, "h");
        assert!(store.file_metadata("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_file_orders_operations() {
        let store = InMemoryStore::new();
        store
            .commit_file("repo", file("a.py"), vec![chunk("a.py", 0), chunk("a.py", 1)])
            .await
            .unwrap();
        assert_eq!(
            store.ops(),
            vec![
                StoreOp::UpsertFile {
                    repo: "repo".into(),
                    path: "a.py".into()
                },
                StoreOp::DeleteChunks {
                    repo: "repo".into(),
                    path: "a.py".into()
                },
                StoreOp::UpsertChunks {
                    repo: "repo".into(),
                    path: "a.py".into(),
                    count: 2
                },
            ]
        );
        assert_eq!(store.count(CollectionKind::Chunks).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn commit_file_replaces_old_chunks() {
        let store = InMemoryStore::new();
        let chunks = vec![chunk("a.py", 0), chunk("a.py", 1), chunk("a.py", 2)];
        store.commit_file("repo", file("a.py"), chunks).await.unwrap();
        store
            .commit_file("repo", file("a.py"), vec![chunk("a.py", 0)])
            .await
            .unwrap();
        assert_eq!(store.chunks("repo", "a.py").len(), 1);
    }

    #[tokio::test]
    async fn failed_chunk_write_rolls_back_file_record() {
        let store = InMemoryStore::new();
        store.set_reject_chunks(true);
        let err = store
            .commit_file("repo", file("a.py"), vec![chunk("a.py", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Upsert(_)));
        assert!(store.file("repo", "a.py").is_none());
        assert!(store.chunks("repo", "a.py").is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_fails_everything() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.file_metadata("repo").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.upsert_file("repo", file("a.py")).await.is_err());
        assert!(store.ops().is_empty());
        store.set_unavailable(false);
        assert!(store.upsert_file("repo", file("a.py")).await.is_ok());
    }

    #[tokio::test]
    async fn delete_repository_and_listing() {
        let store = InMemoryStore::new();
        store.upsert_file("b", file("x.py")).await.unwrap();
        store.upsert_file("a", file("x.py")).await.unwrap();
        store.upsert_file("a", file("y.py")).await.unwrap();
        assert_eq!(
            store.repositories().await.unwrap(),
            vec![("a".to_owned(), 2), ("b".to_owned(), 1)]
        );
        store.delete_repository("a").await.unwrap();
        assert_eq!(store.count(CollectionKind::Files).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_files_keeps_other_paths() {
        let store = InMemoryStore::new();
        store.upsert_file("repo", file("a.py")).await.unwrap();
        store.upsert_file("repo", file("b.py")).await.unwrap();
        store
            .delete_files("repo", vec!["a.py".into()])
            .await
            .unwrap();
        assert!(store.file("repo", "a.py").is_none());
        assert!(store.file("repo", "b.py").is_some());
    }

    #[tokio::test]
    async fn repository_files_counts_chunks() {
        let store = InMemoryStore::new();
        store
            .commit_file("repo", file("b.py"), vec![chunk("b.py", 0), chunk("b.py", 1)])
            .await
            .unwrap();
        store.commit_file("repo", file("a.py"), Vec::new()).await.unwrap();

        let files = store.repository_files("repo").await.unwrap();
        let listed: Vec<_> = files.iter().map(|f| (f.path.as_str(), f.chunks)).collect();
        assert_eq!(listed, vec![("a.py", 0), ("b.py", 2)]);
        assert!(store.repository_files("other").await.unwrap().is_empty());
    }

    #[test]
    fn op_classification() {
        let op = StoreOp::DeleteChunks {
            repo: "r".into(),
            path: "p".into(),
        };
        assert!(op.is_chunk_op());
        assert!(!op.is_upsert());
    }
}
