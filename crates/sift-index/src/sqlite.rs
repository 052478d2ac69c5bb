//! `SQLite`-backed [`IndexStore`].

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::Result;
use crate::languages::Lang;
use crate::store::{
    BoxFuture, ChunkRecord, CollectionKind, FileMetadata, FileRecord, FileSummary, IndexStore,
    StoreError,
};

type ChunkRow = (
    String,
    String,
    i64,
    i64,
    i64,
    i64,
    i64,
    i64,
    String,
    i64,
    bool,
    String,
);

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database on a single connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn new(path: &str) -> Result<Self> {
        let (url, max_connections) = if path == ":memory:" {
            ("sqlite::memory:".to_string(), 1)
        } else {
            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            (format!("sqlite:{path}?mode=rwc"), 5)
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let mut pool_opts = SqlitePoolOptions::new().max_connections(max_connections);
        if max_connections == 1 {
            // An in-memory database lives only as long as its connection.
            pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Chunks stored for `path`, ordered by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored value is out of range.
    pub async fn load_chunks(
        &self,
        repo: &str,
        path: &str,
    ) -> std::result::Result<Vec<ChunkRecord>, StoreError> {
        let rows: Vec<ChunkRow> = sqlx::query_as(
            "SELECT id, parent_path, chunk_index, start_offset, end_offset, overlap, \
             line_start, line_end, content, size, oversized, language \
             FROM chunks WHERE repo_name = ? AND parent_path = ? ORDER BY chunk_index",
        )
        .bind(repo)
        .bind(path)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Read(e.to_string()))?;

        rows.into_iter()
            .map(
                |(
                    id,
                    parent_path,
                    index,
                    start,
                    end,
                    overlap,
                    line_start,
                    line_end,
                    content,
                    size,
                    oversized,
                    language,
                )|
                 -> std::result::Result<ChunkRecord, StoreError> {
                    Ok(ChunkRecord {
                        id,
                        parent_path,
                        index: from_i64(index)?,
                        start_offset: from_i64(start)?,
                        end_offset: from_i64(end)?,
                        overlap: from_i64(overlap)?,
                        line_start: from_i64(line_start)?,
                        line_end: from_i64(line_end)?,
                        content,
                        size: from_i64(size)?,
                        oversized,
                        language: Lang::from_id(&language),
                    })
                },
            )
            .collect()
    }

    /// Stored file record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn load_file(
        &self,
        repo: &str,
        path: &str,
    ) -> std::result::Result<Option<FileRecord>, StoreError> {
        let row: Option<(i64, i64, String, String, String)> = sqlx::query_as(
            "SELECT size, modified_ns, content_hash, language, preview \
             FROM indexed_files WHERE repo_name = ? AND path = ?",
        )
        .bind(repo)
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Read(e.to_string()))?;

        row.map(|(size, modified_ns, content_hash, language, preview)| {
            Ok::<_, StoreError>(FileRecord {
                repo_name: repo.to_owned(),
                path: path.to_owned(),
                size: from_i64(size)?,
                modified_ns,
                content_hash,
                language: Lang::from_id(&language),
                preview,
            })
        })
        .transpose()
    }
}

impl SqliteStore {
    /// Delete every file and chunk of every repository. Returns the number
    /// of file records and chunks removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn reset(&self) -> std::result::Result<(u64, u64), StoreError> {
        let mut tx = self.begin().await?;
        let chunks = sqlx::query("DELETE FROM chunks")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?
            .rows_affected();
        let files = sqlx::query("DELETE FROM indexed_files")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?
            .rows_affected();
        commit(tx).await?;
        tracing::info!(files, chunks, "index reset");
        Ok((files, chunks))
    }

    /// Problems reported by `PRAGMA integrity_check`; empty when the database
    /// is healthy.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be queried.
    pub async fn integrity_check(&self) -> std::result::Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("PRAGMA integrity_check")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(line,)| line)
            .filter(|line| line != "ok")
            .collect())
    }
}

fn to_i64<T>(value: T) -> std::result::Result<i64, StoreError>
where
    T: TryInto<i64>,
    T::Error: std::fmt::Display,
{
    value
        .try_into()
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_i64<T>(value: i64) -> std::result::Result<T, StoreError>
where
    T: TryFrom<i64>,
    T::Error: std::fmt::Display,
{
    T::try_from(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

async fn write_file(
    tx: &mut Transaction<'_, Sqlite>,
    repo: &str,
    record: &FileRecord,
) -> std::result::Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO indexed_files \
         (repo_name, path, size, modified_ns, content_hash, language, preview) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(repo_name, path) DO UPDATE SET \
         size = excluded.size, modified_ns = excluded.modified_ns, \
         content_hash = excluded.content_hash, language = excluded.language, \
         preview = excluded.preview, indexed_at = datetime('now')",
    )
    .bind(repo)
    .bind(&record.path)
    .bind(to_i64(record.size)?)
    .bind(record.modified_ns)
    .bind(&record.content_hash)
    .bind(record.language.id())
    .bind(&record.preview)
    .execute(&mut **tx)
    .await
    .map_err(|e| StoreError::Upsert(e.to_string()))?;
    Ok(())
}

async fn clear_chunks(
    tx: &mut Transaction<'_, Sqlite>,
    repo: &str,
    path: &str,
) -> std::result::Result<(), StoreError> {
    sqlx::query("DELETE FROM chunks WHERE repo_name = ? AND parent_path = ?")
        .bind(repo)
        .bind(path)
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::Delete(e.to_string()))?;
    Ok(())
}

async fn write_chunks(
    tx: &mut Transaction<'_, Sqlite>,
    repo: &str,
    chunks: &[ChunkRecord],
) -> std::result::Result<(), StoreError> {
    for chunk in chunks {
        sqlx::query(
            "INSERT OR REPLACE INTO chunks \
             (id, repo_name, parent_path, chunk_index, start_offset, end_offset, overlap, \
              line_start, line_end, content, size, oversized, language) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(repo)
        .bind(&chunk.parent_path)
        .bind(to_i64(chunk.index)?)
        .bind(to_i64(chunk.start_offset)?)
        .bind(to_i64(chunk.end_offset)?)
        .bind(to_i64(chunk.overlap)?)
        .bind(to_i64(chunk.line_start)?)
        .bind(to_i64(chunk.line_end)?)
        .bind(&chunk.content)
        .bind(to_i64(chunk.size)?)
        .bind(chunk.oversized)
        .bind(chunk.language.id())
        .execute(&mut **tx)
        .await
        .map_err(|e| StoreError::Upsert(e.to_string()))?;
    }
    Ok(())
}

impl SqliteStore {
    async fn begin(&self) -> std::result::Result<Transaction<'static, Sqlite>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

async fn commit(tx: Transaction<'_, Sqlite>) -> std::result::Result<(), StoreError> {
    tx.commit()
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))
}

impl IndexStore for SqliteStore {
    fn file_metadata(
        &self,
        repo: &str,
    ) -> BoxFuture<'_, std::result::Result<HashMap<String, FileMetadata>, StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            let rows: Vec<(String, i64, i64, String)> = sqlx::query_as(
                "SELECT path, size, modified_ns, content_hash FROM indexed_files WHERE repo_name = ?",
            )
            .bind(&repo)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;

            rows.into_iter()
                .map(|(path, size, modified_ns, content_hash)| {
                    Ok::<_, StoreError>((
                        path,
                        FileMetadata {
                            size: from_i64(size)?,
                            modified_ns,
                            content_hash,
                        },
                    ))
                })
                .collect()
        })
    }

    fn upsert_file(
        &self,
        repo: &str,
        record: FileRecord,
    ) -> BoxFuture<'_, std::result::Result<(), StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            let mut tx = self.begin().await?;
            write_file(&mut tx, &repo, &record).await?;
            commit(tx).await
        })
    }

    fn delete_files(
        &self,
        repo: &str,
        paths: Vec<String>,
    ) -> BoxFuture<'_, std::result::Result<(), StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            let mut tx = self.begin().await?;
            for path in &paths {
                sqlx::query("DELETE FROM indexed_files WHERE repo_name = ? AND path = ?")
                    .bind(&repo)
                    .bind(path)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Delete(e.to_string()))?;
            }
            commit(tx).await
        })
    }

    fn upsert_chunks(
        &self,
        repo: &str,
        _path: &str,
        chunks: Vec<ChunkRecord>,
    ) -> BoxFuture<'_, std::result::Result<(), StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            let mut tx = self.begin().await?;
            write_chunks(&mut tx, &repo, &chunks).await?;
            commit(tx).await
        })
    }

    fn delete_chunks(
        &self,
        repo: &str,
        path: &str,
    ) -> BoxFuture<'_, std::result::Result<(), StoreError>> {
        let repo = repo.to_owned();
        let path = path.to_owned();
        Box::pin(async move {
            let mut tx = self.begin().await?;
            clear_chunks(&mut tx, &repo, &path).await?;
            commit(tx).await
        })
    }

    fn count(&self, kind: CollectionKind) -> BoxFuture<'_, std::result::Result<u64, StoreError>> {
        Box::pin(async move {
            let sql = match kind {
                CollectionKind::Files => "SELECT COUNT(*) FROM indexed_files",
                CollectionKind::Chunks => "SELECT COUNT(*) FROM chunks",
            };
            let (n,): (i64,) = sqlx::query_as(sql)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Read(e.to_string()))?;
            from_i64(n)
        })
    }

    fn delete_repository(&self, repo: &str) -> BoxFuture<'_, std::result::Result<(), StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            let mut tx = self.begin().await?;
            for sql in [
                "DELETE FROM chunks WHERE repo_name = ?",
                "DELETE FROM indexed_files WHERE repo_name = ?",
            ] {
                sqlx::query(sql)
                    .bind(&repo)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Delete(e.to_string()))?;
            }
            commit(tx).await
        })
    }

    fn repositories(&self) -> BoxFuture<'_, std::result::Result<Vec<(String, u64)>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT repo_name, COUNT(*) FROM indexed_files GROUP BY repo_name ORDER BY repo_name",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;
            rows.into_iter()
                .map(|(name, n)| Ok::<_, StoreError>((name, from_i64(n)?)))
                .collect()
        })
    }

    fn repository_files(
        &self,
        repo: &str,
    ) -> BoxFuture<'_, std::result::Result<Vec<FileSummary>, StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
                "SELECT f.path, f.language, f.size, COUNT(c.id) \
                 FROM indexed_files f \
                 LEFT JOIN chunks c ON c.repo_name = f.repo_name AND c.parent_path = f.path \
                 WHERE f.repo_name = ? \
                 GROUP BY f.path, f.language, f.size \
                 ORDER BY f.path",
            )
            .bind(&repo)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;

            rows.into_iter()
                .map(|(path, language, size, chunks)| {
                    Ok::<_, StoreError>(FileSummary {
                        path,
                        language: Lang::from_id(&language),
                        size: from_i64(size)?,
                        chunks: from_i64(chunks)?,
                    })
                })
                .collect()
        })
    }

    fn commit_file(
        &self,
        repo: &str,
        record: FileRecord,
        chunks: Vec<ChunkRecord>,
    ) -> BoxFuture<'_, std::result::Result<(), StoreError>> {
        let repo = repo.to_owned();
        Box::pin(async move {
            let mut tx = self.begin().await?;
            write_file(&mut tx, &repo, &record).await?;
            clear_chunks(&mut tx, &repo, &record.path).await?;
            write_chunks(&mut tx, &repo, &chunks).await?;
            commit(tx).await
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::store::chunk_id;

    fn file(path: &str, hash: &str) -> FileRecord {
        FileRecord {
            repo_name: "repo".into(),
            path: path.into(),
            size: 42,
            modified_ns: 1_700_000_000_000_000_000,
            content_hash: hash.into(),
            language: Lang::Rust,
            preview: "fn main() {}".into(),
        }
    }

    fn chunk(path: &str, index: usize, content: &str) -> ChunkRecord {
        ChunkRecord {
            id: chunk_id("repo", path, index),
            parent_path: path.into(),
            index,
            start_offset: index * 10,
            end_offset: index * 10 + content.len(),
            overlap: 0,
            line_start: index + 1,
            line_end: index + 1,
            content: content.into(),
            size: content.chars().count(),
            oversized: false,
            language: Lang::Rust,
        }
    }

    #[tokio::test]
    async fn memory_database_migrates() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        assert_eq!(store.count(CollectionKind::Files).await.unwrap(), 0);
        assert_eq!(store.count(CollectionKind::Chunks).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/index.db");
        SqliteStore::new(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn commit_file_round_trips() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        let chunks = vec![chunk("src/main.rs", 0, "fn a() {}"), chunk("src/main.rs", 1, "fn b() {}")];
        store
            .commit_file("repo", file("src/main.rs", "h1"), chunks.clone())
            .await
            .unwrap();

        let meta = store.file_metadata("repo").await.unwrap();
        assert_eq!(
            meta["src/main.rs"],
            FileMetadata {
                size: 42,
                modified_ns: 1_700_000_000_000_000_000,
                content_hash: "h1".into(),
            }
        );
        assert_eq!(store.load_chunks("repo", "src/main.rs").await.unwrap(), chunks);
        assert_eq!(
            store.load_file("repo", "src/main.rs").await.unwrap(),
            Some(file("src/main.rs", "h1"))
        );
    }

    #[tokio::test]
    async fn recommit_replaces_chunks() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        let three = (0..3).map(|i| chunk("a.rs", i, "x")).collect();
        store.commit_file("repo", file("a.rs", "h1"), three).await.unwrap();
        store
            .commit_file("repo", file("a.rs", "h2"), vec![chunk("a.rs", 0, "y")])
            .await
            .unwrap();
        assert_eq!(store.count(CollectionKind::Files).await.unwrap(), 1);
        assert_eq!(store.count(CollectionKind::Chunks).await.unwrap(), 1);
        assert_eq!(store.file_metadata("repo").await.unwrap()["a.rs"].content_hash, "h2");
    }

    #[tokio::test]
    async fn delete_files_and_chunks() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store
            .commit_file("repo", file("a.rs", "h"), vec![chunk("a.rs", 0, "x")])
            .await
            .unwrap();
        store
            .commit_file("repo", file("b.rs", "h"), vec![chunk("b.rs", 0, "x")])
            .await
            .unwrap();
        store.delete_chunks("repo", "a.rs").await.unwrap();
        store.delete_files("repo", vec!["a.rs".into()]).await.unwrap();
        let meta = store.file_metadata("repo").await.unwrap();
        assert!(!meta.contains_key("a.rs"));
        assert!(meta.contains_key("b.rs"));
        assert_eq!(store.count(CollectionKind::Chunks).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn repositories_are_isolated() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store.upsert_file("alpha", file("a.rs", "h")).await.unwrap();
        store.upsert_file("alpha", file("b.rs", "h")).await.unwrap();
        store.upsert_file("beta", file("a.rs", "h")).await.unwrap();
        store
            .upsert_chunks("beta", "a.rs", vec![chunk("a.rs", 0, "x")])
            .await
            .unwrap();

        assert_eq!(
            store.repositories().await.unwrap(),
            vec![("alpha".to_owned(), 2), ("beta".to_owned(), 1)]
        );
        store.delete_repository("beta").await.unwrap();
        assert_eq!(
            store.repositories().await.unwrap(),
            vec![("alpha".to_owned(), 2)]
        );
        assert_eq!(store.count(CollectionKind::Chunks).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn repository_files_lists_chunk_counts() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store
            .commit_file(
                "repo",
                file("src/b.rs", "h1"),
                vec![chunk("src/b.rs", 0, "fn a() {}"), chunk("src/b.rs", 1, "fn b() {}")],
            )
            .await
            .unwrap();
        store
            .commit_file("repo", file("src/a.rs", "h2"), Vec::new())
            .await
            .unwrap();
        store
            .commit_file("other", file("x.rs", "h3"), vec![chunk("x.rs", 0, "x")])
            .await
            .unwrap();

        let files = store.repository_files("repo").await.unwrap();
        let listed: Vec<_> = files.iter().map(|f| (f.path.as_str(), f.chunks)).collect();
        assert_eq!(listed, vec![("src/a.rs", 0), ("src/b.rs", 2)]);
        assert_eq!(files[0].language, Lang::Rust);
        assert_eq!(files[0].size, 42);
        assert!(store.repository_files("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_empties_every_repository() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store
            .commit_file("a", file("x.rs", "h"), vec![chunk("x.rs", 0, "x")])
            .await
            .unwrap();
        store
            .commit_file("b", file("y.rs", "h"), vec![chunk("y.rs", 0, "y"), chunk("y.rs", 1, "z")])
            .await
            .unwrap();

        assert_eq!(store.reset().await.unwrap(), (2, 3));
        assert_eq!(store.count(CollectionKind::Files).await.unwrap(), 0);
        assert_eq!(store.count(CollectionKind::Chunks).await.unwrap(), 0);
        assert!(store.repositories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_database_passes_integrity_check() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");
        let store = SqliteStore::new(path.to_str().unwrap()).await.unwrap();
        assert!(store.integrity_check().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_pool_reports_unavailable() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store.pool().close().await;
        let err = store.upsert_file("repo", file("a.rs", "h")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
