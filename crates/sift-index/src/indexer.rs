//! Repository indexing orchestrator: walk → classify → chunk → store.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::cache::HashCache;
use crate::chunker::{ChunkerConfig, chunk_content};
use crate::detector::{Change, ChangeDetector, ChangeReason, Inspection, content_digest};
use crate::error::{IndexError, Result};
use crate::store::{ChunkRecord, FileMetadata, FileRecord, IndexStore, StoreError};
use crate::walker::{FileWalker, SourceFile, WalkFailure, WalkerConfig};

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chunker: ChunkerConfig,
    pub walker: WalkerConfig,
    /// Files processed concurrently (default: 16).
    pub batch_size: usize,
    /// Characters kept in the file-level preview (default: 5000).
    pub file_preview_chars: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            walker: WalkerConfig::default(),
            batch_size: 16,
            file_preview_chars: 5000,
        }
    }
}

/// What happened to one file during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileOutcome {
    Added { chunks: usize },
    Modified { chunks: usize },
    Unchanged,
    Removed,
    Failed,
}

impl FileOutcome {
    /// Single-character progress tag.
    #[must_use]
    pub fn tag(self) -> char {
        match self {
            Self::Added { .. } => '+',
            Self::Modified { .. } => '*',
            Self::Unchanged => '=',
            Self::Removed => '-',
            Self::Failed => '!',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEvent {
    pub path: String,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub path: String,
    pub message: String,
}

/// Summary of an indexing run.
#[derive(Debug, Default, Serialize)]
pub struct IndexReport {
    pub repo_name: String,
    pub files_scanned: usize,
    pub files_added: usize,
    pub files_modified: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    pub chunks_processed: usize,
    pub oversized_chunks: usize,
    pub errors: Vec<FileError>,
    /// Walk failures, then current files in walk order, then removed paths.
    pub events: Vec<FileEvent>,
    /// The run stopped early on the shutdown signal.
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl IndexReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    /// One tag per event, in event order.
    #[must_use]
    pub fn progress_line(&self) -> String {
        self.events.iter().map(|e| e.outcome.tag()).collect()
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}: {} files (+{} *{} ={} -{}) -> {} chunks processed, {} errors",
            self.repo_name,
            self.files_scanned,
            self.files_added,
            self.files_modified,
            self.files_unchanged,
            self.files_removed,
            self.chunks_processed,
            self.errors.len(),
        )
    }

    fn record(&mut self, event: FileEvent) {
        match event.outcome {
            FileOutcome::Added { chunks } => {
                self.files_added += 1;
                self.chunks_processed += chunks;
            }
            FileOutcome::Modified { chunks } => {
                self.files_modified += 1;
                self.chunks_processed += chunks;
            }
            FileOutcome::Unchanged => self.files_unchanged += 1,
            FileOutcome::Removed => self.files_removed += 1,
            FileOutcome::Failed => {}
        }
        self.events.push(event);
    }
}

struct Processed {
    outcome: FileOutcome,
    oversized: usize,
}

/// Orchestrates incremental indexing of repository trees into an [`IndexStore`].
pub struct RepoIndexer {
    store: Arc<dyn IndexStore>,
    detector: ChangeDetector,
    walker: FileWalker,
    config: IndexerConfig,
    progress: Option<mpsc::UnboundedSender<FileEvent>>,
    shutdown: Option<watch::Receiver<bool>>,
    force: bool,
}

impl RepoIndexer {
    /// # Errors
    ///
    /// Returns an error if an ignore pattern cannot be compiled.
    pub fn new(
        store: Arc<dyn IndexStore>,
        cache: Arc<HashCache>,
        config: IndexerConfig,
    ) -> Result<Self> {
        let walker = FileWalker::new(&config.walker)?;
        Ok(Self {
            store,
            detector: ChangeDetector::new(cache),
            walker,
            config,
            progress: None,
            shutdown: None,
            force: false,
        })
    }

    /// Stream each [`FileEvent`] as it is recorded.
    #[must_use]
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<FileEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Stop between files once `rx` turns `true`.
    #[must_use]
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    /// Treat every walked file as changed: re-read, re-chunk and rewrite it
    /// even when its stored metadata matches.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Bring the store in line with the repository at `root`.
    ///
    /// Unchanged files cause no store writes. Per-file read failures are
    /// reported in [`IndexReport::errors`] and the run continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be walked or the store fails.
    pub async fn index_repository(&self, root: &Path, repo_name: &str) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let mut report = IndexReport {
            repo_name: repo_name.to_owned(),
            ..IndexReport::default()
        };

        let walker = self.walker.clone();
        let walk_root = root.to_path_buf();
        let walked = tokio::task::spawn_blocking(move || walker.walk(&walk_root))
            .await
            .map_err(|e| IndexError::Other(format!("walk task failed: {e}")))??;
        let files = &walked.files;
        report.files_scanned = files.len();
        tracing::info!(
            repo = repo_name,
            files = files.len(),
            walk_failures = walked.failures.len(),
            force = self.force,
            "indexing started"
        );
        for failure in &walked.failures {
            self.emit_failure(&mut report, failure);
        }

        let previous = self
            .store
            .file_metadata(repo_name)
            .await
            .inspect_err(|e| tracing::error!(repo = repo_name, "failed to load file metadata: {e}"))?;

        if self.is_cancelled() {
            report.cancelled = true;
            return Ok(finish(report, start));
        }

        let current: HashSet<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        let (mut removed, obscured): (Vec<String>, Vec<String>) = previous
            .keys()
            .filter(|p| !current.contains(p.as_str()))
            .cloned()
            .partition(|p| !walked.is_obscured(p));
        removed.sort();
        if !obscured.is_empty() {
            tracing::warn!(
                repo = repo_name,
                kept = obscured.len(),
                "keeping indexed files hidden by walk failures"
            );
        }
        self.remove_files(repo_name, &removed).await?;

        let aborted = AtomicBool::new(false);
        let batch_size = self.config.batch_size.max(1);
        let mut results = futures::stream::iter(files)
            .map(|file| {
                let aborted = &aborted;
                let previous = previous.get(&file.rel_path);
                async move {
                    if aborted.load(Ordering::SeqCst) || self.is_cancelled() {
                        return (file, None);
                    }
                    (file, self.process_file(repo_name, file, previous).await.transpose())
                }
            })
            .buffered(batch_size);

        let mut fatal: Option<StoreError> = None;
        while let Some((file, result)) = results.next().await {
            match result {
                None => report.cancelled |= fatal.is_none(),
                Some(Ok(processed)) => {
                    report.oversized_chunks += processed.oversized;
                    self.emit(&mut report, &file.rel_path, processed.outcome);
                }
                Some(Err(IndexError::Store(e))) => {
                    aborted.store(true, Ordering::SeqCst);
                    tracing::error!(path = %file.rel_path, "store failed: {e}");
                    fatal.get_or_insert(e);
                }
                Some(Err(e)) => {
                    tracing::warn!(path = %file.rel_path, "skipping file: {e}");
                    report.errors.push(FileError {
                        path: file.rel_path.clone(),
                        message: e.to_string(),
                    });
                    self.emit(&mut report, &file.rel_path, FileOutcome::Failed);
                }
            }
        }
        drop(results);

        if let Some(e) = fatal {
            return Err(e.into());
        }

        for path in removed {
            self.emit(&mut report, &path, FileOutcome::Removed);
        }
        Ok(finish(report, start))
    }

    async fn remove_files(&self, repo_name: &str, removed: &[String]) -> Result<()> {
        if removed.is_empty() {
            return Ok(());
        }
        for path in removed {
            self.store
                .delete_chunks(repo_name, path)
                .await
                .inspect_err(|e| tracing::error!(path = %path, "failed to delete chunks: {e}"))?;
            self.detector.cache().forget(path);
        }
        self.store
            .delete_files(repo_name, removed.to_vec())
            .await
            .inspect_err(|e| tracing::error!(repo = repo_name, "failed to delete files: {e}"))?;
        Ok(())
    }

    /// `Ok(None)` means the run was cancelled before the file was committed.
    async fn process_file(
        &self,
        repo_name: &str,
        file: &SourceFile,
        previous: Option<&FileMetadata>,
    ) -> Result<Option<Processed>> {
        let (reason, inspected) = if self.force {
            let reason = if previous.is_some() {
                ChangeReason::Forced
            } else {
                ChangeReason::New
            };
            (reason, None)
        } else {
            let Inspection { change, bytes } = self.detector.inspect(file, previous).await?;
            match change {
                Change::Unchanged { .. } => {
                    tracing::debug!(path = %file.rel_path, "unchanged");
                    return Ok(Some(Processed {
                        outcome: FileOutcome::Unchanged,
                        oversized: 0,
                    }));
                }
                Change::Changed { reason, digest } => (reason, digest.zip(bytes)),
            }
        };

        let (digest, bytes) = match inspected {
            Some(hashed) => hashed,
            None => {
                let bytes = file.read_bytes().await?;
                let digest = content_digest(&bytes);
                self.detector
                    .cache()
                    .insert(file.cache_key(), digest.clone());
                (digest, bytes)
            }
        };
        let text = String::from_utf8_lossy(&bytes);

        let chunks = chunk_content(&text, file.language, &self.config.chunker);
        let mut oversized = 0;
        for chunk in chunks.iter().filter(|c| c.oversized) {
            oversized += 1;
            tracing::warn!(
                path = %file.rel_path,
                chunk = chunk.index,
                size = chunk.size,
                limit = self.config.chunker.chunk_size,
                "oversized chunk kept whole"
            );
        }

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .map(|c| ChunkRecord::from_chunk(repo_name, &file.rel_path, file.language, c))
            .collect();
        let count = records.len();

        let record = FileRecord {
            repo_name: repo_name.to_owned(),
            path: file.rel_path.clone(),
            size: file.size,
            modified_ns: file.modified_ns,
            content_hash: digest,
            language: file.language,
            preview: preview(&text, self.config.file_preview_chars),
        };

        if self.is_cancelled() {
            tracing::debug!(path = %file.rel_path, "cancelled before commit");
            return Ok(None);
        }
        self.store.commit_file(repo_name, record, records).await?;

        tracing::debug!(path = %file.rel_path, %reason, chunks = count, "indexed");
        let outcome = if reason == ChangeReason::New {
            FileOutcome::Added { chunks: count }
        } else {
            FileOutcome::Modified { chunks: count }
        };
        Ok(Some(Processed { outcome, oversized }))
    }

    fn emit_failure(&self, report: &mut IndexReport, failure: &WalkFailure) {
        report.errors.push(FileError {
            path: failure.rel_path.clone(),
            message: failure.message.clone(),
        });
        self.emit(report, &failure.rel_path, FileOutcome::Failed);
    }

    fn emit(&self, report: &mut IndexReport, path: &str, outcome: FileOutcome) {
        let event = FileEvent {
            path: path.to_owned(),
            outcome,
        };
        if let Some(tx) = &self.progress {
            let _ = tx.send(event.clone());
        }
        report.record(event);
    }
}

fn finish(mut report: IndexReport, start: std::time::Instant) -> IndexReport {
    report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
    tracing::info!(
        repo = %report.repo_name,
        added = report.files_added,
        modified = report.files_modified,
        unchanged = report.files_unchanged,
        removed = report.files_removed,
        chunks = report.chunks_processed,
        errors = report.errors.len(),
        cancelled = report.cancelled,
        duration_ms = report.duration_ms,
        "indexing finished"
    );
    report
}

/// File-level document text: the first `max_chars` characters, with `...`
/// appended when truncated.
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}
