//! Incremental repository indexing.
//!
//! A run walks a repository, classifies each file against the metadata
//! stored by the previous run (size, then modification time, then SHA-256
//! content digest), splits added and modified files into boundary-aware
//! overlapping chunks, and syncs file and chunk records into an
//! [`store::IndexStore`]. Unchanged files cause no writes.

pub mod cache;
pub mod chunker;
pub mod detector;
pub mod error;
pub mod in_memory_store;
pub mod indexer;
pub mod languages;
pub mod sqlite;
pub mod store;
pub mod walker;

pub use cache::{CacheStats, HashCache, HashCacheKey};
pub use chunker::{Chunk, ChunkerConfig, chunk_content};
pub use detector::{Change, ChangeDetector, ChangeReason, Inspection};
pub use error::{IndexError, Result};
pub use in_memory_store::{InMemoryStore, StoreOp};
pub use indexer::{FileError, FileEvent, FileOutcome, IndexReport, IndexerConfig, RepoIndexer};
pub use languages::{Lang, Markers, detect_language};
pub use sqlite::SqliteStore;
pub use store::{
    ChunkRecord, CollectionKind, FileMetadata, FileRecord, FileSummary, IndexStore, RepoInfo,
    StoreError, repository_info,
};
pub use walker::{FileWalker, SourceFile, WalkFailure, WalkOutput, WalkerConfig};
