//! Three-tier change detection: size, modification time, content digest.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::cache::HashCache;
use crate::error::Result;
use crate::store::FileMetadata;
use crate::walker::SourceFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    New,
    Size,
    ModifiedTime,
    Content,
    /// Rebuild requested regardless of the stored metadata.
    Forced,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Size => "size",
            Self::ModifiedTime => "mtime",
            Self::Content => "content",
            Self::Forced => "forced",
        })
    }
}

/// Outcome of classifying one file against its previous record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// `digest` is set only when the hash tier ran.
    Changed {
        reason: ChangeReason,
        digest: Option<String>,
    },
    Unchanged { digest: String },
}

impl Change {
    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// A classification plus the bytes the hash tier read to reach it.
#[derive(Debug)]
pub struct Inspection {
    pub change: Change,
    /// File contents, present only when the hash tier read the file from
    /// disk rather than taking the digest from the cache.
    pub bytes: Option<Vec<u8>>,
}

impl Inspection {
    fn metadata(reason: ChangeReason) -> Self {
        Self {
            change: Change::Changed {
                reason,
                digest: None,
            },
            bytes: None,
        }
    }
}

/// SHA-256 of `bytes` as lowercase hex.
#[must_use]
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct ChangeDetector {
    cache: Arc<HashCache>,
}

impl ChangeDetector {
    #[must_use]
    pub fn new(cache: Arc<HashCache>) -> Self {
        Self { cache }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<HashCache> {
        &self.cache
    }

    /// Classify `file` against the metadata stored by the previous run.
    ///
    /// Size and modification time are compared first and never read the
    /// file. Only when both match is the digest looked up in the cache, and
    /// the file read and hashed on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`crate::IndexError::FileUnreadable`] if the hash tier cannot
    /// read the file.
    pub async fn classify(
        &self,
        file: &SourceFile,
        previous: Option<&FileMetadata>,
    ) -> Result<Change> {
        Ok(self.inspect(file, previous).await?.change)
    }

    /// Like [`Self::classify`], but hands back the bytes read by the hash
    /// tier so a changed file is not read twice.
    ///
    /// # Errors
    ///
    /// Returns [`crate::IndexError::FileUnreadable`] if the hash tier cannot
    /// read the file.
    pub async fn inspect(
        &self,
        file: &SourceFile,
        previous: Option<&FileMetadata>,
    ) -> Result<Inspection> {
        let Some(previous) = previous else {
            return Ok(Inspection::metadata(ChangeReason::New));
        };
        if previous.size != file.size {
            return Ok(Inspection::metadata(ChangeReason::Size));
        }
        if previous.modified_ns != file.modified_ns {
            return Ok(Inspection::metadata(ChangeReason::ModifiedTime));
        }

        let (digest, bytes) = self.digest(file).await?;
        let change = if digest == previous.content_hash {
            Change::Unchanged { digest }
        } else {
            Change::Changed {
                reason: ChangeReason::Content,
                digest: Some(digest),
            }
        };
        Ok(Inspection { change, bytes })
    }

    async fn digest(&self, file: &SourceFile) -> Result<(String, Option<Vec<u8>>)> {
        let key = file.cache_key();
        if let Some(digest) = self.cache.lookup(&key) {
            return Ok((digest, None));
        }
        let bytes = file.read_bytes().await?;
        let digest = content_digest(&bytes);
        self.cache.insert(key, digest.clone());
        Ok((digest, Some(bytes)))
    }
}
