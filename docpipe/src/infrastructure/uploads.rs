// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Blob storage
//!
//! Content-addressed storage backing the Upload Manager (§4.3): a blob is
//! written to `<root>/blobs/<shard>/<hash>` where `shard` is the content
//! hash's first byte in hex, and is immutable once written -- two uploads
//! with identical bytes write to the same path, giving deduplication for
//! free at the filesystem layer (the repository-level dedup lookup in
//! [`crate::infrastructure::repositories::sqlite::SqliteFileRepository::find_by_content_hash`]
//! covers the metadata side).

use std::path::{Path, PathBuf};

use docpipe_domain::value_objects::ContentHash;
use docpipe_domain::CoreError;

/// A content-addressed blob store rooted at a single directory.
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path a blob with the given hash would live at, whether or not it has
    /// been written yet.
    pub fn path_for(&self, hash: ContentHash) -> PathBuf {
        self.root.join(hash.shard_prefix()).join(hash.to_hex())
    }

    pub fn exists(&self, hash: ContentHash) -> bool {
        self.path_for(hash).is_file()
    }

    /// Writes `bytes` to its content-addressed path, creating the shard
    /// directory as needed. A no-op if the blob already exists -- the hash
    /// guarantees the existing bytes are identical.
    pub async fn put(&self, hash: ContentHash, bytes: &[u8]) -> Result<PathBuf, CoreError> {
        let path = self.path_for(hash);
        if path.is_file() {
            return Ok(path);
        }
        let Some(parent) = path.parent() else {
            return Err(CoreError::InternalError("blob path has no parent directory".into()));
        };
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::IoError(format!("failed to create blob shard directory: {e}")))?;

        // Write to a temp file in the same shard then rename, so a reader
        // never observes a partially-written blob.
        let tmp_path = parent.join(format!(".{}.tmp", hash.to_hex()));
        tokio::fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| CoreError::IoError(format!("failed to write blob: {e}")))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| CoreError::IoError(format!("failed to finalize blob: {e}")))?;
        Ok(path)
    }

    pub async fn get(&self, hash: ContentHash) -> Result<Vec<u8>, CoreError> {
        let path = self.path_for(hash);
        tokio::fs::read(&path)
            .await
            .map_err(|e| CoreError::NotFound(format!("blob {} not found: {e}", hash.to_hex())))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips_the_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let hash = ContentHash::of_bytes(b"hello blob store");
        store.put(hash, b"hello blob store").await.unwrap();
        assert!(store.exists(hash));
        let back = store.get(hash).await.unwrap();
        assert_eq!(back, b"hello blob store");
    }

    #[tokio::test]
    async fn writing_the_same_hash_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let hash = ContentHash::of_bytes(b"dedup me");
        let first = store.put(hash, b"dedup me").await.unwrap();
        let second = store.put(hash, b"dedup me").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn shard_directory_matches_the_hash_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let hash = ContentHash::of_bytes(b"shard check");
        let path = store.path_for(hash);
        assert_eq!(path.parent().unwrap().file_name().unwrap(), hash.shard_prefix().as_str());
    }
}
