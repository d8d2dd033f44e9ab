// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Local On-Disk Chunk Store
//!
//! [`LocalStore`] is the one fully concrete [`Store`] this crate ships:
//! chunks live under `root/<prefix4>/<hex id><ext>`. Writes go to a temp
//! file in the same prefix
//! directory and are renamed into place, so a reader never observes a
//! partially-written chunk file.

use async_trait::async_trait;
use casync_domain::{CasyncError, Chunk, ChunkId, Store, WriteStore};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub struct LocalStore {
    root: PathBuf,
    id: String,
    extension: String,
}

impl LocalStore {
    /// `extension` is the combined converter-chain suffix (e.g.
    /// `.cacnk.xchacha20poly1305-a1b2c3d4`) chunk files in this store carry.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let root = root.into();
        let id = format!("local:{}", root.display());
        Self {
            root,
            id,
            extension: extension.into(),
        }
    }

    fn chunk_path(&self, id: ChunkId) -> PathBuf {
        self.root.join(id.prefix4()).join(format!("{}{}", id.to_hex(), self.extension))
    }

    async fn ensure_prefix_dir(&self, id: ChunkId) -> Result<PathBuf, CasyncError> {
        let dir = self.root.join(id.prefix4());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CasyncError::Io(format!("creating prefix dir {}: {e}", dir.display())))?;
        Ok(dir)
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn get(&self, id: ChunkId) -> Result<Chunk, CasyncError> {
        let path = self.chunk_path(id);
        let bytes = fs::read(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CasyncError::chunk_missing(id),
                _ => CasyncError::Io(format!("reading {}: {e}", path.display())),
            })?;
        Ok(Chunk::from_storage(id, bytes, false))
    }

    async fn has(&self, id: ChunkId) -> Result<bool, CasyncError> {
        Ok(fs::try_exists(self.chunk_path(id))
            .await
            .map_err(|e| CasyncError::Io(e.to_string()))?)
    }

    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl WriteStore for LocalStore {
    async fn store(&self, id: ChunkId, storage_bytes: Vec<u8>) -> Result<(), CasyncError> {
        let dir = self.ensure_prefix_dir(id).await?;
        let final_path = self.chunk_path(id);

        // Idempotent: a chunk already on disk under the same id is, by the
        // content-addressing invariant, byte-identical, so a concurrent
        // writer racing us here is harmless.
        if fs::try_exists(&final_path).await.unwrap_or(false) {
            return Ok(());
        }

        let tmp_path = tmp_path_for(&dir, id);
        let mut tmp_file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| CasyncError::Io(format!("creating temp file {}: {e}", tmp_path.display())))?;
        tmp_file
            .write_all(&storage_bytes)
            .await
            .map_err(|e| CasyncError::Io(format!("writing temp file {}: {e}", tmp_path.display())))?;
        tmp_file.sync_all().await.map_err(|e| CasyncError::Io(e.to_string()))?;
        drop(tmp_file);

        fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| CasyncError::Io(format!("renaming into place {}: {e}", final_path.display())))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), CasyncError> {
        Ok(())
    }
}

fn tmp_path_for(dir: &Path, id: ChunkId) -> PathBuf {
    dir.join(format!(".{}.tmp", id.to_hex()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn store_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path(), ".cacnk");
        let id = ChunkId::compute(b"payload");

        assert!(!store.has(id).await.unwrap());
        store.store(id, b"converted-bytes".to_vec()).await.unwrap();
        assert!(store.has(id).await.unwrap());

        let chunk = store.get(id).await.unwrap();
        assert_eq!(chunk.storage_if_present(), Some(b"converted-bytes".as_slice()));
    }

    #[tokio::test]
    async fn missing_chunk_is_chunk_missing() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path(), ".cacnk");
        let id = ChunkId::compute(b"absent");
        let err = store.get(id).await.unwrap_err();
        assert!(matches!(err, CasyncError::ChunkMissing { .. }));
    }

    #[tokio::test]
    async fn storing_same_id_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path(), ".cacnk");
        let id = ChunkId::compute(b"payload");
        store.store(id, b"v1".to_vec()).await.unwrap();
        store.store(id, b"v1".to_vec()).await.unwrap();
        let chunk = store.get(id).await.unwrap();
        assert_eq!(chunk.storage_if_present(), Some(b"v1".as_slice()));
    }

    #[tokio::test]
    async fn chunk_file_lands_under_prefix4_directory() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path(), ".cacnk");
        let id = ChunkId::compute(b"payload");
        store.store(id, b"bytes".to_vec()).await.unwrap();

        let expected = dir.path().join(id.prefix4()).join(format!("{}.cacnk", id.to_hex()));
        assert!(expected.exists());
    }
}
