// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Object store abstraction for archived working copies.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, StorageError};

/// Durable blob storage keyed by string.
#[async_trait]
pub trait ObjectStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Bytes>;
	async fn put(&self, key: &str, data: Bytes) -> Result<()>;
	async fn exists(&self, key: &str) -> Result<bool>;
	async fn delete(&self, key: &str) -> Result<()>;
}

/// Filesystem-rooted object store.
///
/// Writes go to a sibling temp file first and are renamed into place,
/// so a crashed upload never leaves a partial object under the final
/// key.
pub struct FsObjectStore {
	root: PathBuf,
}

impl FsObjectStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	fn object_path(&self, key: &str) -> PathBuf {
		self.root.join(key)
	}
}

#[async_trait]
impl ObjectStore for FsObjectStore {
	async fn get(&self, key: &str) -> Result<Bytes> {
		let path = self.object_path(key);
		let data = tokio::fs::read(&path).await.map_err(|e| {
			StorageError::ObjectStore(format!("failed to read object '{key}': {e}"))
		})?;
		Ok(Bytes::from(data))
	}

	async fn put(&self, key: &str, data: Bytes) -> Result<()> {
		let path = self.object_path(key);
		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent).await.map_err(|e| {
				StorageError::ObjectStore(format!("failed to create object dir: {e}"))
			})?;
		}

		let tmp = path.with_extension("tmp-upload");
		tokio::fs::write(&tmp, &data).await.map_err(|e| {
			StorageError::ObjectStore(format!("failed to write object '{key}': {e}"))
		})?;
		tokio::fs::rename(&tmp, &path).await.map_err(|e| {
			StorageError::ObjectStore(format!("failed to finalize object '{key}': {e}"))
		})?;

		debug!(key = %key, bytes = data.len(), "stored object");
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool> {
		Ok(tokio::fs::try_exists(self.object_path(key))
			.await
			.unwrap_or(false))
	}

	async fn delete(&self, key: &str) -> Result<()> {
		let path = self.object_path(key);
		match tokio::fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::ObjectStore(format!(
				"failed to delete object '{key}': {e}"
			))),
		}
	}
}

/// In-memory object store for tests.
pub struct InMemoryObjectStore {
	objects: Mutex<HashMap<String, Bytes>>,
}

impl InMemoryObjectStore {
	pub fn new() -> Self {
		Self {
			objects: Mutex::new(HashMap::new()),
		}
	}
}

impl Default for InMemoryObjectStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
	async fn get(&self, key: &str) -> Result<Bytes> {
		self.objects
			.lock()
			.await
			.get(key)
			.cloned()
			.ok_or_else(|| StorageError::ObjectStore(format!("object '{key}' not found")))
	}

	async fn put(&self, key: &str, data: Bytes) -> Result<()> {
		self.objects.lock().await.insert(key.to_string(), data);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool> {
		Ok(self.objects.lock().await.contains_key(key))
	}

	async fn delete(&self, key: &str) -> Result<()> {
		self.objects.lock().await.remove(key);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_fs_store_round_trip() {
		let temp = tempfile::tempdir().unwrap();
		let store = FsObjectStore::new(temp.path());

		assert!(!store.exists("repos/a.tar.gz").await.unwrap());

		store
			.put("repos/a.tar.gz", Bytes::from_static(b"payload"))
			.await
			.unwrap();
		assert!(store.exists("repos/a.tar.gz").await.unwrap());
		assert_eq!(
			store.get("repos/a.tar.gz").await.unwrap(),
			Bytes::from_static(b"payload")
		);

		store.delete("repos/a.tar.gz").await.unwrap();
		assert!(!store.exists("repos/a.tar.gz").await.unwrap());
	}

	#[tokio::test]
	async fn test_fs_store_get_missing_fails() {
		let temp = tempfile::tempdir().unwrap();
		let store = FsObjectStore::new(temp.path());
		let err = store.get("missing").await.unwrap_err();
		assert!(matches!(err, StorageError::ObjectStore(_)));
	}

	#[tokio::test]
	async fn test_fs_store_delete_is_idempotent() {
		let temp = tempfile::tempdir().unwrap();
		let store = FsObjectStore::new(temp.path());
		store.delete("never-existed").await.unwrap();
	}

	#[tokio::test]
	async fn test_fs_store_put_overwrites() {
		let temp = tempfile::tempdir().unwrap();
		let store = FsObjectStore::new(temp.path());

		store.put("k", Bytes::from_static(b"one")).await.unwrap();
		store.put("k", Bytes::from_static(b"two")).await.unwrap();
		assert_eq!(store.get("k").await.unwrap(), Bytes::from_static(b"two"));
	}

	#[tokio::test]
	async fn test_memory_store_round_trip() {
		let store = InMemoryObjectStore::new();
		store.put("k", Bytes::from_static(b"v")).await.unwrap();
		assert!(store.exists("k").await.unwrap());
		assert_eq!(store.get("k").await.unwrap(), Bytes::from_static(b"v"));
		store.delete("k").await.unwrap();
		assert!(!store.exists("k").await.unwrap());
	}
}
