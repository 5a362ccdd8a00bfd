// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Working copy storage behind a backend-neutral trait.
//!
//! The pipeline addresses repositories by storage key (for example
//! `github.com/owner/repo`) and never by filesystem path, so the same
//! stages run against local disk or an archive-backed store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::git;

/// Storage backend for bare working copies.
///
/// `local_path` hands out a directory that stays valid until the next
/// mutating call for the same key. Callers finish reading before they
/// clone, fetch or delete again.
#[async_trait]
pub trait WorkingCopyStore: Send + Sync {
	/// Create the backing root if it does not exist yet.
	async fn ensure_root(&self) -> Result<()>;

	async fn exists(&self, key: &str) -> Result<bool>;

	/// Local directory holding the working copy for `key`.
	/// Fails with [`StorageError::RepoNotFound`] when the key has never
	/// been cloned.
	async fn local_path(&self, key: &str) -> Result<PathBuf>;

	/// Clone `remote_url` into the slot for `key`, replacing any
	/// partial state left by an earlier attempt.
	async fn clone_from_git(&self, remote_url: &str, key: &str) -> Result<()>;

	/// Fetch new commits from `remote_url` into the existing copy.
	async fn fetch_updates(&self, key: &str, remote_url: &str) -> Result<()>;

	/// Remove the working copy. Deleting an absent key is not an error.
	async fn delete(&self, key: &str) -> Result<()>;

	/// On-disk size of the working copy in bytes.
	async fn measure(&self, key: &str) -> Result<u64>;
}

/// Working copies kept as plain directories under a root path.
pub struct LocalDiskStore {
	root: PathBuf,
}

impl LocalDiskStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	fn repo_path(&self, key: &str) -> PathBuf {
		self.root.join(key)
	}
}

#[async_trait]
impl WorkingCopyStore for LocalDiskStore {
	async fn ensure_root(&self) -> Result<()> {
		tokio::fs::create_dir_all(&self.root).await?;
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool> {
		Ok(tokio::fs::try_exists(self.repo_path(key))
			.await
			.unwrap_or(false))
	}

	async fn local_path(&self, key: &str) -> Result<PathBuf> {
		let path = self.repo_path(key);
		if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
			return Err(StorageError::RepoNotFound(key.to_string()));
		}
		Ok(path)
	}

	async fn clone_from_git(&self, remote_url: &str, key: &str) -> Result<()> {
		let path = self.repo_path(key);
		// A previous interrupted clone may have left a partial
		// directory that gix would refuse to clone into.
		if tokio::fs::try_exists(&path).await.unwrap_or(false) {
			debug!(key = %key, "removing stale working copy before clone");
			tokio::fs::remove_dir_all(&path).await?;
		}
		git::clone_bare(remote_url, &path).await
	}

	async fn fetch_updates(&self, key: &str, remote_url: &str) -> Result<()> {
		let path = self.local_path(key).await?;
		git::fetch_bare(&path, remote_url).await
	}

	async fn delete(&self, key: &str) -> Result<()> {
		let path = self.repo_path(key);
		match tokio::fs::remove_dir_all(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	async fn measure(&self, key: &str) -> Result<u64> {
		let path = self.local_path(key).await?;
		tokio::task::spawn_blocking(move || dir_size_bytes(&path))
			.await
			.map_err(|e| StorageError::Io(std::io::Error::other(format!("task join error: {e}"))))?
	}
}

/// Recursive byte count of every regular file under `path`.
/// Symlinks are counted by their own size, not their target's.
pub fn dir_size_bytes(path: &Path) -> Result<u64> {
	let mut total = 0u64;
	for entry in std::fs::read_dir(path)? {
		let entry = entry?;
		let file_type = entry.file_type()?;
		if file_type.is_dir() {
			total = total.saturating_add(dir_size_bytes(&entry.path())?);
		} else {
			total = total.saturating_add(entry.metadata()?.len());
		}
	}
	Ok(total)
}
