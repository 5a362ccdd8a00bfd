// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bare clone and fetch over gix.
//!
//! All git work runs under `spawn_blocking`; these calls do blocking
//! network and disk I/O.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use gix::progress::Discard;
use tracing::{debug, info};

use crate::error::{classify_git_error, Result, StorageError};

/// Clone `remote_url` as a bare repository at `target_path`.
pub async fn clone_bare(remote_url: &str, target_path: &Path) -> Result<()> {
	info!(url = %remote_url, path = ?target_path, "cloning bare repository");

	if let Some(parent) = target_path.parent() {
		std::fs::create_dir_all(parent)?;
	}

	let url = remote_url.to_string();
	let path = target_path.to_path_buf();

	tokio::task::spawn_blocking(move || {
		let interrupt = AtomicBool::new(false);
		let url = gix::url::parse(url.as_str().into())
			.map_err(|e| classify_git_error(&format!("invalid URL: {e}")))?;

		let mut prepare = gix::prepare_clone_bare(url, &path)
			.map_err(|e| classify_git_error(&format!("clone prepare failed: {e}")))?;

		prepare
			.fetch_only(Discard, &interrupt)
			.map_err(|e| classify_git_error(&format!("clone fetch failed: {e}")))?;

		debug!("clone completed");
		Ok(())
	})
	.await
	.map_err(|e| StorageError::Git(format!("task join error: {e}")))?
}

/// Fetch all branches from `remote_url` into the bare repository at
/// `repo_path`.
///
/// The remote is addressed by URL rather than by configured name, so
/// explicit refspecs are required for the fetch to update anything.
pub async fn fetch_bare(repo_path: &Path, remote_url: &str) -> Result<()> {
	info!(url = %remote_url, path = ?repo_path, "fetching updates");

	let url = remote_url.to_string();
	let path = repo_path.to_path_buf();

	tokio::task::spawn_blocking(move || {
		let repo = gix::open(&path)
			.map_err(|e| classify_git_error(&format!("failed to open repo: {e}")))?;

		let remote_url = gix::url::parse(url.as_str().into())
			.map_err(|e| classify_git_error(&format!("invalid URL: {e}")))?;

		let remote = repo
			.remote_at(remote_url)
			.map_err(|e| classify_git_error(&format!("failed to create remote: {e}")))?
			.with_refspecs(
				["+refs/heads/*:refs/heads/*"],
				gix::remote::Direction::Fetch,
			)
			.map_err(|e| classify_git_error(&format!("invalid refspec: {e}")))?;

		let interrupt = AtomicBool::new(false);

		remote
			.connect(gix::remote::Direction::Fetch)
			.map_err(|e| classify_git_error(&format!("failed to connect: {e}")))?
			.prepare_fetch(Discard, Default::default())
			.map_err(|e| classify_git_error(&format!("failed to prepare fetch: {e}")))?
			.receive(Discard, &interrupt)
			.map_err(|e| classify_git_error(&format!("fetch failed: {e}")))?;

		debug!("fetch completed");
		Ok(())
	})
	.await
	.map_err(|e| StorageError::Git(format!("task join error: {e}")))?
}
