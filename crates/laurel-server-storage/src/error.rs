// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
	#[error("repository not found: {0}")]
	RepoNotFound(String),

	#[error("remote unreachable: {0}")]
	Unreachable(String),

	#[error("permission denied: {0}")]
	PermissionDenied(String),

	#[error("git operation failed: {0}")]
	Git(String),

	#[error("archive operation failed: {0}")]
	Archive(String),

	#[error("object store operation failed: {0}")]
	ObjectStore(String),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

/// Map a raw git failure message onto the stable error categories the
/// pipeline reports to users.
pub fn classify_git_error(msg: &str) -> StorageError {
	let lower = msg.to_lowercase();

	if lower.contains("not found")
		|| lower.contains("does not exist")
		|| lower.contains("404")
		|| lower.contains("unadvertised object")
	{
		return StorageError::RepoNotFound(msg.to_string());
	}

	if lower.contains("authentication")
		|| lower.contains("permission denied")
		|| lower.contains("credentials")
		|| lower.contains("401")
		|| lower.contains("403")
	{
		return StorageError::PermissionDenied(msg.to_string());
	}

	if lower.contains("could not connect")
		|| lower.contains("failed to connect")
		|| lower.contains("connection refused")
		|| lower.contains("failed to resolve")
		|| lower.contains("name or service not known")
		|| lower.contains("timed out")
		|| lower.contains("network")
	{
		return StorageError::Unreachable(msg.to_string());
	}

	StorageError::Git(msg.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_classify_not_found() {
		assert!(matches!(
			classify_git_error("fatal: repository 'https://github.com/a/b' not found"),
			StorageError::RepoNotFound(_)
		));
		assert!(matches!(
			classify_git_error("remote: HTTP 404"),
			StorageError::RepoNotFound(_)
		));
	}

	#[test]
	fn test_classify_permission_denied() {
		assert!(matches!(
			classify_git_error("fatal: Authentication failed for 'https://github.com/a/b'"),
			StorageError::PermissionDenied(_)
		));
		assert!(matches!(
			classify_git_error("remote: HTTP 403 forbidden"),
			StorageError::PermissionDenied(_)
		));
	}

	#[test]
	fn test_classify_unreachable() {
		assert!(matches!(
			classify_git_error("failed to connect to github.com"),
			StorageError::Unreachable(_)
		));
		assert!(matches!(
			classify_git_error("An IO error occurred: connection timed out"),
			StorageError::Unreachable(_)
		));
	}

	#[test]
	fn test_classify_other_stays_git() {
		assert!(matches!(
			classify_git_error("object corrupt or missing header"),
			StorageError::Git(_)
		));
	}
}
