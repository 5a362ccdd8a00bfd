// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

use laurel_server_db::DbError;
use laurel_server_github::GithubError;
use laurel_server_queue::QueueError;
use laurel_server_storage::StorageError;

/// Which ceiling a repository blew through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLimitKind {
	Bytes,
	Commits,
}

impl std::fmt::Display for SizeLimitKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SizeLimitKind::Bytes => write!(f, "bytes"),
			SizeLimitKind::Commits => write!(f, "commits"),
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
	#[error("Repository not found: {0}")]
	RepoNotFound(String),

	#[error("Repository exceeds size limit: {actual} {kind} > {limit} {kind}")]
	RepoTooLarge {
		kind: SizeLimitKind,
		actual: u64,
		limit: u64,
	},

	#[error("Invalid repository URL: {0}")]
	InvalidUrl(String),

	#[error("Operation cancelled")]
	Cancelled,

	#[error("Commit extraction failed: {0}")]
	Extract(String),

	#[error(transparent)]
	Storage(#[from] StorageError),

	#[error(transparent)]
	Db(#[from] DbError),

	#[error(transparent)]
	Queue(#[from] QueueError),

	#[error(transparent)]
	Github(GithubError),
}

// Cancellation surfaces the same way no matter which layer noticed it.
impl From<GithubError> for PipelineError {
	fn from(err: GithubError) -> Self {
		match err {
			GithubError::Cancelled => PipelineError::Cancelled,
			other => PipelineError::Github(other),
		}
	}
}

impl PipelineError {
	pub fn is_cancelled(&self) -> bool {
		matches!(self, PipelineError::Cancelled)
	}

	pub fn is_rate_limited(&self) -> bool {
		matches!(self, PipelineError::Github(GithubError::RateLimited { .. }))
	}
}

pub type Result<T> = std::result::Result<T, PipelineError>;
