// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for GitHub API operations.

/// Errors that can occur when talking to the GitHub API.
#[derive(Debug, thiserror::Error)]
pub enum GithubError {
	/// The API signalled that the rate limit is exhausted. Callers stop
	/// the current batch instead of retrying into the same wall.
	#[error("GitHub rate limit exceeded (resets at epoch {reset_epoch:?})")]
	RateLimited { reset_epoch: Option<u64> },

	/// The HTTP request failed (network error, timeout, etc.).
	#[error("HTTP request failed: {0}")]
	Http(#[from] reqwest::Error),

	/// GitHub returned a non-success response that is not a rate limit.
	#[error("GitHub API error ({status}): {message}")]
	Api { status: u16, message: String },

	/// The response body could not be parsed as expected.
	#[error("failed to parse response: {0}")]
	Parse(String),

	/// The operation was interrupted by shutdown.
	#[error("operation cancelled")]
	Cancelled,
}

pub type Result<T> = std::result::Result<T, GithubError>;

impl GithubError {
	/// Whether this error is the distinguishable rate-limit case.
	pub fn is_rate_limited(&self) -> bool {
		matches!(self, GithubError::RateLimited { .. })
	}
}
