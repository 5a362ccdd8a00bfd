// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Processing pipeline configuration section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfigLayer {
	pub batch_size: Option<u32>,
	pub max_jobs: Option<u32>,
	pub max_concurrent_batches: Option<u32>,
	pub stale_claim_secs: Option<u64>,
	pub max_attempts: Option<u32>,
	pub max_repo_size_bytes: Option<u64>,
	pub max_commit_count: Option<u64>,
}

impl PipelineConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.batch_size.is_some() {
			self.batch_size = other.batch_size;
		}
		if other.max_jobs.is_some() {
			self.max_jobs = other.max_jobs;
		}
		if other.max_concurrent_batches.is_some() {
			self.max_concurrent_batches = other.max_concurrent_batches;
		}
		if other.stale_claim_secs.is_some() {
			self.stale_claim_secs = other.stale_claim_secs;
		}
		if other.max_attempts.is_some() {
			self.max_attempts = other.max_attempts;
		}
		if other.max_repo_size_bytes.is_some() {
			self.max_repo_size_bytes = other.max_repo_size_bytes;
		}
		if other.max_commit_count.is_some() {
			self.max_commit_count = other.max_commit_count;
		}
	}

	pub fn finalize(self) -> PipelineConfig {
		PipelineConfig {
			batch_size: self.batch_size.unwrap_or(50),
			max_jobs: self.max_jobs.unwrap_or(16),
			max_concurrent_batches: self.max_concurrent_batches.unwrap_or(4),
			stale_claim_secs: self.stale_claim_secs.unwrap_or(0),
			max_attempts: self.max_attempts.unwrap_or(3),
			max_repo_size_bytes: self.max_repo_size_bytes.unwrap_or(500 * 1024 * 1024),
			max_commit_count: self.max_commit_count.unwrap_or(100_000),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
	/// Emails per user-processing batch.
	pub batch_size: u32,
	/// Jobs drained per worker invocation.
	pub max_jobs: u32,
	/// Batches processed concurrently (different repositories only).
	pub max_concurrent_batches: u32,
	/// Age an active claim must reach before recovery treats it as
	/// abandoned. Zero treats every active claim found at startup as
	/// abandoned.
	pub stale_claim_secs: u64,
	/// Claim attempts before a repeatedly abandoned commit job fails
	/// its repository instead of being re-enqueued.
	pub max_attempts: u32,
	pub max_repo_size_bytes: u64,
	pub max_commit_count: u64,
}

impl Default for PipelineConfig {
	fn default() -> Self {
		PipelineConfigLayer::default().finalize()
	}
}
