// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job payloads for the two pipeline stages.
//!
//! Payloads are stored as tagged JSON in the queue table. The dedup
//! key keeps at most one live job per repository for commit extraction
//! and at most one live job per (repository, batch) for resolution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
	CommitProcessing,
	UserProcessing,
}

impl JobType {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobType::CommitProcessing => "commit_processing",
			JobType::UserProcessing => "user_processing",
		}
	}
}

impl std::str::FromStr for JobType {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"commit_processing" => Ok(JobType::CommitProcessing),
			"user_processing" => Ok(JobType::UserProcessing),
			_ => Err(format!("unknown job type: {s}")),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
	/// Extract per-author commit counts for one repository.
	CommitProcessing { repo_id: Uuid },

	/// Resolve one batch of author emails for one repository.
	UserProcessing {
		repo_id: Uuid,
		batch: u32,
		emails: Vec<String>,
	},
}

impl JobPayload {
	pub fn job_type(&self) -> JobType {
		match self {
			JobPayload::CommitProcessing { .. } => JobType::CommitProcessing,
			JobPayload::UserProcessing { .. } => JobType::UserProcessing,
		}
	}

	pub fn repo_id(&self) -> Uuid {
		match self {
			JobPayload::CommitProcessing { repo_id } => *repo_id,
			JobPayload::UserProcessing { repo_id, .. } => *repo_id,
		}
	}

	/// Uniqueness key among live jobs of the same type.
	pub fn dedup_key(&self) -> String {
		match self {
			JobPayload::CommitProcessing { repo_id } => repo_id.to_string(),
			JobPayload::UserProcessing { repo_id, batch, .. } => format!("{repo_id}:{batch}"),
		}
	}
}
