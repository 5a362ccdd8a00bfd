// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! First-parent-independent commit attribution.
//!
//! Walks every commit reachable from `HEAD` and tallies commits per
//! author email. Emails are trimmed and lowercased before counting so
//! the tally key matches the commit-record key exactly.

use std::collections::BTreeMap;
use std::path::PathBuf;

use laurel_server_db::AuthorCount;
use tracing::{debug, instrument};

use crate::error::{PipelineError, Result};

/// Outcome of a full history walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
	/// Per-email commit tallies, ordered by email.
	pub counts: Vec<AuthorCount>,
	/// Every commit walked, including those with no usable author email.
	pub total_commits: u64,
}

impl Extraction {
	fn empty() -> Self {
		Self { counts: Vec::new(), total_commits: 0 }
	}
}

/// Tally commits per author email across the full history of the
/// repository at `repo_path`.
///
/// A repository with an unborn `HEAD` yields an empty extraction.
/// Commits whose author email is empty still count toward
/// `total_commits` but produce no tally entry.
#[instrument(fields(path = ?repo_path))]
pub async fn extract_counts(repo_path: PathBuf) -> Result<Extraction> {
	let extraction = tokio::task::spawn_blocking(move || walk_history(&repo_path))
		.await
		.map_err(|e| PipelineError::Extract(format!("extraction task failed: {}", e)))??;

	debug!(
		total_commits = extraction.total_commits,
		authors = extraction.counts.len(),
		"Extraction complete"
	);
	Ok(extraction)
}

fn walk_history(repo_path: &std::path::Path) -> Result<Extraction> {
	let repo = gix::open(repo_path)
		.map_err(|e| PipelineError::Extract(format!("failed to open repository: {}", e)))?;

	let head = repo
		.head()
		.map_err(|e| PipelineError::Extract(format!("failed to resolve HEAD: {}", e)))?;
	let Some(head_id) = head.id() else {
		return Ok(Extraction::empty());
	};

	let walk = repo
		.rev_walk([head_id.detach()])
		.all()
		.map_err(|e| PipelineError::Extract(format!("failed to start history walk: {}", e)))?;

	let mut tally: BTreeMap<String, i64> = BTreeMap::new();
	let mut total_commits: u64 = 0;
	for info in walk {
		let info =
			info.map_err(|e| PipelineError::Extract(format!("history walk failed: {}", e)))?;
		let object = info
			.object()
			.map_err(|e| PipelineError::Extract(format!("failed to load commit: {}", e)))?;
		let decoded = object
			.decode()
			.map_err(|e| PipelineError::Extract(format!("failed to decode commit: {}", e)))?;

		total_commits += 1;
		let email = decoded.author.email.to_string().trim().to_lowercase();
		if email.is_empty() {
			continue;
		}
		*tally.entry(email).or_insert(0) += 1;
	}

	let counts = tally
		.into_iter()
		.map(|(email, commits)| AuthorCount { email, commits })
		.collect();
	Ok(Extraction { counts, total_commits })
}
