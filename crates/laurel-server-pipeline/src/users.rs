// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User-processing stage.
//!
//! Resolves one batch of author emails to contributor identities. Each
//! email commits its own transaction, so the `processed = 0` set is
//! always exactly the remaining work no matter where a batch stops.

use laurel_server_db::{CommitStore, ContributorStore, RepoState, RepoStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::resolver::{resolve_email, IdentityApi};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
	/// The repository is not in a state that accepts resolution work.
	Skipped,
	Processed {
		/// Emails newly marked processed by this batch.
		resolved: u32,
		/// The search quota ran out mid-batch; unattempted emails stay
		/// unprocessed and the repository is parked `completed_partial`.
		rate_limit_hit: bool,
		/// This batch drained the last unprocessed email.
		repo_completed: bool,
	},
}

/// Resolve a batch of author emails for one repository.
///
/// Redelivery is a no-op: already-processed emails are skipped before
/// any network work. Emails no longer present in the commit records
/// (the batch outlived a re-extraction) are skipped the same way.
#[instrument(skip_all, fields(repo_id = %repo_id, emails = emails.len()))]
pub async fn process_user_batch(
	repo_id: Uuid,
	emails: &[String],
	repos: &impl RepoStore,
	commits: &impl CommitStore,
	contributors: &impl ContributorStore,
	api: &dyn IdentityApi,
	directory_ttl: chrono::Duration,
	cancel: &CancellationToken,
) -> Result<BatchOutcome> {
	let repo = repos
		.get_by_id(repo_id)
		.await?
		.ok_or_else(|| PipelineError::RepoNotFound(repo_id.to_string()))?;

	match repo.state {
		RepoState::UsersProcessing => {}
		RepoState::CompletedPartial => {
			let resumed = repos
				.transition(repo_id, RepoState::CompletedPartial, RepoState::UsersProcessing)
				.await?;
			if !resumed {
				let current = repos.get_by_id(repo_id).await?.map(|r| r.state);
				if current != Some(RepoState::UsersProcessing) {
					debug!(state = ?current, "Repository left resumable state, skipping batch");
					return Ok(BatchOutcome::Skipped);
				}
			}
		}
		other => {
			debug!(state = other.as_str(), "Repository not accepting resolution work");
			return Ok(BatchOutcome::Skipped);
		}
	}

	let mut resolved = 0u32;
	let mut rate_limit_hit = false;
	for email in emails {
		if cancel.is_cancelled() {
			return Err(PipelineError::Cancelled);
		}

		let Some(record) = commits.get(repo_id, email).await? else {
			debug!(email = %email, "No commit record for batched email, skipping");
			continue;
		};
		if record.processed {
			continue;
		}

		match resolve_email(api, contributors, email, directory_ttl, cancel).await {
			Ok(contributor) => {
				if commits
					.apply_resolution(repo_id, email, contributor.id, record.commit_count)
					.await?
				{
					resolved += 1;
				}
			}
			Err(err) if err.is_rate_limited() => {
				warn!(email = %email, "Search quota exhausted, parking repository");
				rate_limit_hit = true;
				let parked = repos
					.transition(repo_id, RepoState::UsersProcessing, RepoState::CompletedPartial)
					.await?;
				if !parked {
					debug!("Repository state changed while parking");
				}
				break;
			}
			Err(err) => return Err(err),
		}
	}

	// A rate-limited batch always leaves the failing email unprocessed,
	// so the drain check can only succeed on the clean path.
	let repo_completed = if rate_limit_hit {
		false
	} else {
		repos.complete_if_drained(repo_id).await?
	};

	info!(resolved, rate_limit_hit, repo_completed, "Batch finished");
	Ok(BatchOutcome::Processed { resolved, rate_limit_hit, repo_completed })
}
