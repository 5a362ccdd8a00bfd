// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Coordination between the queue and the repository state machine.
//!
//! Batch planning, the startup recovery sweep for abandoned claims,
//! and the scheduled requeue pass that resumes repositories with
//! leftover unprocessed emails.

use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use laurel_server_db::{CommitStore, RepoState, RepoStore};

use crate::error::Result;
use crate::payload::JobPayload;
use crate::store::{EnqueueOutcome, JobQueue};

/// Partition emails into stable batches.
///
/// Sorting before chunking makes the grouping a pure function of the
/// email set, so planning twice over the same set yields identical
/// batches and identical dedup keys.
pub fn plan_batches(emails: &[String], batch_size: usize) -> Vec<Vec<String>> {
	let size = batch_size.max(1);
	let mut sorted = emails.to_vec();
	sorted.sort();
	sorted.chunks(size).map(|chunk| chunk.to_vec()).collect()
}

/// Enqueue commit extraction for a repository. Dedup makes repeated
/// calls collapse onto the live job.
#[instrument(skip(queue))]
pub async fn enqueue_commit_job(queue: &impl JobQueue, repo_id: Uuid) -> Result<EnqueueOutcome> {
	queue.enqueue(&JobPayload::CommitProcessing { repo_id }).await
}

/// Plan and enqueue resolution batches for a repository's email set.
/// Returns the number of batches actually inserted.
#[instrument(skip(queue, emails), fields(repo_id = %repo_id, emails = emails.len()))]
pub async fn enqueue_user_batches(
	queue: &impl JobQueue,
	repo_id: Uuid,
	emails: &[String],
	batch_size: usize,
) -> Result<u32> {
	let mut enqueued = 0;
	for (batch, chunk) in plan_batches(emails, batch_size).into_iter().enumerate() {
		let outcome = queue
			.enqueue(&JobPayload::UserProcessing {
				repo_id,
				batch: batch as u32,
				emails: chunk,
			})
			.await?;

		if outcome.is_duplicate() {
			debug!(batch, "resolution batch already live");
		} else {
			enqueued += 1;
		}
	}

	Ok(enqueued)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
	/// Active claims old enough to be treated as abandoned.
	pub stuck_jobs: u32,
	pub requeued_commit: u32,
	pub requeued_user_batches: u32,
	/// Repositories failed because their retry budget ran out.
	pub failed_repos: u32,
}

/// Startup sweep over abandoned claims.
///
/// An active row whose claim is older than `stale_after` belonged to a
/// worker that died mid-job (with `stale_after` zero, any active row
/// found at startup qualifies). The row is removed; what happens next
/// depends on the attempt budget and the stage:
///
/// - budget exhausted: the repository is marked failed instead of
///   looping forever,
/// - commit job: the repository resets to pending and extraction is
///   requeued with its attempt count carried forward,
/// - user job: the repository stays in users_processing (finished
///   emails are preserved in the processed flags) and the remaining
///   unprocessed emails are requeued as fresh batches.
#[instrument(skip(queue, repos, commits))]
pub async fn recover_stuck(
	queue: &impl JobQueue,
	repos: &impl RepoStore,
	commits: &impl CommitStore,
	stale_after: Duration,
	max_attempts: i64,
	batch_size: usize,
) -> Result<RecoveryReport> {
	let now = Utc::now();
	let mut report = RecoveryReport::default();

	for job in queue.list_active().await? {
		let age = now.signed_duration_since(job.claimed_at);
		if age < stale_after {
			continue;
		}

		report.stuck_jobs += 1;
		let repo_id = job.payload.repo_id();
		info!(
			job_id = %job.id,
			repo_id = %repo_id,
			attempts = job.attempts,
			"recovering abandoned job"
		);
		queue.remove(job.id).await?;

		if job.attempts >= max_attempts {
			warn!(repo_id = %repo_id, attempts = job.attempts, "retry budget exhausted");
			if repos.mark_failed(repo_id).await? {
				report.failed_repos += 1;
			}
			continue;
		}

		match &job.payload {
			JobPayload::CommitProcessing { .. } => {
				// Lost races are fine: the stage re-checks the state
				// when it claims the repository.
				repos
					.transition(repo_id, RepoState::CommitsProcessing, RepoState::Pending)
					.await?;
				queue.requeue(&job.payload, job.attempts).await?;
				report.requeued_commit += 1;
			}
			JobPayload::UserProcessing { .. } => {
				let remaining: Vec<String> = commits
					.list_unprocessed(repo_id)
					.await?
					.into_iter()
					.map(|r| r.author_email)
					.collect();

				if remaining.is_empty() {
					repos.complete_if_drained(repo_id).await?;
					continue;
				}

				for (batch, chunk) in plan_batches(&remaining, batch_size).into_iter().enumerate() {
					let outcome = queue
						.requeue(
							&JobPayload::UserProcessing {
								repo_id,
								batch: batch as u32,
								emails: chunk,
							},
							job.attempts,
						)
						.await?;
					if !outcome.is_duplicate() {
						report.requeued_user_batches += 1;
					}
				}
			}
		}
	}

	Ok(report)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StalledReport {
	pub repos_resumed: u32,
	pub batches_enqueued: u32,
}

/// Scheduled requeue pass for repositories with leftover work.
///
/// A repository in `users_processing` or `completed_partial` that
/// still holds unprocessed commit records but has no live queue job
/// gets its remaining emails planned into fresh batches. This is the
/// path that eventually promotes a rate-limited `completed_partial`
/// repository to `completed`.
#[instrument(skip(queue, repos, commits))]
pub async fn requeue_stalled(
	queue: &impl JobQueue,
	repos: &impl RepoStore,
	commits: &impl CommitStore,
	batch_size: usize,
) -> Result<StalledReport> {
	let mut report = StalledReport::default();

	for repo in repos.list_resumable().await? {
		if queue.live_count_for_repo(repo.id).await? > 0 {
			debug!(repo_id = %repo.id, "work already in flight");
			continue;
		}

		let remaining: Vec<String> = commits
			.list_unprocessed(repo.id)
			.await?
			.into_iter()
			.map(|r| r.author_email)
			.collect();

		if remaining.is_empty() {
			repos.complete_if_drained(repo.id).await?;
			continue;
		}

		if repo.state == RepoState::CompletedPartial
			&& !repos
				.transition(repo.id, RepoState::CompletedPartial, RepoState::UsersProcessing)
				.await?
		{
			continue;
		}

		let batches = enqueue_user_batches(queue, repo.id, &remaining, batch_size).await?;
		info!(repo_id = %repo.id, batches, emails = remaining.len(), "resumed stalled repository");
		report.repos_resumed += 1;
		report.batches_enqueued += batches;
	}

	Ok(report)
}
