// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded worker invocation.
//!
//! One call drains a fixed amount of queued work and returns; an
//! external scheduler owns recurrence. Recovery of abandoned claims
//! runs first so a crashed predecessor cannot wedge a repository.
//!
//! In parallel mode claimed jobs are partitioned into per-repository
//! lanes. Lanes run concurrently under a semaphore; jobs inside one
//! lane run serially so two batches for the same repository can never
//! race the completion check.

use std::collections::HashMap;
use std::sync::Arc;

use laurel_server_config::PipelineConfig;
use laurel_server_db::{SqliteCommitStore, SqliteContributorStore, SqliteRepoStore};
use laurel_server_queue::{
	recover_stuck, ActiveJob, JobPayload, JobQueue, QueueError, RecoveryReport, SqliteJobQueue,
};
use laurel_server_storage::WorkingCopyStore;
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::commits::{process_commits, CommitOutcome};
use crate::error::Result;
use crate::resolver::IdentityApi;
use crate::users::{process_user_batch, BatchOutcome};

/// Everything a worker invocation needs. Cheap to clone; the stores
/// share one pool and the adapters sit behind `Arc`.
#[derive(Clone)]
pub struct PipelineDeps {
	pub repos: SqliteRepoStore,
	pub commits: SqliteCommitStore,
	pub contributors: SqliteContributorStore,
	pub queue: SqliteJobQueue,
	pub store: Arc<dyn WorkingCopyStore>,
	pub api: Arc<dyn IdentityApi>,
	pub config: PipelineConfig,
	pub directory_ttl: chrono::Duration,
}

impl PipelineDeps {
	pub fn new(
		pool: SqlitePool,
		store: Arc<dyn WorkingCopyStore>,
		api: Arc<dyn IdentityApi>,
		config: PipelineConfig,
		directory_ttl: chrono::Duration,
	) -> Self {
		Self {
			repos: SqliteRepoStore::new(pool.clone()),
			commits: SqliteCommitStore::new(pool.clone()),
			contributors: SqliteContributorStore::new(pool.clone()),
			queue: SqliteJobQueue::new(pool),
			store,
			api,
			config,
			directory_ttl,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
	/// Process at most one job, then return.
	Single,
	/// Drain up to `max_jobs`, lanes concurrent, batches per lane serial.
	Parallel,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
	pub recovery: RecoveryReport,
	pub processed: u32,
	pub failed: u32,
	pub rate_limited: u32,
	pub skipped: u32,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
	processed: u32,
	failed: u32,
	rate_limited: u32,
	skipped: u32,
}

impl RunReport {
	fn absorb(&mut self, tally: Tally) {
		self.processed += tally.processed;
		self.failed += tally.failed;
		self.rate_limited += tally.rate_limited;
		self.skipped += tally.skipped;
	}
}

/// Run one worker invocation: recover abandoned claims, then drain.
#[instrument(skip_all, fields(mode = ?mode))]
pub async fn run_worker(
	deps: &PipelineDeps,
	mode: RunMode,
	cancel: &CancellationToken,
) -> Result<RunReport> {
	let recovery = recover_stuck(
		&deps.queue,
		&deps.repos,
		&deps.commits,
		chrono::Duration::seconds(deps.config.stale_claim_secs as i64),
		deps.config.max_attempts as i64,
		deps.config.batch_size as usize,
	)
	.await?;
	if recovery != RecoveryReport::default() {
		info!(
			stuck = recovery.stuck_jobs,
			requeued_commit = recovery.requeued_commit,
			requeued_user_batches = recovery.requeued_user_batches,
			failed_repos = recovery.failed_repos,
			"Recovered abandoned claims"
		);
	}

	let mut report = RunReport { recovery, ..RunReport::default() };
	match mode {
		RunMode::Single => {
			if cancel.is_cancelled() {
				return Ok(report);
			}
			match deps.queue.dequeue_next().await {
				Ok(Some(job)) => {
					let mut tally = Tally::default();
					run_one(deps, job, cancel, &mut tally).await;
					report.absorb(tally);
				}
				Ok(None) => debug!("Queue is empty"),
				Err(QueueError::MalformedPayload { id, message }) => {
					warn!(job_id = %id, message = %message, "Dropped malformed job");
					report.failed += 1;
				}
				Err(err) => return Err(err.into()),
			}
		}
		RunMode::Parallel => {
			let lanes = drain_into_lanes(deps, cancel, &mut report).await?;
			run_lanes(deps, lanes, cancel, &mut report).await;
		}
	}

	info!(
		processed = report.processed,
		failed = report.failed,
		rate_limited = report.rate_limited,
		skipped = report.skipped,
		"Worker invocation finished"
	);
	Ok(report)
}

/// Claim up to `max_jobs` and group them by repository, preserving
/// claim order within each lane.
async fn drain_into_lanes(
	deps: &PipelineDeps,
	cancel: &CancellationToken,
	report: &mut RunReport,
) -> Result<HashMap<Uuid, Vec<ActiveJob>>> {
	let mut lanes: HashMap<Uuid, Vec<ActiveJob>> = HashMap::new();
	let mut drained = 0u32;
	while drained < deps.config.max_jobs {
		if cancel.is_cancelled() {
			break;
		}
		match deps.queue.dequeue_next().await {
			Ok(Some(job)) => {
				lanes.entry(job.payload.repo_id()).or_default().push(job);
				drained += 1;
			}
			Ok(None) => break,
			Err(QueueError::MalformedPayload { id, message }) => {
				warn!(job_id = %id, message = %message, "Dropped malformed job");
				report.failed += 1;
			}
			Err(err) => return Err(err.into()),
		}
	}
	Ok(lanes)
}

async fn run_lanes(
	deps: &PipelineDeps,
	lanes: HashMap<Uuid, Vec<ActiveJob>>,
	cancel: &CancellationToken,
	report: &mut RunReport,
) {
	let semaphore = Arc::new(Semaphore::new(deps.config.max_concurrent_batches.max(1) as usize));
	let mut set: JoinSet<Tally> = JoinSet::new();

	for (repo_id, jobs) in lanes {
		let deps = deps.clone();
		let cancel = cancel.clone();
		let semaphore = Arc::clone(&semaphore);
		set.spawn(async move {
			let mut tally = Tally::default();
			let Ok(_permit) = semaphore.acquire_owned().await else {
				return tally;
			};
			debug!(repo_id = %repo_id, jobs = jobs.len(), "Lane starting");
			for job in jobs {
				if cancel.is_cancelled() {
					// Remaining claims stay active; recovery picks
					// them up on the next invocation.
					break;
				}
				run_one(&deps, job, &cancel, &mut tally).await;
			}
			tally
		});
	}

	while let Some(joined) = set.join_next().await {
		match joined {
			Ok(tally) => report.absorb(tally),
			Err(err) => error!(error = %err, "Lane task failed"),
		}
	}
}

async fn run_one(deps: &PipelineDeps, job: ActiveJob, cancel: &CancellationToken, tally: &mut Tally) {
	let job_id = job.id;
	match execute_job(deps, &job, cancel).await {
		Ok(outcome) => {
			if let Err(err) = deps.queue.ack(job_id).await {
				warn!(job_id = %job_id, error = %err, "Failed to ack job");
			}
			match outcome {
				JobResult::Processed => tally.processed += 1,
				JobResult::Skipped => tally.skipped += 1,
				JobResult::RateLimited => tally.rate_limited += 1,
			}
		}
		Err(err) if err.is_cancelled() => {
			// No ack: the claim is redelivered via recovery.
			debug!(job_id = %job_id, "Job interrupted by shutdown");
		}
		Err(err) => {
			error!(job_id = %job_id, error = %err, "Job failed");
			if let Err(ack_err) = deps.queue.ack(job_id).await {
				warn!(job_id = %job_id, error = %ack_err, "Failed to ack failed job");
			}
			tally.failed += 1;
		}
	}
}

enum JobResult {
	Processed,
	Skipped,
	RateLimited,
}

async fn execute_job(
	deps: &PipelineDeps,
	job: &ActiveJob,
	cancel: &CancellationToken,
) -> Result<JobResult> {
	match &job.payload {
		JobPayload::CommitProcessing { repo_id } => {
			let outcome = process_commits(
				*repo_id,
				&deps.repos,
				&deps.commits,
				&deps.queue,
				deps.store.as_ref(),
				deps.api.as_ref(),
				&deps.config,
				cancel,
			)
			.await?;
			Ok(match outcome {
				CommitOutcome::Skipped => JobResult::Skipped,
				CommitOutcome::Extracted { .. } => JobResult::Processed,
			})
		}
		JobPayload::UserProcessing { repo_id, emails, .. } => {
			let outcome = process_user_batch(
				*repo_id,
				emails,
				&deps.repos,
				&deps.commits,
				&deps.contributors,
				deps.api.as_ref(),
				deps.directory_ttl,
				cancel,
			)
			.await?;
			Ok(match outcome {
				BatchOutcome::Skipped => JobResult::Skipped,
				BatchOutcome::Processed { rate_limit_hit: true, .. } => JobResult::RateLimited,
				BatchOutcome::Processed { .. } => JobResult::Processed,
			})
		}
	}
}
