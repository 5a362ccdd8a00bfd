// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed durable job queue.
//!
//! Delivery is at-least-once: claiming flips `queued -> active` with a
//! conditional update, acking deletes the row, and a crash between the
//! two leaves an active row behind for startup recovery. A partial
//! unique index on (job_type, dedup_key) keeps at most one live job
//! per key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use laurel_server_db::DbError;

use crate::error::{QueueError, Result};
use crate::payload::{JobPayload, JobType};

/// A job claimed by or visible to a worker.
#[derive(Debug, Clone)]
pub struct ActiveJob {
	pub id: Uuid,
	pub payload: JobPayload,
	pub attempts: i64,
	pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
	Enqueued(Uuid),
	/// A live job with the same dedup key already exists.
	Duplicate(Uuid),
}

impl EnqueueOutcome {
	pub fn job_id(&self) -> Uuid {
		match self {
			EnqueueOutcome::Enqueued(id) | EnqueueOutcome::Duplicate(id) => *id,
		}
	}

	pub fn is_duplicate(&self) -> bool {
		matches!(self, EnqueueOutcome::Duplicate(_))
	}
}

#[async_trait]
pub trait JobQueue: Send + Sync {
	/// Insert a job unless a live one with the same dedup key exists.
	async fn enqueue(&self, payload: &JobPayload) -> Result<EnqueueOutcome>;

	/// Insert a recovered job, carrying its accumulated attempt count
	/// forward so recovery cannot reset the retry budget.
	async fn requeue(&self, payload: &JobPayload, attempts: i64) -> Result<EnqueueOutcome>;

	/// Claim the oldest queued job. Returns `None` when the queue is
	/// drained. A malformed payload removes the row and surfaces as
	/// [`QueueError::MalformedPayload`].
	async fn dequeue_next(&self) -> Result<Option<ActiveJob>>;

	/// Drop a finished job. Acking an already-gone id is a no-op.
	async fn ack(&self, id: Uuid) -> Result<()>;

	/// Jobs currently claimed by some worker. Malformed rows are
	/// deleted and skipped.
	async fn list_active(&self) -> Result<Vec<ActiveJob>>;

	/// Remove a job regardless of status.
	async fn remove(&self, id: Uuid) -> Result<()>;

	async fn find_live_by_dedup(&self, job_type: JobType, dedup_key: &str) -> Result<Option<Uuid>>;

	/// Live jobs (queued or active) touching the repository.
	async fn live_count_for_repo(&self, repo_id: Uuid) -> Result<i64>;
}

#[derive(Clone)]
pub struct SqliteJobQueue {
	pool: SqlitePool,
}

impl SqliteJobQueue {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	async fn insert(&self, payload: &JobPayload, attempts: i64) -> Result<EnqueueOutcome> {
		let job_type = payload.job_type();
		let dedup_key = payload.dedup_key();

		// Check-then-insert, with the unique index as the backstop for
		// the window between the two.
		for _ in 0..2 {
			if let Some(existing) = self.find_live_by_dedup(job_type, &dedup_key).await? {
				return Ok(EnqueueOutcome::Duplicate(existing));
			}

			let id = Uuid::new_v4();
			let result = sqlx::query(
				r#"
				INSERT INTO queue_jobs (id, job_type, repo_id, payload, dedup_key, status, attempts, created_at)
				VALUES (?, ?, ?, ?, ?, 'queued', ?, ?)
				ON CONFLICT DO NOTHING
				"#,
			)
			.bind(id.to_string())
			.bind(job_type.as_str())
			.bind(payload.repo_id().to_string())
			.bind(serde_json::to_string(payload)?)
			.bind(&dedup_key)
			.bind(attempts)
			.bind(Utc::now().to_rfc3339())
			.execute(&self.pool)
			.await?;

			if result.rows_affected() > 0 {
				return Ok(EnqueueOutcome::Enqueued(id));
			}
			// Lost the insert race; the winner shows up in the lookup
			// on the next pass.
		}

		Err(QueueError::Db(DbError::Internal(format!(
			"enqueue race on dedup key {dedup_key}"
		))))
	}
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
	#[tracing::instrument(skip(self, payload), fields(repo_id = %payload.repo_id(), job_type = payload.job_type().as_str()))]
	async fn enqueue(&self, payload: &JobPayload) -> Result<EnqueueOutcome> {
		self.insert(payload, 0).await
	}

	#[tracing::instrument(skip(self, payload), fields(repo_id = %payload.repo_id(), attempts))]
	async fn requeue(&self, payload: &JobPayload, attempts: i64) -> Result<EnqueueOutcome> {
		self.insert(payload, attempts).await
	}

	#[tracing::instrument(skip(self))]
	async fn dequeue_next(&self) -> Result<Option<ActiveJob>> {
		loop {
			let row = sqlx::query(
				r#"
				SELECT id, payload, attempts FROM queue_jobs
				WHERE status = 'queued'
				ORDER BY created_at ASC, id ASC
				LIMIT 1
				"#,
			)
			.fetch_optional(&self.pool)
			.await?;

			let Some(row) = row else {
				return Ok(None);
			};

			let id_str: String = row.get("id");
			let payload_str: String = row.get("payload");
			let attempts: i64 = row.get("attempts");
			let id = Uuid::parse_str(&id_str).map_err(|e| DbError::Internal(e.to_string()))?;

			let claimed_at = Utc::now();
			let claimed = sqlx::query(
				r#"
				UPDATE queue_jobs
				SET status = 'active', attempts = attempts + 1, claimed_at = ?
				WHERE id = ? AND status = 'queued'
				"#,
			)
			.bind(claimed_at.to_rfc3339())
			.bind(&id_str)
			.execute(&self.pool)
			.await?;

			if claimed.rows_affected() == 0 {
				// Another worker claimed it first; look again.
				continue;
			}

			let payload: JobPayload = match serde_json::from_str(&payload_str) {
				Ok(p) => p,
				Err(e) => {
					self.remove(id).await?;
					return Err(QueueError::MalformedPayload {
						id,
						message: e.to_string(),
					});
				}
			};

			return Ok(Some(ActiveJob {
				id,
				payload,
				attempts: attempts + 1,
				claimed_at,
			}));
		}
	}

	#[tracing::instrument(skip(self), fields(job_id = %id))]
	async fn ack(&self, id: Uuid) -> Result<()> {
		sqlx::query("DELETE FROM queue_jobs WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn list_active(&self) -> Result<Vec<ActiveJob>> {
		let rows = sqlx::query(
			r#"
			SELECT id, payload, attempts, claimed_at FROM queue_jobs
			WHERE status = 'active'
			ORDER BY claimed_at ASC
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		let mut jobs = Vec::with_capacity(rows.len());
		for row in rows {
			let id_str: String = row.get("id");
			let payload_str: String = row.get("payload");
			let attempts: i64 = row.get("attempts");
			let claimed_at_str: Option<String> = row.get("claimed_at");

			let id = Uuid::parse_str(&id_str).map_err(|e| DbError::Internal(e.to_string()))?;
			let payload: JobPayload = match serde_json::from_str(&payload_str) {
				Ok(p) => p,
				Err(e) => {
					warn!(job_id = %id, error = %e, "dropping active job with malformed payload");
					self.remove(id).await?;
					continue;
				}
			};

			let claimed_at = claimed_at_str
				.as_deref()
				.map(|s| {
					DateTime::parse_from_rfc3339(s)
						.map(|d| d.with_timezone(&Utc))
						.map_err(|e| DbError::Internal(e.to_string()))
				})
				.transpose()?
				.unwrap_or_else(Utc::now);

			jobs.push(ActiveJob {
				id,
				payload,
				attempts,
				claimed_at,
			});
		}

		Ok(jobs)
	}

	#[tracing::instrument(skip(self), fields(job_id = %id))]
	async fn remove(&self, id: Uuid) -> Result<()> {
		sqlx::query("DELETE FROM queue_jobs WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn find_live_by_dedup(&self, job_type: JobType, dedup_key: &str) -> Result<Option<Uuid>> {
		let row = sqlx::query("SELECT id FROM queue_jobs WHERE job_type = ? AND dedup_key = ?")
			.bind(job_type.as_str())
			.bind(dedup_key)
			.fetch_optional(&self.pool)
			.await?;

		row
			.map(|r| {
				let id: String = r.get("id");
				Uuid::parse_str(&id).map_err(|e| QueueError::Db(DbError::Internal(e.to_string())))
			})
			.transpose()
	}

	#[tracing::instrument(skip(self), fields(repo_id = %repo_id))]
	async fn live_count_for_repo(&self, repo_id: Uuid) -> Result<i64> {
		let row = sqlx::query("SELECT COUNT(*) AS n FROM queue_jobs WHERE repo_id = ?")
			.bind(repo_id.to_string())
			.fetch_one(&self.pool)
			.await?;

		Ok(row.get("n"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use laurel_server_db::testing::create_migrated_test_pool;

	fn commit_job(repo_id: Uuid) -> JobPayload {
		JobPayload::CommitProcessing { repo_id }
	}

	fn user_job(repo_id: Uuid, batch: u32) -> JobPayload {
		JobPayload::UserProcessing {
			repo_id,
			batch,
			emails: vec![format!("batch{batch}@example.com")],
		}
	}

	#[tokio::test]
	async fn test_enqueue_and_dedup() {
		let pool = create_migrated_test_pool().await;
		let queue = SqliteJobQueue::new(pool);
		let repo_id = Uuid::new_v4();

		let first = queue.enqueue(&commit_job(repo_id)).await.unwrap();
		let second = queue.enqueue(&commit_job(repo_id)).await.unwrap();

		assert!(matches!(first, EnqueueOutcome::Enqueued(_)));
		assert!(second.is_duplicate());
		assert_eq!(second.job_id(), first.job_id());
	}

	#[tokio::test]
	async fn test_concurrent_enqueue_yields_one_job() {
		let pool = create_migrated_test_pool().await;
		let queue = SqliteJobQueue::new(pool);
		let repo_id = Uuid::new_v4();

		let job_a = commit_job(repo_id);
		let job_b = commit_job(repo_id);
		let (a, b) = tokio::join!(queue.enqueue(&job_a), queue.enqueue(&job_b));
		let (a, b) = (a.unwrap(), b.unwrap());

		assert!(a.is_duplicate() != b.is_duplicate(), "exactly one insert wins");
		assert_eq!(queue.live_count_for_repo(repo_id).await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_distinct_batches_both_enqueue() {
		let pool = create_migrated_test_pool().await;
		let queue = SqliteJobQueue::new(pool);
		let repo_id = Uuid::new_v4();

		assert!(!queue.enqueue(&user_job(repo_id, 0)).await.unwrap().is_duplicate());
		assert!(!queue.enqueue(&user_job(repo_id, 1)).await.unwrap().is_duplicate());
		assert_eq!(queue.live_count_for_repo(repo_id).await.unwrap(), 2);
	}

	#[tokio::test]
	async fn test_dequeue_claims_oldest_first() {
		let pool = create_migrated_test_pool().await;
		let queue = SqliteJobQueue::new(pool);
		let first_repo = Uuid::new_v4();
		let second_repo = Uuid::new_v4();

		queue.enqueue(&commit_job(first_repo)).await.unwrap();
		tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		queue.enqueue(&commit_job(second_repo)).await.unwrap();

		let job = queue.dequeue_next().await.unwrap().unwrap();
		assert_eq!(job.payload.repo_id(), first_repo);
		assert_eq!(job.attempts, 1);

		let job = queue.dequeue_next().await.unwrap().unwrap();
		assert_eq!(job.payload.repo_id(), second_repo);

		assert!(queue.dequeue_next().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_ack_deletes_job() {
		let pool = create_migrated_test_pool().await;
		let queue = SqliteJobQueue::new(pool);

		queue.enqueue(&commit_job(Uuid::new_v4())).await.unwrap();
		let job = queue.dequeue_next().await.unwrap().unwrap();

		queue.ack(job.id).await.unwrap();
		assert!(queue.list_active().await.unwrap().is_empty());

		// Already gone; acking again is harmless.
		queue.ack(job.id).await.unwrap();
	}

	#[tokio::test]
	async fn test_unacked_claim_stays_active() {
		let pool = create_migrated_test_pool().await;
		let queue = SqliteJobQueue::new(pool);
		let repo_id = Uuid::new_v4();

		queue.enqueue(&commit_job(repo_id)).await.unwrap();
		let job = queue.dequeue_next().await.unwrap().unwrap();

		// Simulated crash: the claim is never acked.
		let active = queue.list_active().await.unwrap();
		assert_eq!(active.len(), 1);
		assert_eq!(active[0].id, job.id);
		assert_eq!(active[0].attempts, 1);

		// The claimed job is invisible to dequeue but still live.
		assert!(queue.dequeue_next().await.unwrap().is_none());
		assert_eq!(queue.live_count_for_repo(repo_id).await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_dedup_clears_after_ack() {
		let pool = create_migrated_test_pool().await;
		let queue = SqliteJobQueue::new(pool);
		let repo_id = Uuid::new_v4();

		queue.enqueue(&commit_job(repo_id)).await.unwrap();
		let job = queue.dequeue_next().await.unwrap().unwrap();
		queue.ack(job.id).await.unwrap();

		let again = queue.enqueue(&commit_job(repo_id)).await.unwrap();
		assert!(matches!(again, EnqueueOutcome::Enqueued(_)));
	}

	#[tokio::test]
	async fn test_requeue_preserves_attempts() {
		let pool = create_migrated_test_pool().await;
		let queue = SqliteJobQueue::new(pool);
		let repo_id = Uuid::new_v4();

		queue.requeue(&commit_job(repo_id), 2).await.unwrap();
		let job = queue.dequeue_next().await.unwrap().unwrap();
		assert_eq!(job.attempts, 3, "claim increments the carried count");
	}

	#[tokio::test]
	async fn test_malformed_payload_is_removed_and_reported() {
		let pool = create_migrated_test_pool().await;
		let queue = SqliteJobQueue::new(pool.clone());

		sqlx::query(
			r#"
			INSERT INTO queue_jobs (id, job_type, repo_id, payload, dedup_key, status, attempts, created_at)
			VALUES (?, 'commit_processing', ?, '{not json', 'bad', 'queued', 0, ?)
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(Uuid::new_v4().to_string())
		.bind(Utc::now().to_rfc3339())
		.execute(&pool)
		.await
		.unwrap();

		let err = queue.dequeue_next().await.unwrap_err();
		assert!(matches!(err, QueueError::MalformedPayload { .. }));

		// The poisoned row is gone; the queue keeps working.
		assert!(queue.dequeue_next().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_remove_drops_active_job() {
		let pool = create_migrated_test_pool().await;
		let queue = SqliteJobQueue::new(pool);
		let repo_id = Uuid::new_v4();

		queue.enqueue(&user_job(repo_id, 0)).await.unwrap();
		let job = queue.dequeue_next().await.unwrap().unwrap();

		queue.remove(job.id).await.unwrap();
		assert!(queue.list_active().await.unwrap().is_empty());
		assert_eq!(queue.live_count_for_repo(repo_id).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_find_live_by_dedup_scopes_by_type() {
		let pool = create_migrated_test_pool().await;
		let queue = SqliteJobQueue::new(pool);
		let repo_id = Uuid::new_v4();

		let outcome = queue.enqueue(&commit_job(repo_id)).await.unwrap();

		let found = queue
			.find_live_by_dedup(JobType::CommitProcessing, &repo_id.to_string())
			.await
			.unwrap();
		assert_eq!(found, Some(outcome.job_id()));

		// Same key under the other job type does not match.
		let other = queue
			.find_live_by_dedup(JobType::UserProcessing, &repo_id.to_string())
			.await
			.unwrap();
		assert!(other.is_none());
	}
}
