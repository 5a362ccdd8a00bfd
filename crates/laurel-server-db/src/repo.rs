// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Repository records and their processing state machine.
//!
//! State changes are conditional updates keyed on the expected
//! predecessor state, so concurrent workers cannot double-apply a
//! transition: exactly one `UPDATE ... WHERE state = ?` wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{DbError, Result};

/// Processing lifecycle of a tracked repository.
///
/// ```text
/// pending -> commits_processing -> users_processing -> completed
///                    |                    |      ^
///                    v                    v      |
///                  failed        completed_partial
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoState {
	Pending,
	CommitsProcessing,
	UsersProcessing,
	Completed,
	CompletedPartial,
	Failed,
}

impl RepoState {
	pub fn as_str(&self) -> &'static str {
		match self {
			RepoState::Pending => "pending",
			RepoState::CommitsProcessing => "commits_processing",
			RepoState::UsersProcessing => "users_processing",
			RepoState::Completed => "completed",
			RepoState::CompletedPartial => "completed_partial",
			RepoState::Failed => "failed",
		}
	}

	/// Whether a transition from `self` to `next` is legal.
	///
	/// Covers the happy path, the partial-completion loop, failure from
	/// either processing state, retry, re-processing of a completed
	/// repository, and the abandoned-job reset back to pending.
	pub fn can_transition_to(self, next: RepoState) -> bool {
		use RepoState::*;
		matches!(
			(self, next),
			(Pending, CommitsProcessing)
				| (Completed, CommitsProcessing)
				| (CommitsProcessing, UsersProcessing)
				| (CommitsProcessing, Pending)
				| (CommitsProcessing, Failed)
				| (UsersProcessing, Completed)
				| (UsersProcessing, CompletedPartial)
				| (UsersProcessing, Failed)
				| (CompletedPartial, UsersProcessing)
				| (CompletedPartial, Completed)
				| (Failed, Pending)
		)
	}

	/// States in which a worker currently holds the repository.
	pub fn is_processing(self) -> bool {
		matches!(self, RepoState::CommitsProcessing | RepoState::UsersProcessing)
	}
}

impl std::str::FromStr for RepoState {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"pending" => Ok(RepoState::Pending),
			"commits_processing" => Ok(RepoState::CommitsProcessing),
			"users_processing" => Ok(RepoState::UsersProcessing),
			"completed" => Ok(RepoState::Completed),
			"completed_partial" => Ok(RepoState::CompletedPartial),
			"failed" => Ok(RepoState::Failed),
			_ => Err(format!("unknown repository state: {s}")),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRecord {
	pub id: Uuid,
	pub url: String,
	pub storage_key: String,
	pub state: RepoState,
	pub last_attempt: Option<DateTime<Utc>>,
	pub last_processed_at: Option<DateTime<Utc>>,
	pub commits_processed_at: Option<DateTime<Utc>>,
	pub users_processed_at: Option<DateTime<Utc>>,
	pub total_commits: i64,
	pub unique_contributors: i64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl RepoRecord {
	/// Fresh record for a newly tracked repository.
	pub fn new(url: String, storage_key: String) -> Self {
		let now = Utc::now();
		Self {
			id: Uuid::new_v4(),
			url,
			storage_key,
			state: RepoState::Pending,
			last_attempt: None,
			last_processed_at: None,
			commits_processed_at: None,
			users_processed_at: None,
			total_commits: 0,
			unique_contributors: 0,
			created_at: now,
			updated_at: now,
		}
	}
}

#[async_trait]
pub trait RepoStore: Send + Sync {
	async fn create(&self, repo: &RepoRecord) -> Result<()>;
	async fn get_by_id(&self, id: Uuid) -> Result<Option<RepoRecord>>;
	async fn get_by_url(&self, url: &str) -> Result<Option<RepoRecord>>;

	/// Conditional state change. Returns `false` when the repository was
	/// not in `from` (another worker got there first).
	async fn transition(&self, id: Uuid, from: RepoState, to: RepoState) -> Result<bool>;

	/// Claim the repository for commit processing, stamping the attempt
	/// time. Legal from `pending` and from `completed` (re-processing).
	async fn begin_commit_processing(&self, id: Uuid) -> Result<bool>;

	/// Move the repository to `failed` from either processing state.
	async fn mark_failed(&self, id: Uuid) -> Result<bool>;

	/// Explicit operator retry: `failed` back to `pending`, stamping
	/// `last_attempt` so the retry is visible even before a worker
	/// claims the repository.
	async fn retry(&self, id: Uuid) -> Result<bool>;

	/// Record extraction output on the repository row.
	async fn set_commit_stats(
		&self,
		id: Uuid,
		total_commits: i64,
		unique_contributors: i64,
	) -> Result<()>;

	/// Promote to `completed` if and only if no unprocessed commit
	/// records remain. The emptiness check and the transition are one
	/// atomic statement. Returns `true` when the promotion happened.
	async fn complete_if_drained(&self, id: Uuid) -> Result<bool>;

	/// Repositories holding unprocessed commit records in a resumable
	/// state (`users_processing` or `completed_partial`).
	async fn list_resumable(&self) -> Result<Vec<RepoRecord>>;
}

#[derive(Clone)]
pub struct SqliteRepoStore {
	pool: SqlitePool,
}

impl SqliteRepoStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

const REPO_COLUMNS: &str = "id, url, storage_key, state, last_attempt, last_processed_at, \
	commits_processed_at, users_processed_at, total_commits, unique_contributors, created_at, updated_at";

#[async_trait]
impl RepoStore for SqliteRepoStore {
	#[tracing::instrument(skip(self, repo), fields(repo_id = %repo.id, url = %repo.url))]
	async fn create(&self, repo: &RepoRecord) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO repositories (id, url, storage_key, state, total_commits, unique_contributors, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(repo.id.to_string())
		.bind(&repo.url)
		.bind(&repo.storage_key)
		.bind(repo.state.as_str())
		.bind(repo.total_commits)
		.bind(repo.unique_contributors)
		.bind(repo.created_at.to_rfc3339())
		.bind(repo.updated_at.to_rfc3339())
		.execute(&self.pool)
		.await
		.map_err(|e| match e {
			sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
				DbError::Conflict(format!("repository already tracked: {}", repo.url))
			}
			_ => DbError::Sqlx(e),
		})?;

		Ok(())
	}

	#[tracing::instrument(skip(self), fields(repo_id = %id))]
	async fn get_by_id(&self, id: Uuid) -> Result<Option<RepoRecord>> {
		let row = sqlx::query(&format!(
			"SELECT {REPO_COLUMNS} FROM repositories WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_repo(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn get_by_url(&self, url: &str) -> Result<Option<RepoRecord>> {
		let row = sqlx::query(&format!(
			"SELECT {REPO_COLUMNS} FROM repositories WHERE url = ?"
		))
		.bind(url)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_repo(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(repo_id = %id, from = %from.as_str(), to = %to.as_str()))]
	async fn transition(&self, id: Uuid, from: RepoState, to: RepoState) -> Result<bool> {
		if !from.can_transition_to(to) {
			return Err(DbError::Internal(format!(
				"illegal repository state transition: {} -> {}",
				from.as_str(),
				to.as_str()
			)));
		}

		let result = sqlx::query("UPDATE repositories SET state = ?, updated_at = ? WHERE id = ? AND state = ?")
			.bind(to.as_str())
			.bind(Utc::now().to_rfc3339())
			.bind(id.to_string())
			.bind(from.as_str())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self), fields(repo_id = %id))]
	async fn begin_commit_processing(&self, id: Uuid) -> Result<bool> {
		let now = Utc::now().to_rfc3339();
		let result = sqlx::query(
			r#"
			UPDATE repositories
			SET state = 'commits_processing', last_attempt = ?, updated_at = ?
			WHERE id = ? AND state IN ('pending', 'completed')
			"#,
		)
		.bind(&now)
		.bind(&now)
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self), fields(repo_id = %id))]
	async fn mark_failed(&self, id: Uuid) -> Result<bool> {
		let result = sqlx::query(
			r#"
			UPDATE repositories
			SET state = 'failed', updated_at = ?
			WHERE id = ? AND state IN ('commits_processing', 'users_processing')
			"#,
		)
		.bind(Utc::now().to_rfc3339())
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self), fields(repo_id = %id))]
	async fn retry(&self, id: Uuid) -> Result<bool> {
		let now = Utc::now().to_rfc3339();
		let result = sqlx::query(
			r#"
			UPDATE repositories
			SET state = 'pending', last_attempt = ?, updated_at = ?
			WHERE id = ? AND state = 'failed'
			"#,
		)
		.bind(&now)
		.bind(&now)
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self), fields(repo_id = %id))]
	async fn set_commit_stats(
		&self,
		id: Uuid,
		total_commits: i64,
		unique_contributors: i64,
	) -> Result<()> {
		let now = Utc::now().to_rfc3339();
		let result = sqlx::query(
			r#"
			UPDATE repositories
			SET total_commits = ?, unique_contributors = ?, commits_processed_at = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(total_commits)
		.bind(unique_contributors)
		.bind(&now)
		.bind(&now)
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("repository {id}")));
		}

		Ok(())
	}

	#[tracing::instrument(skip(self), fields(repo_id = %id))]
	async fn complete_if_drained(&self, id: Uuid) -> Result<bool> {
		let now = Utc::now().to_rfc3339();
		let result = sqlx::query(
			r#"
			UPDATE repositories
			SET state = 'completed', users_processed_at = ?, last_processed_at = ?, updated_at = ?
			WHERE id = ?
			  AND state IN ('users_processing', 'completed_partial')
			  AND NOT EXISTS (
				SELECT 1 FROM commit_records WHERE repo_id = ? AND processed = 0
			  )
			"#,
		)
		.bind(&now)
		.bind(&now)
		.bind(&now)
		.bind(id.to_string())
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self))]
	async fn list_resumable(&self) -> Result<Vec<RepoRecord>> {
		let rows = sqlx::query(&format!(
			r#"
			SELECT {REPO_COLUMNS} FROM repositories
			WHERE state IN ('users_processing', 'completed_partial')
			  AND EXISTS (
				SELECT 1 FROM commit_records WHERE repo_id = repositories.id AND processed = 0
			  )
			ORDER BY updated_at ASC
			"#
		))
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_repo).collect()
	}
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|d| d.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(e.to_string()))
}

fn row_to_repo(row: &sqlx::sqlite::SqliteRow) -> Result<RepoRecord> {
	let id_str: String = row.get("id");
	let state_str: String = row.get("state");
	let last_attempt_str: Option<String> = row.get("last_attempt");
	let last_processed_str: Option<String> = row.get("last_processed_at");
	let commits_processed_str: Option<String> = row.get("commits_processed_at");
	let users_processed_str: Option<String> = row.get("users_processed_at");
	let created_at_str: String = row.get("created_at");
	let updated_at_str: String = row.get("updated_at");

	Ok(RepoRecord {
		id: Uuid::parse_str(&id_str).map_err(|e| DbError::Internal(e.to_string()))?,
		url: row.get("url"),
		storage_key: row.get("storage_key"),
		state: state_str.parse().map_err(DbError::Internal)?,
		last_attempt: last_attempt_str.as_deref().map(parse_timestamp).transpose()?,
		last_processed_at: last_processed_str
			.as_deref()
			.map(parse_timestamp)
			.transpose()?,
		commits_processed_at: commits_processed_str
			.as_deref()
			.map(parse_timestamp)
			.transpose()?,
		users_processed_at: users_processed_str
			.as_deref()
			.map(parse_timestamp)
			.transpose()?,
		total_commits: row.get("total_commits"),
		unique_contributors: row.get("unique_contributors"),
		created_at: parse_timestamp(&created_at_str)?,
		updated_at: parse_timestamp(&updated_at_str)?,
	})
}
