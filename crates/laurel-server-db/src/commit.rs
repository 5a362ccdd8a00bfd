// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-author commit tallies and their resolution bookkeeping.
//!
//! A commit record is the unit of identity-resolution work: one row per
//! (repository, author email) with the commit count and a `processed`
//! flag. `apply_resolution` flips the flag and credits the contributor
//! in one transaction, so a redelivered batch cannot double-credit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{DbError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
	pub repo_id: Uuid,
	pub author_email: String,
	pub commit_count: i64,
	pub processed: bool,
	pub created_at: DateTime<Utc>,
}

/// Extraction output: commits attributed to one author email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorCount {
	pub email: String,
	pub commits: i64,
}

#[async_trait]
pub trait CommitStore: Send + Sync {
	/// Replace the repository's commit records with a fresh extraction.
	///
	/// Runs in one transaction: prior commit records and contributor
	/// join rows are dropped, then every count is inserted unprocessed.
	/// Re-extraction therefore overwrites counts rather than
	/// accumulating them, and emails that left the history disappear.
	async fn replace_for_repo(&self, repo_id: Uuid, counts: &[AuthorCount]) -> Result<()>;

	async fn get(&self, repo_id: Uuid, author_email: &str) -> Result<Option<CommitRecord>>;

	/// Unprocessed records for the repository, ordered by author email.
	async fn list_unprocessed(&self, repo_id: Uuid) -> Result<Vec<CommitRecord>>;

	async fn unprocessed_count(&self, repo_id: Uuid) -> Result<i64>;

	/// Mark one commit record processed and credit the contributor.
	///
	/// The `processed 0 -> 1` flip is the guard: if another delivery
	/// already won it, nothing is credited and `false` comes back.
	/// Credits for the same contributor under different emails merge
	/// additively into one join row.
	async fn apply_resolution(
		&self,
		repo_id: Uuid,
		author_email: &str,
		contributor_id: Uuid,
		commit_count: i64,
	) -> Result<bool>;
}

#[derive(Clone)]
pub struct SqliteCommitStore {
	pool: SqlitePool,
}

impl SqliteCommitStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl CommitStore for SqliteCommitStore {
	#[tracing::instrument(skip(self, counts), fields(repo_id = %repo_id, emails = counts.len()))]
	async fn replace_for_repo(&self, repo_id: Uuid, counts: &[AuthorCount]) -> Result<()> {
		let now = Utc::now().to_rfc3339();
		let mut tx = self.pool.begin().await?;

		sqlx::query("DELETE FROM repository_contributors WHERE repo_id = ?")
			.bind(repo_id.to_string())
			.execute(&mut *tx)
			.await?;

		sqlx::query("DELETE FROM commit_records WHERE repo_id = ?")
			.bind(repo_id.to_string())
			.execute(&mut *tx)
			.await?;

		for count in counts {
			sqlx::query(
				r#"
				INSERT INTO commit_records (repo_id, author_email, commit_count, processed, created_at)
				VALUES (?, ?, ?, 0, ?)
				"#,
			)
			.bind(repo_id.to_string())
			.bind(&count.email)
			.bind(count.commits)
			.bind(&now)
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(repo_id = %repo_id))]
	async fn get(&self, repo_id: Uuid, author_email: &str) -> Result<Option<CommitRecord>> {
		let row = sqlx::query(
			r#"
			SELECT repo_id, author_email, commit_count, processed, created_at
			FROM commit_records
			WHERE repo_id = ? AND author_email = ?
			"#,
		)
		.bind(repo_id.to_string())
		.bind(author_email)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_commit(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(repo_id = %repo_id))]
	async fn list_unprocessed(&self, repo_id: Uuid) -> Result<Vec<CommitRecord>> {
		let rows = sqlx::query(
			r#"
			SELECT repo_id, author_email, commit_count, processed, created_at
			FROM commit_records
			WHERE repo_id = ? AND processed = 0
			ORDER BY author_email ASC
			"#,
		)
		.bind(repo_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_commit).collect()
	}

	#[tracing::instrument(skip(self), fields(repo_id = %repo_id))]
	async fn unprocessed_count(&self, repo_id: Uuid) -> Result<i64> {
		let row =
			sqlx::query("SELECT COUNT(*) AS count FROM commit_records WHERE repo_id = ? AND processed = 0")
				.bind(repo_id.to_string())
				.fetch_one(&self.pool)
				.await?;

		Ok(row.get("count"))
	}

	#[tracing::instrument(skip(self), fields(repo_id = %repo_id, contributor_id = %contributor_id))]
	async fn apply_resolution(
		&self,
		repo_id: Uuid,
		author_email: &str,
		contributor_id: Uuid,
		commit_count: i64,
	) -> Result<bool> {
		let mut tx = self.pool.begin().await?;

		let claimed = sqlx::query(
			r#"
			UPDATE commit_records
			SET processed = 1
			WHERE repo_id = ? AND author_email = ? AND processed = 0
			"#,
		)
		.bind(repo_id.to_string())
		.bind(author_email)
		.execute(&mut *tx)
		.await?;

		if claimed.rows_affected() == 0 {
			return Ok(false);
		}

		sqlx::query(
			r#"
			INSERT INTO repository_contributors (repo_id, contributor_id, commit_count)
			VALUES (?, ?, ?)
			ON CONFLICT(repo_id, contributor_id) DO UPDATE SET
				commit_count = commit_count + excluded.commit_count
			"#,
		)
		.bind(repo_id.to_string())
		.bind(contributor_id.to_string())
		.bind(commit_count)
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;
		Ok(true)
	}
}

fn row_to_commit(row: &sqlx::sqlite::SqliteRow) -> Result<CommitRecord> {
	let repo_id_str: String = row.get("repo_id");
	let created_at_str: String = row.get("created_at");
	let processed: i64 = row.get("processed");

	Ok(CommitRecord {
		repo_id: Uuid::parse_str(&repo_id_str).map_err(|e| DbError::Internal(e.to_string()))?,
		author_email: row.get("author_email"),
		commit_count: row.get("commit_count"),
		processed: processed != 0,
		created_at: DateTime::parse_from_rfc3339(&created_at_str)
			.map(|d| d.with_timezone(&Utc))
			.map_err(|e| DbError::Internal(e.to_string()))?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::repo::{RepoRecord, RepoStore, SqliteRepoStore};
	use crate::testing::create_migrated_test_pool;

	async fn seed_repo(pool: &SqlitePool) -> Uuid {
		let store = SqliteRepoStore::new(pool.clone());
		let repo = RepoRecord::new(
			"https://github.com/acme/widgets".to_string(),
			"github.com/acme/widgets".to_string(),
		);
		store.create(&repo).await.unwrap();
		repo.id
	}

	fn counts(pairs: &[(&str, i64)]) -> Vec<AuthorCount> {
		pairs
			.iter()
			.map(|(email, commits)| AuthorCount {
				email: email.to_string(),
				commits: *commits,
			})
			.collect()
	}

	#[tokio::test]
	async fn replace_inserts_unprocessed_rows() {
		let pool = create_migrated_test_pool().await;
		let repo_id = seed_repo(&pool).await;
		let store = SqliteCommitStore::new(pool);

		store
			.replace_for_repo(repo_id, &counts(&[("a@example.com", 5), ("b@example.com", 2)]))
			.await
			.unwrap();

		let unprocessed = store.list_unprocessed(repo_id).await.unwrap();
		assert_eq!(unprocessed.len(), 2);
		assert_eq!(unprocessed[0].author_email, "a@example.com");
		assert_eq!(unprocessed[0].commit_count, 5);
		assert!(!unprocessed[0].processed);
		assert_eq!(store.unprocessed_count(repo_id).await.unwrap(), 2);
	}

	#[tokio::test]
	async fn replace_overwrites_prior_extraction() {
		let pool = create_migrated_test_pool().await;
		let repo_id = seed_repo(&pool).await;
		let store = SqliteCommitStore::new(pool.clone());

		store
			.replace_for_repo(repo_id, &counts(&[("a@example.com", 5), ("gone@example.com", 1)]))
			.await
			.unwrap();

		let contributor_id = Uuid::new_v4();
		sqlx::query("INSERT INTO contributors (id, email, updated_at) VALUES (?, ?, ?)")
			.bind(contributor_id.to_string())
			.bind("a@example.com")
			.bind(Utc::now().to_rfc3339())
			.execute(&pool)
			.await
			.unwrap();
		store
			.apply_resolution(repo_id, "a@example.com", contributor_id, 5)
			.await
			.unwrap();

		// Second extraction: counts changed, one email left the history.
		store
			.replace_for_repo(repo_id, &counts(&[("a@example.com", 9)]))
			.await
			.unwrap();

		let record = store.get(repo_id, "a@example.com").await.unwrap().unwrap();
		assert_eq!(record.commit_count, 9);
		assert!(!record.processed);
		assert!(store.get(repo_id, "gone@example.com").await.unwrap().is_none());

		// Join rows were cleared alongside the records.
		let joins: i64 =
			sqlx::query("SELECT COUNT(*) AS count FROM repository_contributors WHERE repo_id = ?")
				.bind(repo_id.to_string())
				.fetch_one(&pool)
				.await
				.unwrap()
				.get("count");
		assert_eq!(joins, 0);
	}

	#[tokio::test]
	async fn apply_resolution_is_exactly_once() {
		let pool = create_migrated_test_pool().await;
		let repo_id = seed_repo(&pool).await;
		let store = SqliteCommitStore::new(pool.clone());

		store
			.replace_for_repo(repo_id, &counts(&[("a@example.com", 5)]))
			.await
			.unwrap();

		let contributor_id = Uuid::new_v4();
		sqlx::query("INSERT INTO contributors (id, email, updated_at) VALUES (?, ?, ?)")
			.bind(contributor_id.to_string())
			.bind("a@example.com")
			.bind(Utc::now().to_rfc3339())
			.execute(&pool)
			.await
			.unwrap();

		assert!(store
			.apply_resolution(repo_id, "a@example.com", contributor_id, 5)
			.await
			.unwrap());
		// Redelivery: the processed guard loses, nothing is credited.
		assert!(!store
			.apply_resolution(repo_id, "a@example.com", contributor_id, 5)
			.await
			.unwrap());

		let credited: i64 = sqlx::query(
			"SELECT commit_count FROM repository_contributors WHERE repo_id = ? AND contributor_id = ?",
		)
		.bind(repo_id.to_string())
		.bind(contributor_id.to_string())
		.fetch_one(&pool)
		.await
		.unwrap()
		.get("commit_count");
		assert_eq!(credited, 5);
	}

	#[tokio::test]
	async fn apply_resolution_merges_emails_of_one_contributor() {
		let pool = create_migrated_test_pool().await;
		let repo_id = seed_repo(&pool).await;
		let store = SqliteCommitStore::new(pool.clone());

		store
			.replace_for_repo(
				repo_id,
				&counts(&[("work@example.com", 5), ("home@example.com", 3)]),
			)
			.await
			.unwrap();

		let contributor_id = Uuid::new_v4();
		sqlx::query("INSERT INTO contributors (id, username, updated_at) VALUES (?, ?, ?)")
			.bind(contributor_id.to_string())
			.bind("carol")
			.bind(Utc::now().to_rfc3339())
			.execute(&pool)
			.await
			.unwrap();

		store
			.apply_resolution(repo_id, "work@example.com", contributor_id, 5)
			.await
			.unwrap();
		store
			.apply_resolution(repo_id, "home@example.com", contributor_id, 3)
			.await
			.unwrap();

		let credited: i64 = sqlx::query(
			"SELECT commit_count FROM repository_contributors WHERE repo_id = ? AND contributor_id = ?",
		)
		.bind(repo_id.to_string())
		.bind(contributor_id.to_string())
		.fetch_one(&pool)
		.await
		.unwrap()
		.get("commit_count");
		assert_eq!(credited, 8);
		assert_eq!(store.unprocessed_count(repo_id).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn apply_resolution_unknown_email_is_noop() {
		let pool = create_migrated_test_pool().await;
		let repo_id = seed_repo(&pool).await;
		let store = SqliteCommitStore::new(pool);

		assert!(!store
			.apply_resolution(repo_id, "ghost@example.com", Uuid::new_v4(), 1)
			.await
			.unwrap());
	}
}
