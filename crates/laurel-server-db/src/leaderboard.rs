// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ranked contributor view of one repository.
//!
//! Resolved contributors come from the join table; author emails whose
//! resolution never happened surface as email-only entries so the
//! ranking always accounts for every extracted commit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
	pub username: Option<String>,
	pub email: Option<String>,
	pub profile_url: Option<String>,
	pub commit_count: i64,
}

impl LeaderboardEntry {
	/// Handle shown for the entry: username when resolved, else email.
	pub fn display_handle(&self) -> &str {
		self
			.username
			.as_deref()
			.or(self.email.as_deref())
			.unwrap_or("unknown")
	}
}

#[async_trait]
pub trait LeaderboardStore: Send + Sync {
	/// Entries sorted strictly by commit count descending. Ties order
	/// by display handle so repeated reads return identical rankings.
	async fn leaderboard(&self, repo_id: Uuid) -> Result<Vec<LeaderboardEntry>>;
}

#[derive(Clone)]
pub struct SqliteLeaderboardStore {
	pool: SqlitePool,
}

impl SqliteLeaderboardStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl LeaderboardStore for SqliteLeaderboardStore {
	#[tracing::instrument(skip(self), fields(repo_id = %repo_id))]
	async fn leaderboard(&self, repo_id: Uuid) -> Result<Vec<LeaderboardEntry>> {
		let resolved = sqlx::query(
			r#"
			SELECT c.username, c.email, c.profile_url, rc.commit_count
			FROM repository_contributors rc
			JOIN contributors c ON c.id = rc.contributor_id
			WHERE rc.repo_id = ?
			"#,
		)
		.bind(repo_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		let unresolved = sqlx::query(
			r#"
			SELECT author_email, commit_count
			FROM commit_records
			WHERE repo_id = ? AND processed = 0
			"#,
		)
		.bind(repo_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(resolved.len() + unresolved.len());

		for row in &resolved {
			entries.push(LeaderboardEntry {
				username: row.get("username"),
				email: row.get("email"),
				profile_url: row.get("profile_url"),
				commit_count: row.get("commit_count"),
			});
		}

		for row in &unresolved {
			entries.push(LeaderboardEntry {
				username: None,
				email: Some(row.get("author_email")),
				profile_url: None,
				commit_count: row.get("commit_count"),
			});
		}

		entries.sort_by(|a, b| {
			b.commit_count
				.cmp(&a.commit_count)
				.then_with(|| a.display_handle().cmp(b.display_handle()))
		});

		Ok(entries)
	}
}
