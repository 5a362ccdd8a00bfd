// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Contributor directory.
//!
//! Contributors are keyed by platform username when one is known;
//! emails are ambiguous and carry no uniqueness constraint. A record's
//! `updated_at` is the freshness signal the resolver checks before
//! deciding whether to hit the search API again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{DbError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
	pub id: Uuid,
	pub username: Option<String>,
	pub email: Option<String>,
	pub profile_url: Option<String>,
	pub updated_at: DateTime<Utc>,
}

impl Contributor {
	/// Whether the record was refreshed within `ttl` of `now`.
	pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
		now.signed_duration_since(self.updated_at) < ttl
	}
}

#[async_trait]
pub trait ContributorStore: Send + Sync {
	async fn find_by_username(&self, username: &str) -> Result<Option<Contributor>>;

	/// Any contributor carrying this email, resolved records first.
	async fn find_by_email(&self, email: &str) -> Result<Option<Contributor>>;

	/// Insert or refresh a resolved contributor, keyed by username.
	///
	/// An existing record keeps its email when `email` is `None`;
	/// `updated_at` always moves forward.
	async fn upsert_resolved(
		&self,
		username: &str,
		email: Option<&str>,
		profile_url: &str,
	) -> Result<Contributor>;

	/// Record an identity known only by email. Reuses any existing
	/// record with that email rather than inserting a duplicate.
	async fn upsert_email_only(&self, email: &str) -> Result<Contributor>;
}

#[derive(Clone)]
pub struct SqliteContributorStore {
	pool: SqlitePool,
}

impl SqliteContributorStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl ContributorStore for SqliteContributorStore {
	#[tracing::instrument(skip(self))]
	async fn find_by_username(&self, username: &str) -> Result<Option<Contributor>> {
		let row = sqlx::query(
			"SELECT id, username, email, profile_url, updated_at FROM contributors WHERE username = ?",
		)
		.bind(username)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_contributor(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn find_by_email(&self, email: &str) -> Result<Option<Contributor>> {
		let row = sqlx::query(
			r#"
			SELECT id, username, email, profile_url, updated_at
			FROM contributors
			WHERE email = ?
			ORDER BY (username IS NULL) ASC, updated_at DESC
			LIMIT 1
			"#,
		)
		.bind(email)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_contributor(&r)).transpose()
	}

	#[tracing::instrument(skip(self, email, profile_url))]
	async fn upsert_resolved(
		&self,
		username: &str,
		email: Option<&str>,
		profile_url: &str,
	) -> Result<Contributor> {
		let now = Utc::now().to_rfc3339();
		sqlx::query(
			r#"
			INSERT INTO contributors (id, username, email, profile_url, updated_at)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT(username) DO UPDATE SET
				email = COALESCE(excluded.email, contributors.email),
				profile_url = excluded.profile_url,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(username)
		.bind(email)
		.bind(profile_url)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		self
			.find_by_username(username)
			.await?
			.ok_or_else(|| DbError::Internal(format!("contributor vanished after upsert: {username}")))
	}

	#[tracing::instrument(skip(self, email))]
	async fn upsert_email_only(&self, email: &str) -> Result<Contributor> {
		if let Some(existing) = self.find_by_email(email).await? {
			return Ok(existing);
		}

		let contributor = Contributor {
			id: Uuid::new_v4(),
			username: None,
			email: Some(email.to_string()),
			profile_url: None,
			updated_at: Utc::now(),
		};

		sqlx::query("INSERT INTO contributors (id, email, updated_at) VALUES (?, ?, ?)")
			.bind(contributor.id.to_string())
			.bind(email)
			.bind(contributor.updated_at.to_rfc3339())
			.execute(&self.pool)
			.await?;

		Ok(contributor)
	}
}

fn row_to_contributor(row: &sqlx::sqlite::SqliteRow) -> Result<Contributor> {
	let id_str: String = row.get("id");
	let updated_at_str: String = row.get("updated_at");

	Ok(Contributor {
		id: Uuid::parse_str(&id_str).map_err(|e| DbError::Internal(e.to_string()))?,
		username: row.get("username"),
		email: row.get("email"),
		profile_url: row.get("profile_url"),
		updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
			.map(|d| d.with_timezone(&Utc))
			.map_err(|e| DbError::Internal(e.to_string()))?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_migrated_test_pool;

	#[tokio::test]
	async fn upsert_resolved_inserts_then_refreshes() {
		let pool = create_migrated_test_pool().await;
		let store = SqliteContributorStore::new(pool);

		let first = store
			.upsert_resolved("carol", Some("carol@example.com"), "https://github.com/carol")
			.await
			.unwrap();
		assert_eq!(first.username.as_deref(), Some("carol"));
		assert_eq!(first.email.as_deref(), Some("carol@example.com"));

		// Refresh without an email keeps the stored one.
		let second = store
			.upsert_resolved("carol", None, "https://github.com/carol")
			.await
			.unwrap();
		assert_eq!(second.id, first.id);
		assert_eq!(second.email.as_deref(), Some("carol@example.com"));
		assert!(second.updated_at >= first.updated_at);
	}

	#[tokio::test]
	async fn upsert_email_only_reuses_existing_row() {
		let pool = create_migrated_test_pool().await;
		let store = SqliteContributorStore::new(pool);

		let first = store.upsert_email_only("dev@example.com").await.unwrap();
		let second = store.upsert_email_only("dev@example.com").await.unwrap();
		assert_eq!(first.id, second.id);
		assert!(first.username.is_none());
	}

	#[tokio::test]
	async fn find_by_email_prefers_resolved_records() {
		let pool = create_migrated_test_pool().await;
		let store = SqliteContributorStore::new(pool);

		store.upsert_email_only("shared@example.com").await.unwrap();
		let resolved = store
			.upsert_resolved("dana", Some("shared@example.com"), "https://github.com/dana")
			.await
			.unwrap();

		let found = store.find_by_email("shared@example.com").await.unwrap().unwrap();
		assert_eq!(found.id, resolved.id);
		assert_eq!(found.username.as_deref(), Some("dana"));
	}

	#[tokio::test]
	async fn freshness_window() {
		let contributor = Contributor {
			id: Uuid::new_v4(),
			username: Some("carol".to_string()),
			email: None,
			profile_url: None,
			updated_at: Utc::now() - chrono::Duration::hours(25),
		};
		assert!(!contributor.is_fresh(Utc::now(), chrono::Duration::hours(24)));
		assert!(contributor.is_fresh(Utc::now(), chrono::Duration::hours(48)));
	}

	#[tokio::test]
	async fn find_by_username_misses_cleanly() {
		let pool = create_migrated_test_pool().await;
		let store = SqliteContributorStore::new(pool);
		assert!(store.find_by_username("nobody").await.unwrap().is_none());
	}
}
