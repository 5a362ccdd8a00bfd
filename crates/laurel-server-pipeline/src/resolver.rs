// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Author email to contributor identity resolution.
//!
//! Resolution is layered by cost. A no-reply email encodes the login
//! directly and never touches the network. The contributor directory
//! answers for any email resolved recently. Only emails that fall
//! through both layers spend search API quota.

use async_trait::async_trait;
use chrono::Utc;
use laurel_server_db::{Contributor, ContributorStore};
use laurel_server_github::{parse_noreply_login, profile_url, GithubClient, ResolvedUser};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::Result;

/// The slice of the GitHub client the resolver needs. Stages take this
/// as a trait object so tests can script responses.
#[async_trait]
pub trait IdentityApi: Send + Sync {
	fn has_token(&self) -> bool;
	async fn wait_for_quota(&self, cancel: &CancellationToken) -> laurel_server_github::Result<()>;
	async fn search_user_by_email(
		&self,
		email: &str,
	) -> laurel_server_github::Result<Option<ResolvedUser>>;
	async fn repo_size_kb(&self, owner: &str, name: &str)
		-> laurel_server_github::Result<Option<u64>>;
}

#[async_trait]
impl IdentityApi for GithubClient {
	fn has_token(&self) -> bool {
		GithubClient::has_token(self)
	}

	async fn wait_for_quota(&self, cancel: &CancellationToken) -> laurel_server_github::Result<()> {
		GithubClient::wait_for_quota(self, cancel).await
	}

	async fn search_user_by_email(
		&self,
		email: &str,
	) -> laurel_server_github::Result<Option<ResolvedUser>> {
		GithubClient::search_user_by_email(self, email).await
	}

	async fn repo_size_kb(
		&self,
		owner: &str,
		name: &str,
	) -> laurel_server_github::Result<Option<u64>> {
		GithubClient::repo_size_kb(self, owner, name).await
	}
}

/// Resolve one author email to a contributor record.
///
/// Returns the rate-limit error unchanged when the search API reports
/// exhaustion, so the caller can stop the batch without marking the
/// email processed. Any other search failure degrades to an email-only
/// contributor rather than wedging the batch.
#[instrument(skip(api, contributors, cancel), fields(email = %email))]
pub async fn resolve_email(
	api: &dyn IdentityApi,
	contributors: &impl ContributorStore,
	email: &str,
	directory_ttl: chrono::Duration,
	cancel: &CancellationToken,
) -> Result<Contributor> {
	if let Some(login) = parse_noreply_login(email) {
		let contributor = contributors
			.upsert_resolved(&login, Some(email), &profile_url(&login))
			.await?;
		debug!(login = %login, "Resolved from no-reply email");
		return Ok(contributor);
	}

	if let Some(found) = contributors.find_by_email(email).await? {
		if found.is_fresh(Utc::now(), directory_ttl) {
			debug!("Resolved from directory");
			return Ok(found);
		}
		if !api.has_token() {
			// Stale is still better than an unauthenticated search.
			return Ok(found);
		}
	} else if !api.has_token() {
		return Ok(contributors.upsert_email_only(email).await?);
	}

	api.wait_for_quota(cancel).await?;
	match api.search_user_by_email(email).await {
		Ok(Some(ResolvedUser { login, profile_url })) => {
			let contributor = contributors
				.upsert_resolved(&login, Some(email), &profile_url)
				.await?;
			debug!(login = %login, "Resolved via search API");
			Ok(contributor)
		}
		Ok(None) => {
			debug!("No account matched, recording email only");
			Ok(contributors.upsert_email_only(email).await?)
		}
		Err(err) if err.is_rate_limited() => Err(err.into()),
		Err(laurel_server_github::GithubError::Cancelled) => {
			Err(laurel_server_github::GithubError::Cancelled.into())
		}
		Err(err) => {
			warn!(error = %err, "Search failed, recording email only");
			Ok(contributors.upsert_email_only(email).await?)
		}
	}
}
