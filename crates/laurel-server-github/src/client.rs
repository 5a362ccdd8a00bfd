// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitHub REST client for identity search and repository metadata.

use std::time::Duration;

use laurel_server_config::{GithubConfig, SecretString};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::{GithubError, Result};
use crate::noreply;
use crate::rate_limit::{Quota, RateLimitGovernor};

const API_VERSION: &str = "2022-11-28";

/// Identity returned by the user search API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
	pub login: String,
	pub profile_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchUsersResponse {
	total_count: i64,
	items: Vec<SearchUserItem>,
}

#[derive(Debug, Deserialize)]
struct SearchUserItem {
	login: String,
	html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
	/// Size in kilobytes, as reported by the API.
	size: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
	message: Option<String>,
}

/// Client for the GitHub REST API.
///
/// Every response's `x-ratelimit-*` headers feed the owned
/// [`RateLimitGovernor`]; callers gate external calls through
/// [`GithubClient::wait_for_quota`].
pub struct GithubClient {
	api_base: String,
	token: Option<SecretString>,
	http: reqwest::Client,
	governor: RateLimitGovernor,
}

impl GithubClient {
	/// Create a client from the resolved configuration section.
	pub fn new(config: &GithubConfig) -> Self {
		let http = laurel_common_http::new_client_with_timeout(Duration::from_secs(
			config.timeout_secs,
		));

		Self {
			api_base: config.api_base.trim_end_matches('/').to_string(),
			token: config.token.clone(),
			http,
			governor: RateLimitGovernor::new(
				config.low_water,
				Duration::from_secs(config.reset_buffer_secs),
			),
		}
	}

	/// Whether an API token is configured.
	pub fn has_token(&self) -> bool {
		self.token.is_some()
	}

	/// Sleep through the reset window when remaining quota is low.
	pub async fn wait_for_quota(&self, cancel: &CancellationToken) -> Result<()> {
		self.governor.wait_if_low(cancel).await
	}

	/// Current learned quota, if any.
	pub async fn quota(&self) -> Option<Quota> {
		self.governor.snapshot().await
	}

	/// Search for a user by commit email.
	///
	/// Returns `Ok(None)` when the search finds no match; a rate-limit
	/// response surfaces as [`GithubError::RateLimited`].
	#[tracing::instrument(skip(self), name = "GithubClient::search_user_by_email")]
	pub async fn search_user_by_email(&self, email: &str) -> Result<Option<ResolvedUser>> {
		tracing::debug!("searching GitHub user by email");

		let url = format!("{}/search/users", self.api_base);
		let response = self
			.request(&url)
			.query(&[("q", format!("{email} in:email"))])
			.send()
			.await?;
		let response = self.track_and_check(response).await?;

		let body: SearchUsersResponse = response
			.json()
			.await
			.map_err(|e| GithubError::Parse(format!("user search response: {e}")))?;

		if body.total_count == 0 {
			return Ok(None);
		}

		Ok(body.items.into_iter().next().map(|item| ResolvedUser {
			profile_url: item
				.html_url
				.unwrap_or_else(|| noreply::profile_url(&item.login)),
			login: item.login,
		}))
	}

	/// Remote-reported repository size in kilobytes.
	///
	/// Returns `Ok(None)` when the repository does not exist or is not
	/// visible with the current credentials.
	#[tracing::instrument(skip(self), name = "GithubClient::repo_size_kb")]
	pub async fn repo_size_kb(&self, owner: &str, name: &str) -> Result<Option<u64>> {
		tracing::debug!("fetching repository metadata");

		let url = format!("{}/repos/{owner}/{name}", self.api_base);
		let response = self.request(&url).send().await?;

		if response.status() == StatusCode::NOT_FOUND {
			return Ok(None);
		}
		let response = self.track_and_check(response).await?;

		let body: RepoResponse = response
			.json()
			.await
			.map_err(|e| GithubError::Parse(format!("repository response: {e}")))?;

		Ok(Some(body.size))
	}

	fn request(&self, url: &str) -> reqwest::RequestBuilder {
		let mut builder = self
			.http
			.get(url)
			.header("Accept", "application/vnd.github+json")
			.header("X-GitHub-Api-Version", API_VERSION);

		if let Some(token) = &self.token {
			builder = builder.header("Authorization", format!("Bearer {}", token.expose()));
		}

		builder
	}

	/// Record quota headers and map rate-limit responses to the
	/// distinguishable error before callers inspect the body.
	async fn track_and_check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
		if let Some(quota) = quota_from_headers(response.headers()) {
			self.governor.record(quota).await;
		}

		let status = response.status();
		if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
			let remaining = header_u64(response.headers(), "x-ratelimit-remaining");
			let reset_epoch = header_u64(response.headers(), "x-ratelimit-reset");
			let message = error_message(response).await;

			if remaining == Some(0) || message.to_lowercase().contains("rate limit") {
				return Err(GithubError::RateLimited { reset_epoch });
			}
			return Err(GithubError::Api {
				status: status.as_u16(),
				message,
			});
		}

		if !status.is_success() {
			let message = error_message(response).await;
			return Err(GithubError::Api {
				status: status.as_u16(),
				message,
			});
		}

		Ok(response)
	}
}

async fn error_message(response: reqwest::Response) -> String {
	let body = response.text().await.unwrap_or_default();
	match serde_json::from_str::<ApiErrorBody>(&body) {
		Ok(parsed) => parsed.message.unwrap_or(body),
		Err(_) => body,
	}
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
	headers
		.get(name)?
		.to_str()
		.ok()
		.and_then(|v| v.parse().ok())
}

fn quota_from_headers(headers: &HeaderMap) -> Option<Quota> {
	let remaining = header_u64(headers, "x-ratelimit-remaining")?;
	let reset_epoch = header_u64(headers, "x-ratelimit-reset")?;
	let limit = header_u64(headers, "x-ratelimit-limit").unwrap_or(0);

	Some(Quota {
		remaining,
		reset_epoch,
		limit,
	})
}
