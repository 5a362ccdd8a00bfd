// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitHub API configuration section.
//!
//! The token is never read from TOML; it comes from the environment
//! (`LAUREL_WORKER_GITHUB_TOKEN` / `_FILE`) and is injected at finalize
//! time so config dumps cannot leak it.

use serde::{Deserialize, Serialize};

use crate::secret::SecretString;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GithubConfigLayer {
	pub api_base: Option<String>,
	pub timeout_secs: Option<u64>,
	pub low_water: Option<u64>,
	pub reset_buffer_secs: Option<u64>,
	pub directory_ttl_hours: Option<u64>,
}

impl GithubConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.api_base.is_some() {
			self.api_base = other.api_base;
		}
		if other.timeout_secs.is_some() {
			self.timeout_secs = other.timeout_secs;
		}
		if other.low_water.is_some() {
			self.low_water = other.low_water;
		}
		if other.reset_buffer_secs.is_some() {
			self.reset_buffer_secs = other.reset_buffer_secs;
		}
		if other.directory_ttl_hours.is_some() {
			self.directory_ttl_hours = other.directory_ttl_hours;
		}
	}

	pub fn finalize(self, token: Option<SecretString>) -> GithubConfig {
		GithubConfig {
			api_base: self
				.api_base
				.unwrap_or_else(|| "https://api.github.com".to_string()),
			token,
			timeout_secs: self.timeout_secs.unwrap_or(30),
			low_water: self.low_water.unwrap_or(3),
			reset_buffer_secs: self.reset_buffer_secs.unwrap_or(2),
			directory_ttl_hours: self.directory_ttl_hours.unwrap_or(24),
		}
	}
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
	pub api_base: String,
	pub token: Option<SecretString>,
	pub timeout_secs: u64,
	/// Remaining-call threshold below which the governor sleeps until
	/// the reported reset.
	pub low_water: u64,
	/// Safety margin added past the reset instant before resuming.
	pub reset_buffer_secs: u64,
	/// How long a contributor directory entry counts as fresh.
	pub directory_ttl_hours: u64,
}

impl Default for GithubConfig {
	fn default() -> Self {
		GithubConfigLayer::default().finalize(None)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = GithubConfig::default();
		assert_eq!(config.api_base, "https://api.github.com");
		assert!(config.token.is_none());
		assert_eq!(config.timeout_secs, 30);
		assert_eq!(config.low_water, 3);
		assert_eq!(config.reset_buffer_secs, 2);
		assert_eq!(config.directory_ttl_hours, 24);
	}

	#[test]
	fn test_finalize_injects_token() {
		let layer = GithubConfigLayer::default();
		let config = layer.finalize(Some(SecretString::new("ghp_x")));
		assert_eq!(config.token.unwrap().expose(), "ghp_x");
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = GithubConfigLayer {
			low_water: Some(3),
			..Default::default()
		};
		base.merge(GithubConfigLayer {
			low_water: Some(10),
			timeout_secs: Some(5),
			..Default::default()
		});
		assert_eq!(base.low_water, Some(10));
		assert_eq!(base.timeout_secs, Some(5));
	}
}
