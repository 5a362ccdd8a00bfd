// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Remote URL canonicalization.
//!
//! Every repository row keys on the normalized URL, so two spellings of
//! the same remote must collapse to one string before they reach the
//! database.

use crate::error::{PipelineError, Result};

/// Canonical form of a remote URL.
///
/// Scp-like (`git@host:owner/repo`) and `ssh://` remotes are rewritten
/// to their `https://` equivalent. `file://` URLs pass through
/// untouched since local paths are case sensitive.
pub fn normalize_remote_url(raw: &str) -> Result<String> {
	let trimmed = raw.trim();
	if trimmed.is_empty() {
		return Err(PipelineError::InvalidUrl("empty URL".to_string()));
	}

	if trimmed.starts_with("file://") {
		return Ok(trimmed.to_string());
	}

	let lowered = trimmed.to_ascii_lowercase();

	let https = if let Some(rest) = lowered.strip_prefix("git@") {
		match rest.split_once(':') {
			Some((host, path)) if !host.is_empty() && !path.is_empty() => {
				format!("https://{}/{}", host, path)
			}
			_ => return Err(PipelineError::InvalidUrl(trimmed.to_string())),
		}
	} else if let Some(rest) = lowered
		.strip_prefix("ssh://git@")
		.or_else(|| lowered.strip_prefix("ssh://"))
	{
		if rest.is_empty() {
			return Err(PipelineError::InvalidUrl(trimmed.to_string()));
		}
		format!("https://{}", rest)
	} else if lowered.starts_with("https://") || lowered.starts_with("http://") {
		lowered
	} else {
		return Err(PipelineError::InvalidUrl(trimmed.to_string()));
	};

	let stripped = https.trim_end_matches('/');
	let stripped = stripped.strip_suffix(".git").unwrap_or(stripped);
	if stripped == "https://" || stripped == "http://" {
		return Err(PipelineError::InvalidUrl(trimmed.to_string()));
	}
	Ok(stripped.to_string())
}

/// Relative storage key derived from a normalized URL.
///
/// The scheme is dropped and no leading slash survives, so joining the
/// key onto a storage root can never escape it.
pub fn storage_key_for(normalized_url: &str) -> String {
	let without_scheme = normalized_url
		.split_once("://")
		.map(|(_, rest)| rest)
		.unwrap_or(normalized_url);
	without_scheme.trim_start_matches('/').to_string()
}

/// Owner and repository name for github.com remotes, `None` otherwise.
pub fn parse_github_remote(normalized_url: &str) -> Option<(String, String)> {
	let rest = normalized_url.strip_prefix("https://github.com/")?;
	let mut segments = rest.split('/');
	let owner = segments.next()?;
	let name = segments.next()?;
	if owner.is_empty() || name.is_empty() || segments.next().is_some() {
		return None;
	}
	Some((owner.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn test_normalize_strips_suffix_and_slash() {
		assert_eq!(
			normalize_remote_url("https://github.com/Octo/Hello.git/").unwrap(),
			"https://github.com/octo/hello"
		);
	}

	#[test]
	fn test_normalize_rewrites_scp_like() {
		assert_eq!(
			normalize_remote_url("git@github.com:octo/hello.git").unwrap(),
			"https://github.com/octo/hello"
		);
	}

	#[test]
	fn test_normalize_rewrites_ssh_scheme() {
		assert_eq!(
			normalize_remote_url("ssh://git@github.com/octo/hello").unwrap(),
			"https://github.com/octo/hello"
		);
	}

	#[test]
	fn test_normalize_trims_whitespace() {
		assert_eq!(
			normalize_remote_url("  https://github.com/octo/hello  ").unwrap(),
			"https://github.com/octo/hello"
		);
	}

	#[test]
	fn test_normalize_preserves_file_urls() {
		assert_eq!(
			normalize_remote_url("file:///Tmp/Source.git").unwrap(),
			"file:///Tmp/Source.git"
		);
	}

	#[test]
	fn test_normalize_rejects_garbage() {
		assert!(normalize_remote_url("").is_err());
		assert!(normalize_remote_url("   ").is_err());
		assert!(normalize_remote_url("not a url").is_err());
		assert!(normalize_remote_url("git@nohost").is_err());
	}

	#[test]
	fn test_storage_key_has_no_leading_slash() {
		let key = storage_key_for("https://github.com/octo/hello");
		assert_eq!(key, "github.com/octo/hello");
		assert!(!key.starts_with('/'));
	}

	#[test]
	fn test_parse_github_remote() {
		assert_eq!(
			parse_github_remote("https://github.com/octo/hello"),
			Some(("octo".to_string(), "hello".to_string()))
		);
		assert_eq!(parse_github_remote("https://gitlab.com/octo/hello"), None);
		assert_eq!(parse_github_remote("https://github.com/octo"), None);
		assert_eq!(parse_github_remote("https://github.com/octo/hello/extra"), None);
	}

	proptest! {
		#[test]
		fn normalize_is_idempotent(owner in "[a-z][a-z0-9-]{0,12}", name in "[a-z][a-z0-9_.-]{0,12}") {
			let raw = format!("https://github.com/{}/{}", owner, name);
			if let Ok(once) = normalize_remote_url(&raw) {
				let twice = normalize_remote_url(&once).unwrap();
				prop_assert_eq!(once, twice);
			}
		}

		#[test]
		fn equivalent_spellings_collapse(owner in "[a-z][a-z0-9-]{0,12}", name in "[a-z][a-z0-9-]{0,12}") {
			let https = normalize_remote_url(&format!("https://github.com/{}/{}.git", owner, name)).unwrap();
			let scp = normalize_remote_url(&format!("git@github.com:{}/{}.git", owner, name)).unwrap();
			let ssh = normalize_remote_url(&format!("ssh://git@github.com/{}/{}", owner, name)).unwrap();
			prop_assert_eq!(&https, &scp);
			prop_assert_eq!(&https, &ssh);
		}
	}
}
