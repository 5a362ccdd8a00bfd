// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Synthetic no-reply address handling.
//!
//! GitHub issues privacy-preserving commit emails of the form
//! `{id}+{login}@users.noreply.github.com` (current) or
//! `{login}@users.noreply.github.com` (legacy). Both encode the login
//! directly, so they resolve without any API call.

const NOREPLY_DOMAIN: &str = "users.noreply.github.com";

/// Extract the login encoded in a no-reply commit email.
///
/// Returns `None` for addresses on any other domain or with an empty
/// login part. The numeric id prefix, when present, is discarded.
pub fn parse_noreply_login(email: &str) -> Option<String> {
	let (local, domain) = email.split_once('@')?;
	if !domain.eq_ignore_ascii_case(NOREPLY_DOMAIN) {
		return None;
	}

	let login = match local.split_once('+') {
		Some((_, login)) => login,
		None => local,
	};

	if login.is_empty() {
		None
	} else {
		Some(login.to_string())
	}
}

/// Canonical profile URL for a login.
pub fn profile_url(login: &str) -> String {
	format!("https://github.com/{login}")
}
