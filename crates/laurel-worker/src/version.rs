// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Build information and version utilities for laurel-worker.

use laurel_common_version::BuildInfo;

/// Format version info for display.
pub fn format_version_info() -> String {
	use chrono::{DateTime, Utc};

	let info = BuildInfo::current();

	let mut output = format!(
		"laurel-worker version: {}\n\
		Git SHA:               {}\n\
		Built at:              {}\n\
		Platform:              {}",
		info.version, info.git_sha, info.build_timestamp, info.platform,
	);

	// Try to parse build time and calculate age
	if let Ok(built_at) = DateTime::parse_from_rfc3339(info.build_timestamp)
		.or_else(|_| DateTime::parse_from_str(info.build_timestamp, "%Y-%m-%d %H:%M:%S"))
	{
		let built_at_utc: DateTime<Utc> = built_at.into();
		let now = Utc::now();
		let age = now.signed_duration_since(built_at_utc);

		if let Ok(std_duration) = age.to_std() {
			output.push_str(&format!(
				"\nBuild age:             {} ({} seconds)",
				humantime::format_duration(std_duration),
				std_duration.as_secs()
			));
		}
	}

	output
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn version_info_names_the_binary() {
		let info = format_version_info();
		assert!(info.starts_with("laurel-worker version:"));
		assert!(info.contains("Platform:"));
	}
}
