// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Preemptive rate-limit governance for the GitHub API.
//!
//! The governor learns the remaining quota from `x-ratelimit-*`
//! response headers and throttles callers before they hit the wall,
//! instead of reacting to 403s after the fact.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{GithubError, Result};

/// Quota state learned from the most recent API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
	pub remaining: u64,
	pub reset_epoch: u64,
	pub limit: u64,
}

/// Tracks remaining quota and sleeps callers through the reset window.
///
/// Owned by the API client rather than stored globally, so tests can
/// construct independent instances and multiple credentials never
/// share state.
pub struct RateLimitGovernor {
	quota: Mutex<Option<Quota>>,
	low_water: u64,
	reset_buffer: Duration,
}

impl RateLimitGovernor {
	pub fn new(low_water: u64, reset_buffer: Duration) -> Self {
		Self {
			quota: Mutex::new(None),
			low_water,
			reset_buffer,
		}
	}

	/// Record quota state from the latest response headers.
	pub async fn record(&self, quota: Quota) {
		debug!(
			remaining = quota.remaining,
			reset_epoch = quota.reset_epoch,
			limit = quota.limit,
			"recorded rate limit quota"
		);
		*self.quota.lock().await = Some(quota);
	}

	/// Current quota state, if any response has been seen yet.
	pub async fn snapshot(&self) -> Option<Quota> {
		*self.quota.lock().await
	}

	/// Block until the quota window resets if remaining calls are at or
	/// below the low-water mark.
	///
	/// The sleep races against `cancel`; shutdown interrupts it with
	/// [`GithubError::Cancelled`]. After a completed wait the learned
	/// quota is cleared so the next response re-seeds it.
	pub async fn wait_if_low(&self, cancel: &CancellationToken) -> Result<()> {
		let quota = match self.snapshot().await {
			Some(q) if q.remaining <= self.low_water => q,
			_ => return Ok(()),
		};

		let now = unix_now();
		let resume_at = quota.reset_epoch.saturating_add(self.reset_buffer.as_secs());
		let wait = Duration::from_secs(resume_at.saturating_sub(now));

		info!(
			remaining = quota.remaining,
			low_water = self.low_water,
			wait_secs = wait.as_secs(),
			"rate limit low, sleeping until reset"
		);

		tokio::select! {
			_ = cancel.cancelled() => {
				return Err(GithubError::Cancelled);
			}
			_ = tokio::time::sleep(wait) => {}
		}

		// The window has rolled over; forget the stale quota so the
		// next response re-seeds it.
		*self.quota.lock().await = None;
		Ok(())
	}
}

fn unix_now() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_secs()
}
