// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitHub identity integration for Laurel.
//!
//! This crate provides:
//! - No-reply address parsing (resolution without API calls)
//! - A rate-limit governor that preemptively throttles callers
//! - A REST client for user search and repository metadata
//!
//! All quota knowledge lives in the client's governor; nothing here
//! keeps global mutable state.

pub mod client;
pub mod error;
pub mod noreply;
pub mod rate_limit;

pub use client::{GithubClient, ResolvedUser};
pub use error::{GithubError, Result};
pub use noreply::{parse_noreply_login, profile_url};
pub use rate_limit::{Quota, RateLimitGovernor};
