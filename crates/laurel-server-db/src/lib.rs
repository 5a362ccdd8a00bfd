// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database layer for Laurel.
//!
//! SQLite-backed stores for tracked repositories, per-author commit
//! tallies, the contributor directory, and the leaderboard read model.
//! Callers depend on the store traits; the `Sqlite*` implementations
//! share one WAL-mode pool.

mod commit;
mod contributor;
mod error;
mod leaderboard;
mod migrate;
mod pool;
mod repo;
pub mod testing;

pub use commit::{AuthorCount, CommitRecord, CommitStore, SqliteCommitStore};
pub use contributor::{Contributor, ContributorStore, SqliteContributorStore};
pub use error::{DbError, Result};
pub use leaderboard::{LeaderboardEntry, LeaderboardStore, SqliteLeaderboardStore};
pub use migrate::run_migrations;
pub use pool::create_pool;
pub use repo::{RepoRecord, RepoState, RepoStore, SqliteRepoStore};
