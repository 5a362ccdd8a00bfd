// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Subcommand implementations for the worker binary.
//!
//! Each command is a thin wrapper over the pipeline and store crates;
//! stdout carries the operator-facing result, tracing carries the
//! operational detail.

use std::sync::Arc;

use anyhow::Context;
use laurel_server_config::{StorageBackend, StorageConfig, WorkerConfig};
use laurel_server_db::{
	LeaderboardStore, RepoRecord, RepoStore, SqliteCommitStore, SqliteLeaderboardStore,
	SqliteRepoStore,
};
use laurel_server_github::GithubClient;
use laurel_server_pipeline::{
	normalize_remote_url, run_worker, storage_key_for, IdentityApi, PipelineDeps, RunMode,
};
use laurel_server_queue::{enqueue_commit_job, SqliteJobQueue};
use laurel_server_storage::{ArchiveStore, FsObjectStore, LocalDiskStore, WorkingCopyStore};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Recover abandoned claims, then drain queued jobs.
pub async fn run(
	config: &WorkerConfig,
	pool: SqlitePool,
	max_jobs: Option<u32>,
	parallel: bool,
	cancel: &CancellationToken,
) -> anyhow::Result<()> {
	let mut pipeline = config.pipeline.clone();
	if let Some(limit) = max_jobs {
		pipeline.max_jobs = limit;
	}

	let store = build_store(&config.storage);
	let api: Arc<dyn IdentityApi> = Arc::new(GithubClient::new(&config.github));
	let directory_ttl = chrono::Duration::hours(config.github.directory_ttl_hours as i64);
	let deps = PipelineDeps::new(pool, store, api, pipeline, directory_ttl);

	let mode = if parallel {
		RunMode::Parallel
	} else {
		RunMode::Single
	};

	let report = run_worker(&deps, mode, cancel).await?;
	info!(
		processed = report.processed,
		failed = report.failed,
		rate_limited = report.rate_limited,
		skipped = report.skipped,
		"Worker invocation complete"
	);
	Ok(())
}

/// Track a repository (idempotent on normalized URL) and queue commit
/// extraction for it.
pub async fn enqueue(pool: SqlitePool, url: &str) -> anyhow::Result<()> {
	let normalized = normalize_remote_url(url)?;
	let repos = SqliteRepoStore::new(pool.clone());
	let queue = SqliteJobQueue::new(pool);

	let repo = match repos.get_by_url(&normalized).await? {
		Some(existing) => existing,
		None => {
			let record = RepoRecord::new(normalized.clone(), storage_key_for(&normalized));
			repos.create(&record).await?;
			record
		}
	};

	let outcome = enqueue_commit_job(&queue, repo.id).await?;
	if outcome.is_duplicate() {
		println!("Already queued: {normalized} ({})", repo.id);
	} else {
		println!("Enqueued: {normalized} ({})", repo.id);
	}
	Ok(())
}

/// Reopen a failed repository and queue a fresh extraction.
pub async fn retry(pool: SqlitePool, url: &str) -> anyhow::Result<()> {
	let normalized = normalize_remote_url(url)?;
	let repos = SqliteRepoStore::new(pool.clone());
	let queue = SqliteJobQueue::new(pool);

	let repo = repos
		.get_by_url(&normalized)
		.await?
		.with_context(|| format!("repository not tracked: {normalized}"))?;

	if !repos.retry(repo.id).await? {
		anyhow::bail!("repository is not in a failed state: {normalized}");
	}

	enqueue_commit_job(&queue, repo.id).await?;
	println!("Retrying: {normalized}");
	Ok(())
}

/// Queue leftover batches for every repository with unprocessed emails
/// and no live jobs.
pub async fn requeue_stalled(config: &WorkerConfig, pool: SqlitePool) -> anyhow::Result<()> {
	let queue = SqliteJobQueue::new(pool.clone());
	let repos = SqliteRepoStore::new(pool.clone());
	let commits = SqliteCommitStore::new(pool);

	let report = laurel_server_queue::requeue_stalled(
		&queue,
		&repos,
		&commits,
		config.pipeline.batch_size as usize,
	)
	.await?;

	println!(
		"Resumed {} repositories ({} batches queued)",
		report.repos_resumed, report.batches_enqueued
	);
	Ok(())
}

/// Print the leaderboard for a tracked repository, best rank first.
pub async fn leaderboard(pool: SqlitePool, url: &str) -> anyhow::Result<()> {
	let normalized = normalize_remote_url(url)?;
	let repos = SqliteRepoStore::new(pool.clone());
	let store = SqliteLeaderboardStore::new(pool);

	let repo = repos
		.get_by_url(&normalized)
		.await?
		.with_context(|| format!("repository not tracked: {normalized}"))?;

	let entries = store.leaderboard(repo.id).await?;

	println!("{normalized} [{}]", repo.state.as_str());
	if entries.is_empty() {
		println!("No contributors recorded yet.");
		return Ok(());
	}

	for (rank, entry) in entries.iter().enumerate() {
		match entry.profile_url.as_deref() {
			Some(profile) => println!(
				"{:>4}  {:<32} {:>8}  {profile}",
				rank + 1,
				entry.display_handle(),
				entry.commit_count
			),
			None => println!(
				"{:>4}  {:<32} {:>8}",
				rank + 1,
				entry.display_handle(),
				entry.commit_count
			),
		}
	}
	Ok(())
}

fn build_store(storage: &StorageConfig) -> Arc<dyn WorkingCopyStore> {
	match storage.backend {
		StorageBackend::Local => Arc::new(LocalDiskStore::new(storage.root.clone())),
		StorageBackend::Archive => Arc::new(ArchiveStore::new(
			FsObjectStore::new(storage.object_root.clone()),
			storage.cache_dir.clone(),
		)),
	}
}
