// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Commit-processing stage.
//!
//! Claims a repository, brings its working copy up to date, tallies
//! commits per author email, and hands the email set to the user stage
//! as queued batches. Size ceilings are enforced here because an
//! unbounded clone is the cheapest way to exhaust a worker host.

use laurel_server_config::PipelineConfig;
use laurel_server_db::{CommitStore, RepoRecord, RepoState, RepoStore};
use laurel_server_github::GithubError;
use laurel_server_queue::{enqueue_user_batches, JobQueue};
use laurel_server_storage::WorkingCopyStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result, SizeLimitKind};
use crate::extractor::extract_counts;
use crate::resolver::IdentityApi;
use crate::urls::parse_github_remote;

/// What the stage did with the claimed repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
	/// The repository was not claimable (already being processed, or
	/// reset by recovery between enqueue and claim).
	Skipped,
	Extracted {
		emails: u32,
		batches: u32,
		/// True when the history held no attributable emails and the
		/// repository went straight to `completed`.
		completed: bool,
	},
}

/// Run commit extraction for one repository.
///
/// Storage and extraction failures mark the repository `failed`.
/// Cancellation leaves it claimed; startup recovery resets it.
#[instrument(skip_all, fields(repo_id = %repo_id))]
pub async fn process_commits(
	repo_id: Uuid,
	repos: &impl RepoStore,
	commits: &impl CommitStore,
	queue: &impl JobQueue,
	store: &dyn WorkingCopyStore,
	api: &dyn IdentityApi,
	config: &PipelineConfig,
	cancel: &CancellationToken,
) -> Result<CommitOutcome> {
	let repo = repos
		.get_by_id(repo_id)
		.await?
		.ok_or_else(|| PipelineError::RepoNotFound(repo_id.to_string()))?;

	if cancel.is_cancelled() {
		return Err(PipelineError::Cancelled);
	}
	if !repos.begin_commit_processing(repo_id).await? {
		debug!(state = repo.state.as_str(), "Repository not claimable, skipping");
		return Ok(CommitOutcome::Skipped);
	}

	match extract_and_enqueue(&repo, repos, commits, queue, store, api, config, cancel).await {
		Ok(outcome) => Ok(outcome),
		Err(err) if err.is_cancelled() => Err(err),
		Err(err) => {
			if let Err(db_err) = repos.mark_failed(repo_id).await {
				warn!(error = %db_err, "Failed to record failure state");
			}
			Err(err)
		}
	}
}

async fn extract_and_enqueue(
	repo: &RepoRecord,
	repos: &impl RepoStore,
	commits: &impl CommitStore,
	queue: &impl JobQueue,
	store: &dyn WorkingCopyStore,
	api: &dyn IdentityApi,
	config: &PipelineConfig,
	cancel: &CancellationToken,
) -> Result<CommitOutcome> {
	check_remote_size(repo, api, config).await?;
	if cancel.is_cancelled() {
		return Err(PipelineError::Cancelled);
	}

	store.ensure_root().await?;
	if store.exists(&repo.storage_key).await? {
		store.fetch_updates(&repo.storage_key, &repo.url).await?;
	} else {
		store.clone_from_git(&repo.url, &repo.storage_key).await?;
	}

	let bytes = store.measure(&repo.storage_key).await?;
	if bytes > config.max_repo_size_bytes {
		discard_working_copy(store, &repo.storage_key).await;
		return Err(PipelineError::RepoTooLarge {
			kind: SizeLimitKind::Bytes,
			actual: bytes,
			limit: config.max_repo_size_bytes,
		});
	}

	if cancel.is_cancelled() {
		return Err(PipelineError::Cancelled);
	}
	let path = store.local_path(&repo.storage_key).await?;
	let extraction = extract_counts(path).await?;
	if extraction.total_commits > config.max_commit_count {
		discard_working_copy(store, &repo.storage_key).await;
		return Err(PipelineError::RepoTooLarge {
			kind: SizeLimitKind::Commits,
			actual: extraction.total_commits,
			limit: config.max_commit_count,
		});
	}

	commits.replace_for_repo(repo.id, &extraction.counts).await?;
	repos
		.set_commit_stats(
			repo.id,
			extraction.total_commits as i64,
			extraction.counts.len() as i64,
		)
		.await?;

	let advanced = repos
		.transition(repo.id, RepoState::CommitsProcessing, RepoState::UsersProcessing)
		.await?;
	if !advanced {
		// Recovery reset the claim under us; the re-enqueued job redoes
		// this work against the same upserts.
		warn!("Lost the repository claim after extraction, skipping enqueue");
		return Ok(CommitOutcome::Skipped);
	}

	let emails: Vec<String> = extraction.counts.iter().map(|c| c.email.clone()).collect();
	let batches = enqueue_user_batches(queue, repo.id, &emails, config.batch_size as usize).await?;
	let completed = if emails.is_empty() {
		repos.complete_if_drained(repo.id).await?
	} else {
		false
	};

	info!(
		total_commits = extraction.total_commits,
		emails = emails.len(),
		batches,
		completed,
		"Commit extraction finished"
	);
	Ok(CommitOutcome::Extracted { emails: emails.len() as u32, batches, completed })
}

/// Probe the remote-reported size before spending clone bandwidth.
/// Only github.com remotes are probed, and only with a token. A failed
/// probe is not fatal; the on-disk measurement still guards.
async fn check_remote_size(
	repo: &RepoRecord,
	api: &dyn IdentityApi,
	config: &PipelineConfig,
) -> Result<()> {
	let Some((owner, name)) = parse_github_remote(&repo.url) else {
		return Ok(());
	};
	if !api.has_token() {
		return Ok(());
	}

	match api.repo_size_kb(&owner, &name).await {
		Ok(Some(kb)) => {
			let bytes = kb.saturating_mul(1024);
			if bytes > config.max_repo_size_bytes {
				return Err(PipelineError::RepoTooLarge {
					kind: SizeLimitKind::Bytes,
					actual: bytes,
					limit: config.max_repo_size_bytes,
				});
			}
			Ok(())
		}
		Ok(None) => Ok(()),
		Err(GithubError::Cancelled) => Err(PipelineError::Cancelled),
		Err(err) => {
			debug!(error = %err, "Remote size probe failed, proceeding to clone");
			Ok(())
		}
	}
}

async fn discard_working_copy(store: &dyn WorkingCopyStore, key: &str) {
	if let Err(err) = store.delete(key).await {
		warn!(key = %key, error = %err, "Failed to delete oversize working copy");
	}
}

#[cfg(test)]
mod tests {
	use laurel_server_db::testing::create_migrated_test_pool;
	use laurel_server_db::{SqliteCommitStore, SqliteRepoStore};
	use laurel_server_queue::{JobPayload, SqliteJobQueue};
	use laurel_server_storage::testing::{commit_as, file_url, git, seed_source};
	use laurel_server_storage::LocalDiskStore;

	use super::*;
	use crate::resolver::testing::ScriptedApi;

	struct Fixture {
		repos: SqliteRepoStore,
		commits: SqliteCommitStore,
		queue: SqliteJobQueue,
		store: LocalDiskStore,
		api: ScriptedApi,
		config: PipelineConfig,
		cancel: CancellationToken,
	}

	async fn fixture(storage_root: &std::path::Path) -> Fixture {
		let pool = create_migrated_test_pool().await;
		Fixture {
			repos: SqliteRepoStore::new(pool.clone()),
			commits: SqliteCommitStore::new(pool.clone()),
			queue: SqliteJobQueue::new(pool),
			store: LocalDiskStore::new(storage_root.to_path_buf()),
			api: ScriptedApi::new(false),
			config: PipelineConfig::default(),
			cancel: CancellationToken::new(),
		}
	}

	async fn seed_repo(f: &Fixture, url: &str, key: &str) -> Uuid {
		let repo = RepoRecord::new(url.to_string(), key.to_string());
		f.repos.create(&repo).await.unwrap();
		repo.id
	}

	async fn run(f: &Fixture, repo_id: Uuid) -> Result<CommitOutcome> {
		process_commits(
			repo_id,
			&f.repos,
			&f.commits,
			&f.queue,
			&f.store,
			&f.api,
			&f.config,
			&f.cancel,
		)
		.await
	}

	#[tokio::test]
	async fn test_extracts_counts_and_enqueues_batches() {
		let temp = tempfile::tempdir().unwrap();
		let (source, work) = seed_source(temp.path());
		commit_as(&work, "Alice", "a@x.com", "a-one");
		commit_as(&work, "Alice", "a@x.com", "a-two");
		commit_as(&work, "Bob", "b@x.com", "b-one");
		git(&["push", "origin", "HEAD"], &work);

		let f = fixture(&temp.path().join("copies")).await;
		let repo_id = seed_repo(&f, &file_url(&source), "local/widgets").await;

		let outcome = run(&f, repo_id).await.unwrap();
		assert_eq!(
			outcome,
			CommitOutcome::Extracted { emails: 3, batches: 1, completed: false }
		);

		let repo = f.repos.get_by_id(repo_id).await.unwrap().unwrap();
		assert_eq!(repo.state, RepoState::UsersProcessing);
		assert_eq!(repo.total_commits, 4);
		assert_eq!(repo.unique_contributors, 3);
		assert!(repo.commits_processed_at.is_some());
		assert!(repo.last_attempt.is_some());

		let job = f.queue.dequeue_next().await.unwrap().unwrap();
		match job.payload {
			JobPayload::UserProcessing { repo_id: id, batch, emails } => {
				assert_eq!(id, repo_id);
				assert_eq!(batch, 0);
				assert_eq!(emails, vec!["a@x.com", "b@x.com", "test@example.com"]);
			}
			other => panic!("unexpected payload: {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_reextraction_overwrites_counts() {
		let temp = tempfile::tempdir().unwrap();
		let (source, work) = seed_source(temp.path());
		commit_as(&work, "Alice", "a@x.com", "first");
		git(&["push", "origin", "HEAD"], &work);

		let f = fixture(&temp.path().join("copies")).await;
		let repo_id = seed_repo(&f, &file_url(&source), "local/widgets").await;
		run(&f, repo_id).await.unwrap();
		let stale = f.queue.dequeue_next().await.unwrap().unwrap();
		f.queue.ack(stale.id).await.unwrap();

		// More history lands, then the repository is reprocessed the
		// way recovery reprocesses it.
		commit_as(&work, "Alice", "a@x.com", "second");
		git(&["push", "origin", "HEAD"], &work);
		f.repos
			.transition(repo_id, RepoState::UsersProcessing, RepoState::Failed)
			.await
			.unwrap();
		f.repos
			.transition(repo_id, RepoState::Failed, RepoState::Pending)
			.await
			.unwrap();

		let outcome = run(&f, repo_id).await.unwrap();
		assert_eq!(
			outcome,
			CommitOutcome::Extracted { emails: 2, batches: 1, completed: false }
		);
		let record = f.commits.get(repo_id, "a@x.com").await.unwrap().unwrap();
		assert_eq!(record.commit_count, 2);
		let repo = f.repos.get_by_id(repo_id).await.unwrap().unwrap();
		assert_eq!(repo.total_commits, 3);
	}

	#[tokio::test]
	async fn test_skips_repository_already_claimed() {
		let temp = tempfile::tempdir().unwrap();
		let f = fixture(&temp.path().join("copies")).await;
		let repo_id = seed_repo(&f, "file:///nowhere/taken", "local/taken").await;
		f.repos.begin_commit_processing(repo_id).await.unwrap();

		let outcome = run(&f, repo_id).await.unwrap();
		assert_eq!(outcome, CommitOutcome::Skipped);
		let repo = f.repos.get_by_id(repo_id).await.unwrap().unwrap();
		assert_eq!(repo.state, RepoState::CommitsProcessing);
	}

	#[tokio::test]
	async fn test_unknown_repository_is_an_error() {
		let temp = tempfile::tempdir().unwrap();
		let f = fixture(&temp.path().join("copies")).await;
		let err = run(&f, Uuid::new_v4()).await.unwrap_err();
		assert!(matches!(err, PipelineError::RepoNotFound(_)));
	}

	#[tokio::test]
	async fn test_byte_ceiling_fails_repo_and_deletes_copy() {
		let temp = tempfile::tempdir().unwrap();
		let (source, work) = seed_source(temp.path());
		commit_as(&work, "Alice", "a@x.com", "one");
		git(&["push", "origin", "HEAD"], &work);

		let mut f = fixture(&temp.path().join("copies")).await;
		f.config.max_repo_size_bytes = 1;
		let repo_id = seed_repo(&f, &file_url(&source), "local/huge").await;

		let err = run(&f, repo_id).await.unwrap_err();
		assert!(matches!(
			err,
			PipelineError::RepoTooLarge { kind: SizeLimitKind::Bytes, .. }
		));
		let repo = f.repos.get_by_id(repo_id).await.unwrap().unwrap();
		assert_eq!(repo.state, RepoState::Failed);
		assert!(!f.store.exists("local/huge").await.unwrap());
		assert!(f.queue.dequeue_next().await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_retry_after_size_failure_reclones_and_rechecks() {
		let temp = tempfile::tempdir().unwrap();
		let (source, work) = seed_source(temp.path());
		commit_as(&work, "Alice", "a@x.com", "one");
		git(&["push", "origin", "HEAD"], &work);

		let mut f = fixture(&temp.path().join("copies")).await;
		f.config.max_repo_size_bytes = 1;
		let repo_id = seed_repo(&f, &file_url(&source), "local/retry").await;
		run(&f, repo_id).await.unwrap_err();
		assert!(!f.store.exists("local/retry").await.unwrap());

		// Retry re-clones and re-measures; nothing is remembered from
		// the failed attempt.
		assert!(f.repos.retry(repo_id).await.unwrap());
		f.config.max_repo_size_bytes = 500 * 1024 * 1024;
		let outcome = run(&f, repo_id).await.unwrap();
		assert_eq!(
			outcome,
			CommitOutcome::Extracted { emails: 2, batches: 1, completed: false }
		);
		let repo = f.repos.get_by_id(repo_id).await.unwrap().unwrap();
		assert_eq!(repo.state, RepoState::UsersProcessing);
		assert!(f.store.exists("local/retry").await.unwrap());
	}

	#[tokio::test]
	async fn test_commit_ceiling_fails_repo() {
		let temp = tempfile::tempdir().unwrap();
		let (source, work) = seed_source(temp.path());
		commit_as(&work, "Alice", "a@x.com", "one");
		commit_as(&work, "Alice", "a@x.com", "two");
		git(&["push", "origin", "HEAD"], &work);

		let mut f = fixture(&temp.path().join("copies")).await;
		f.config.max_commit_count = 1;
		let repo_id = seed_repo(&f, &file_url(&source), "local/long").await;

		let err = run(&f, repo_id).await.unwrap_err();
		assert!(matches!(
			err,
			PipelineError::RepoTooLarge { kind: SizeLimitKind::Commits, .. }
		));
		let repo = f.repos.get_by_id(repo_id).await.unwrap().unwrap();
		assert_eq!(repo.state, RepoState::Failed);
		assert!(!f.store.exists("local/long").await.unwrap());
	}

	#[tokio::test]
	async fn test_clone_failure_marks_repo_failed() {
		let temp = tempfile::tempdir().unwrap();
		let f = fixture(&temp.path().join("copies")).await;
		let missing = temp.path().join("does-not-exist.git");
		let repo_id = seed_repo(&f, &file_url(&missing), "local/missing").await;

		let err = run(&f, repo_id).await.unwrap_err();
		assert!(matches!(err, PipelineError::Storage(_)));
		let repo = f.repos.get_by_id(repo_id).await.unwrap().unwrap();
		assert_eq!(repo.state, RepoState::Failed);
	}

	#[tokio::test]
	async fn test_remote_size_probe_rejects_before_cloning() {
		let temp = tempfile::tempdir().unwrap();
		let mut f = fixture(&temp.path().join("copies")).await;
		f.api = ScriptedApi::new(true);
		f.api.size_kb = Some(1024 * 1024); // 1 GiB reported
		f.config.max_repo_size_bytes = 100 * 1024 * 1024;
		let repo_id = seed_repo(&f, "https://github.com/acme/huge", "github.com/acme/huge").await;

		let err = run(&f, repo_id).await.unwrap_err();
		assert!(matches!(
			err,
			PipelineError::RepoTooLarge { kind: SizeLimitKind::Bytes, .. }
		));
		let repo = f.repos.get_by_id(repo_id).await.unwrap().unwrap();
		assert_eq!(repo.state, RepoState::Failed);
		assert!(!f.store.exists("github.com/acme/huge").await.unwrap());
	}

	#[tokio::test]
	async fn test_cancellation_leaves_claim_for_recovery() {
		let temp = tempfile::tempdir().unwrap();
		let (source, _work) = seed_source(temp.path());
		let f = fixture(&temp.path().join("copies")).await;
		let repo_id = seed_repo(&f, &file_url(&source), "local/cancelled").await;
		f.cancel.cancel();

		let err = run(&f, repo_id).await.unwrap_err();
		assert!(err.is_cancelled());
		let repo = f.repos.get_by_id(repo_id).await.unwrap().unwrap();
		assert_eq!(repo.state, RepoState::Pending);
	}
}
