// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Contributor pipeline stages.
//!
//! Two stages move a repository through its lifecycle: commit
//! processing clones or fetches the working copy and tallies commits
//! per author email; user processing resolves those emails to
//! contributor identities in queued batches. `run_worker` is the
//! bounded entry point an external scheduler invokes.

pub mod commits;
pub mod error;
pub mod extractor;
pub mod resolver;
pub mod urls;
pub mod users;
pub mod worker;

pub use commits::{process_commits, CommitOutcome};
pub use error::{PipelineError, Result, SizeLimitKind};
pub use extractor::{extract_counts, Extraction};
pub use resolver::{resolve_email, IdentityApi};
pub use urls::{normalize_remote_url, parse_github_remote, storage_key_for};
pub use users::{process_user_batch, BatchOutcome};
pub use worker::{run_worker, PipelineDeps, RunMode, RunReport};
