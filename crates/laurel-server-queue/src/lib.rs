// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable job queue for the processing pipeline.
//!
//! Jobs live in SQLite next to the data they mutate, so a worker crash
//! never strands state the queue cannot see. Two job types flow
//! through: commit extraction (one per repository) and identity
//! resolution (one per email batch).

pub mod coordinator;
pub mod error;
pub mod payload;
pub mod store;

pub use coordinator::{
	enqueue_commit_job, enqueue_user_batches, plan_batches, recover_stuck, requeue_stalled,
	RecoveryReport, StalledReport,
};
pub use error::{QueueError, Result};
pub use payload::{JobPayload, JobType};
pub use store::{ActiveJob, EnqueueOutcome, JobQueue, SqliteJobQueue};
