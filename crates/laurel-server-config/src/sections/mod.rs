// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections, one per worker concern.
//!
//! Each section ships a `*ConfigLayer` of optional fields that sources
//! fill in, plus a finalized `*Config` with every default applied.

pub mod database;
pub mod github;
pub mod logging;
pub mod pipeline;
pub mod storage;

pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use github::{GithubConfig, GithubConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use pipeline::{PipelineConfig, PipelineConfigLayer};
pub use storage::{StorageBackend, StorageConfig, StorageConfigLayer};
