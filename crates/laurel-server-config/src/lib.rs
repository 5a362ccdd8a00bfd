// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the Laurel worker.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`LAUREL_WORKER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use laurel_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Database at {}", config.database.url);
//! ```

pub mod error;
pub mod layer;
pub mod secret;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::WorkerConfigLayer;
pub use secret::{load_secret_env, SecretString};
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved worker configuration.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
	pub database: DatabaseConfig,
	pub storage: StorageConfig,
	pub github: GithubConfig,
	pub pipeline: PipelineConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`LAUREL_WORKER_*`)
/// 2. Config file (`/etc/laurel/worker.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<WorkerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<WorkerConfig, ConfigError> {
	let mut merged = WorkerConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<WorkerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<WorkerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = WorkerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: WorkerConfigLayer) -> Result<WorkerConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let storage = layer.storage.unwrap_or_default().finalize();
	let pipeline = layer.pipeline.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	let token = load_secret_env("LAUREL_WORKER_GITHUB_TOKEN").map_err(ConfigError::Secret)?;
	let github = layer.github.unwrap_or_default().finalize(token);

	validate_config(&pipeline)?;

	info!(
		database = %database.url,
		storage_backend = storage.backend.as_str(),
		github_api = %github.api_base,
		github_token_configured = github.token.is_some(),
		batch_size = pipeline.batch_size,
		max_jobs = pipeline.max_jobs,
		"Worker configuration loaded"
	);

	Ok(WorkerConfig {
		database,
		storage,
		github,
		pipeline,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
	if pipeline.batch_size == 0 {
		return Err(ConfigError::Validation(
			"pipeline.batch_size must be at least 1".to_string(),
		));
	}
	if pipeline.max_jobs == 0 {
		return Err(ConfigError::Validation(
			"pipeline.max_jobs must be at least 1".to_string(),
		));
	}
	if pipeline.max_concurrent_batches == 0 {
		return Err(ConfigError::Validation(
			"pipeline.max_concurrent_batches must be at least 1".to_string(),
		));
	}

	Ok(())
}
