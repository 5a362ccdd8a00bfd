// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::WorkerConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, GithubConfigLayer, LoggingConfigLayer, PipelineConfigLayer, StorageBackend,
	StorageConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<WorkerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<WorkerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(WorkerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/laurel/worker.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<WorkerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(WorkerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: WorkerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: LAUREL_WORKER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<WorkerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(WorkerConfigLayer {
			database: Some(load_database_from_env()?),
			storage: Some(load_storage_from_env()?),
			github: Some(load_github_from_env()?),
			pipeline: Some(load_pipeline_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u32 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env_var("LAUREL_WORKER_DATABASE_URL"),
	})
}

fn load_storage_from_env() -> Result<StorageConfigLayer, ConfigError> {
	let backend = match env_var("LAUREL_WORKER_STORAGE_BACKEND") {
		Some(v) => Some(
			v.to_lowercase()
				.parse::<StorageBackend>()
				.map_err(|message| ConfigError::InvalidValue {
					key: "LAUREL_WORKER_STORAGE_BACKEND".to_string(),
					message,
				})?,
		),
		None => None,
	};

	Ok(StorageConfigLayer {
		backend,
		root: env_var("LAUREL_WORKER_STORAGE_ROOT"),
		object_root: env_var("LAUREL_WORKER_STORAGE_OBJECT_ROOT"),
		cache_dir: env_var("LAUREL_WORKER_STORAGE_CACHE_DIR"),
	})
}

fn load_github_from_env() -> Result<GithubConfigLayer, ConfigError> {
	Ok(GithubConfigLayer {
		api_base: env_var("LAUREL_WORKER_GITHUB_API_BASE"),
		timeout_secs: env_u64("LAUREL_WORKER_GITHUB_TIMEOUT_SECS")?,
		low_water: env_u64("LAUREL_WORKER_GITHUB_LOW_WATER")?,
		reset_buffer_secs: env_u64("LAUREL_WORKER_GITHUB_RESET_BUFFER_SECS")?,
		directory_ttl_hours: env_u64("LAUREL_WORKER_GITHUB_DIRECTORY_TTL_HOURS")?,
	})
}

fn load_pipeline_from_env() -> Result<PipelineConfigLayer, ConfigError> {
	Ok(PipelineConfigLayer {
		batch_size: env_u32("LAUREL_WORKER_BATCH_SIZE")?,
		max_jobs: env_u32("LAUREL_WORKER_MAX_JOBS")?,
		max_concurrent_batches: env_u32("LAUREL_WORKER_MAX_CONCURRENT_BATCHES")?,
		stale_claim_secs: env_u64("LAUREL_WORKER_STALE_CLAIM_SECS")?,
		max_attempts: env_u32("LAUREL_WORKER_MAX_ATTEMPTS")?,
		max_repo_size_bytes: env_u64("LAUREL_WORKER_MAX_REPO_SIZE_BYTES")?,
		max_commit_count: env_u64("LAUREL_WORKER_MAX_COMMIT_COUNT")?,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	Ok(LoggingConfigLayer {
		level: env_var("LAUREL_WORKER_LOG_LEVEL"),
		json: env_bool("LAUREL_WORKER_LOG_JSON"),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let source = DefaultsSource;
		let layer = source.load().unwrap();
		assert!(layer.database.is_none());
		assert!(layer.pipeline.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let source = TomlSource::new("/nonexistent/config.toml");
		let layer = source.load().unwrap();
		assert!(layer.database.is_none());
	}

	#[test]
	fn test_toml_source_parses_sections() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("worker.toml");
		std::fs::write(
			&path,
			r#"
[storage]
backend = "archive"
root = "/var/lib/laurel/repos"

[pipeline]
batch_size = 20
"#,
		)
		.unwrap();

		let layer = TomlSource::new(&path).load().unwrap();
		let storage = layer.storage.unwrap();
		assert_eq!(storage.backend, Some(StorageBackend::Archive));
		assert_eq!(storage.root.as_deref(), Some("/var/lib/laurel/repos"));
		assert_eq!(layer.pipeline.unwrap().batch_size, Some(20));
	}

	#[test]
	fn test_toml_source_rejects_malformed_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("worker.toml");
		std::fs::write(&path, "[storage\nbackend = ").unwrap();

		let err = TomlSource::new(&path).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}
}
