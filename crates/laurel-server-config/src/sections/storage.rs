// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Working-copy storage configuration section.

use serde::{Deserialize, Serialize};

/// Where cloned repositories live between processing runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
	/// Bare clones kept directly on local disk.
	Local,
	/// Bare clones packed into tar.gz blobs in an object store, with a
	/// local cache directory for the working copies.
	Archive,
}

impl StorageBackend {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageBackend::Local => "local",
			StorageBackend::Archive => "archive",
		}
	}
}

impl std::str::FromStr for StorageBackend {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"local" => Ok(StorageBackend::Local),
			"archive" => Ok(StorageBackend::Archive),
			_ => Err(format!("unknown storage backend: {s}")),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfigLayer {
	pub backend: Option<StorageBackend>,
	pub root: Option<String>,
	pub object_root: Option<String>,
	pub cache_dir: Option<String>,
}

impl StorageConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.backend.is_some() {
			self.backend = other.backend;
		}
		if other.root.is_some() {
			self.root = other.root;
		}
		if other.object_root.is_some() {
			self.object_root = other.object_root;
		}
		if other.cache_dir.is_some() {
			self.cache_dir = other.cache_dir;
		}
	}

	pub fn finalize(self) -> StorageConfig {
		StorageConfig {
			backend: self.backend.unwrap_or(StorageBackend::Local),
			root: self.root.unwrap_or_else(|| "./data/repos".to_string()),
			object_root: self
				.object_root
				.unwrap_or_else(|| "./data/objects".to_string()),
			cache_dir: self.cache_dir.unwrap_or_else(|| "./data/cache".to_string()),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
	pub backend: StorageBackend,
	pub root: String,
	pub object_root: String,
	pub cache_dir: String,
}

impl Default for StorageConfig {
	fn default() -> Self {
		StorageConfigLayer::default().finalize()
	}
}
