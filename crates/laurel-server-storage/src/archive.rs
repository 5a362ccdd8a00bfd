// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! tar.gz packing of bare repository directories.
//!
//! These are blocking functions; callers run them under
//! `spawn_blocking`.

use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Result, StorageError};

/// Pack the contents of `src` into a gzip-compressed tar archive.
pub fn pack_dir(src: &Path) -> Result<Vec<u8>> {
	let encoder = GzEncoder::new(Vec::new(), Compression::default());
	let mut builder = tar::Builder::new(encoder);

	builder
		.append_dir_all(".", src)
		.map_err(|e| StorageError::Archive(format!("failed to add files to archive: {e}")))?;

	let encoder = builder
		.into_inner()
		.map_err(|e| StorageError::Archive(format!("failed to finish archive: {e}")))?;

	encoder
		.finish()
		.map_err(|e| StorageError::Archive(format!("failed to finish compression: {e}")))
}

/// Extract a gzip-compressed tar archive into `dest`, creating it if
/// needed.
pub fn unpack(data: &[u8], dest: &Path) -> Result<()> {
	std::fs::create_dir_all(dest)?;

	let decoder = GzDecoder::new(data);
	let mut archive = tar::Archive::new(decoder);

	archive
		.unpack(dest)
		.map_err(|e| StorageError::Archive(format!("failed to extract archive: {e}")))
}
