// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret wrapper that keeps tokens out of logs.
//!
//! Debug, Display, and Serialize all emit `[REDACTED]`; call sites must
//! opt in with [`SecretString::expose`]. The inner value is zeroed on
//! drop.

use std::fmt;
use std::path::PathBuf;
use std::{env, fs};

use zeroize::Zeroize;

/// The redaction placeholder used in all output.
pub const REDACTED: &str = "[REDACTED]";

#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretString {
	inner: String,
}

impl SecretString {
	pub fn new(inner: impl Into<String>) -> Self {
		Self {
			inner: inner.into(),
		}
	}

	/// Explicitly access the inner value.
	pub fn expose(&self) -> &str {
		&self.inner
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("SecretString").field(&REDACTED).finish()
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl serde::Serialize for SecretString {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(REDACTED)
	}
}

impl<'de> serde::Deserialize<'de> for SecretString {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		String::deserialize(deserializer).map(SecretString::new)
	}
}

/// Load a secret from the environment using the `VAR` / `VAR_FILE`
/// convention. `VAR_FILE` wins and names a file holding the secret (a
/// single trailing newline is stripped); otherwise `VAR` is used
/// directly; otherwise `None`.
pub fn load_secret_env(var: &str) -> Result<Option<SecretString>, String> {
	let file_var = format!("{var}_FILE");

	if let Ok(path_str) = env::var(&file_var) {
		if path_str.is_empty() {
			return Err(format!("secret file path in {file_var} is empty"));
		}

		let path = PathBuf::from(&path_str);
		let content = fs::read_to_string(&path)
			.map_err(|e| format!("failed to read secret file at {}: {e}", path.display()))?;

		let secret = content.strip_suffix('\n').unwrap_or(&content).to_string();
		return Ok(Some(SecretString::new(secret)));
	}

	if let Ok(value) = env::var(var) {
		if !value.is_empty() {
			return Ok(Some(SecretString::new(value)));
		}
	}

	Ok(None)
}
