// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Git fixture helpers shared by storage and pipeline tests.
//!
//! These shell out to the `git` binary to build real repositories in
//! temp directories, then address them over `file://` URLs.

use std::path::{Path, PathBuf};

/// Run a git command in `dir`, panicking on failure. Author and
/// committer identity are pinned so commit hashes are reproducible
/// within a test.
pub fn git(args: &[&str], dir: &Path) {
	let status = std::process::Command::new("git")
		.args(args)
		.current_dir(dir)
		.env("GIT_AUTHOR_NAME", "Test")
		.env("GIT_AUTHOR_EMAIL", "test@example.com")
		.env("GIT_COMMITTER_NAME", "Test")
		.env("GIT_COMMITTER_EMAIL", "test@example.com")
		.status()
		.expect("git invocation failed");
	assert!(status.success(), "git {args:?} failed");
}

/// Create a bare source repository plus a working clone with one
/// initial commit pushed. Returns `(source, work)` paths.
pub fn seed_source(temp: &Path) -> (PathBuf, PathBuf) {
	let source = temp.join("source.git");
	let work = temp.join("work");

	git(&["init", "--bare", source.to_str().unwrap()], temp);
	git(
		&["clone", source.to_str().unwrap(), work.to_str().unwrap()],
		temp,
	);
	std::fs::write(work.join("file.txt"), "initial").unwrap();
	git(&["add", "."], &work);
	git(&["commit", "-m", "initial"], &work);
	git(&["push", "origin", "HEAD"], &work);

	(source, work)
}

/// Commit `content` to `name` in the working clone and push it.
pub fn push_commit(work: &Path, name: &str, content: &str) {
	std::fs::write(work.join(name), content).unwrap();
	git(&["add", "."], work);
	git(&["commit", "-m", name], work);
	git(&["push", "origin", "HEAD"], work);
}

/// Commit as a specific author without pushing. Used to shape
/// per-author commit counts in extraction tests.
pub fn commit_as(work: &Path, name: &str, email: &str, message: &str) {
	std::fs::write(work.join(format!("{message}.txt")), message).unwrap();
	let status = std::process::Command::new("git")
		.args(["add", "."])
		.current_dir(work)
		.status()
		.expect("git invocation failed");
	assert!(status.success());
	let status = std::process::Command::new("git")
		.args(["commit", "-m", message])
		.current_dir(work)
		.env("GIT_AUTHOR_NAME", name)
		.env("GIT_AUTHOR_EMAIL", email)
		.env("GIT_COMMITTER_NAME", name)
		.env("GIT_COMMITTER_EMAIL", email)
		.status()
		.expect("git invocation failed");
	assert!(status.success(), "git commit as {email} failed");
}

/// `file://` URL for a local repository path.
pub fn file_url(path: &Path) -> String {
	format!("file://{}", path.display())
}
