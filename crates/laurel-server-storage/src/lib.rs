// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod archive;
pub mod archived;
pub mod error;
pub mod git;
pub mod object;
pub mod store;
pub mod testing;

pub use archived::ArchiveStore;
pub use error::{classify_git_error, Result, StorageError};
pub use git::{clone_bare, fetch_bare};
pub use object::{FsObjectStore, InMemoryObjectStore, ObjectStore};
pub use store::{dir_size_bytes, LocalDiskStore, WorkingCopyStore};
