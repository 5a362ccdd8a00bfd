// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for Laurel.
//!
//! This crate provides a pre-configured HTTP client with a consistent
//! User-Agent header so every outbound call identifies the same way.

mod client;

pub use client::{builder, new_client, new_client_with_timeout, user_agent};
