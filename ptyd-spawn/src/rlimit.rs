// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resource-limit snapshot for supervised children.
//!
//! The supervisor may run with limits adjusted for its own needs; children
//! should start from the limits that were in force when the supervisor came
//! up. The snapshot is taken once at startup so that re-applying it in the
//! pre-exec window is nothing but a run of `setrlimit` calls.

use nix::sys::resource::{getrlimit, setrlimit, Resource};
use std::sync::OnceLock;

const SAVED_RESOURCES: &[Resource] = &[
    Resource::RLIMIT_CPU,
    Resource::RLIMIT_FSIZE,
    Resource::RLIMIT_DATA,
    Resource::RLIMIT_STACK,
    Resource::RLIMIT_CORE,
    Resource::RLIMIT_NOFILE,
];

static SAVED: OnceLock<Vec<(Resource, libc::rlim_t, libc::rlim_t)>> = OnceLock::new();

/// Call once, early, from the supervisor's main. Later calls are no-ops.
pub fn save_limits() {
    let saved = SAVED_RESOURCES
        .iter()
        .filter_map(|&resource| {
            getrlimit(resource)
                .ok()
                .map(|(soft, hard)| (resource, soft, hard))
        })
        .collect();
    let _ = SAVED.set(saved);
}

/// Legal between fork and exec: reads a prebuilt table, issues syscalls.
/// Individual failures are ignored; a child with one stale limit beats no
/// child at all.
pub fn restore_saved_limits() {
    if let Some(saved) = SAVED.get() {
        for &(resource, soft, hard) in saved {
            let _ = setrlimit(resource, soft, hard);
        }
    }
}
