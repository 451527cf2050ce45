// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! PTY allocation and the fork/exec path for supervised children.
//!
//! Everything that runs between `fork` and `execve` lives here, written to
//! the letter of the async-signal-safety rules: no heap allocation, no
//! locks, no stdio. Whatever needs memory (the exec argument layout, the
//! saved resource limits) is prepared in the parent beforehand.

#![cfg(unix)]

pub mod exec;
pub mod fork;
pub mod rlimit;
pub mod signal_safe;
pub mod tty;

pub use exec::{exec_child, PreparedExec};
pub use fork::{fork_pty, ForkPtyResult};
pub use rlimit::{restore_saved_limits, save_limits};
pub use signal_safe::{write_bytes, write_int, write_str};
pub use tty::TtyState;
