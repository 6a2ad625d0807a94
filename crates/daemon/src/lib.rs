// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shadowd daemon library: configuration, locking, and signal wiring for
//! the `shadowd` binary.

pub mod config;
pub mod lock;
pub mod signals;

pub use config::{Config, ConfigError, DropPrivileges};
pub use lock::{lock_data_dir, DataDirLock, LockError};
