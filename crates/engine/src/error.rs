// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline error taxonomy.
//!
//! Transient I/O is recovered inside the adapters and handler failures are
//! recovered by the dispatcher; everything that reaches [`RuntimeError`]
//! halts the pipeline and the process exits non-zero for the external
//! supervisor to restart.

use std::path::PathBuf;

use thiserror::Error;

use shadow_adapters::{DirectoryError, NotifierError};
use shadow_storage::{CacheError, CursorError, HandlerStateError, TxLogError};

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Notifier(#[from] NotifierError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    TxLog(#[from] TxLogError),

    #[error(transparent)]
    HandlerState(#[from] HandlerStateError),

    #[error("notifier announced transaction {got}, expected {expected}")]
    Ordering { expected: u64, got: u64 },

    #[error("free space on {path} below minimum: {available_mib} MiB < {min_mib} MiB")]
    FreeSpace { path: PathBuf, available_mib: u64, min_mib: u64 },

    #[error("quarantine sentinel present: {0}")]
    Quarantined(PathBuf),

    #[error("statvfs failed for {path}: {errno}")]
    Statvfs { path: PathBuf, errno: String },
}
