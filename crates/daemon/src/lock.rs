// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive data-directory lock.
//!
//! The cache and cursor tolerate exactly one writer; the lock turns a
//! double-start into a clean startup error instead of silent corruption.
//! The lock file records our pid for the operator and releases on drop.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

const LOCK_FILE: &str = "shadowd.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("cannot create lock file in {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("another listener already owns {path}")]
    Held { path: PathBuf },
}

/// Holds the exclusive lock for the process lifetime.
pub struct DataDirLock {
    // NOTE(lifetime): held to keep the flock; released on drop
    #[allow(dead_code)]
    file: File,
}

/// Acquire the exclusive lock under `data_dir`, creating the directory if
/// needed.
pub fn lock_data_dir(data_dir: &Path) -> Result<DataDirLock, LockError> {
    let io = |source| LockError::Io { path: data_dir.to_path_buf(), source };
    fs::create_dir_all(data_dir).map_err(io)?;
    let path = data_dir.join(LOCK_FILE);
    let mut file =
        OpenOptions::new().create(true).truncate(false).write(true).open(&path).map_err(io)?;
    if file.try_lock_exclusive().is_err() {
        return Err(LockError::Held { path: data_dir.to_path_buf() });
    }
    file.set_len(0).map_err(io)?;
    let _ = writeln!(file, "{}", std::process::id());
    Ok(DataDirLock { file })
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
