// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-handler durable state: one file per handler under
//! `cache/handlers/<name>`, containing a decimal bit-set.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use shadow_core::HandlerState;

/// Errors reading or writing handler state files.
#[derive(Debug, Error)]
pub enum HandlerStateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handler state file {0:?} is not a decimal integer")]
    Malformed(PathBuf),
}

/// Directory of per-handler state files.
pub struct HandlerStateStore {
    dir: PathBuf,
}

impl HandlerStateStore {
    pub fn open(dir: &Path) -> Result<Self, HandlerStateError> {
        fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    /// Load a handler's state; a missing file is the empty state (the
    /// handler has never been initialized on this node).
    pub fn load(&self, name: &str) -> Result<HandlerState, HandlerStateError> {
        let path = self.path_for(name);
        match fs::read_to_string(&path) {
            Ok(content) => {
                HandlerState::from_decimal(&content).ok_or(HandlerStateError::Malformed(path))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HandlerState::empty()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a handler's state eagerly (write + rename, fsynced).
    pub fn store(&self, name: &str, state: HandlerState) -> Result<(), HandlerStateError> {
        let path = self.path_for(name);
        let tmp_path = path.with_extension("tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(state.to_decimal().as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.sync_data()?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[cfg(test)]
#[path = "handler_state_tests.rs"]
mod tests;
