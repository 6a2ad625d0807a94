// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The master cursor: the single source of truth for "where am I in the
//! stream."
//!
//! Binary layout of `master.state`: `notifier_id (u64 LE)`, `schema_id
//! (u64 LE)`, `modules_hash (32 bytes)`. Written via temp file + rename so
//! a crash never leaves a half-written cursor; the file is fsynced before
//! the rename.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use thiserror::Error;

/// Length of the module-directory hash (SHA-256).
pub const MODULES_HASH_LEN: usize = 32;

const CURSOR_LEN: usize = 8 + 8 + MODULES_HASH_LEN;

/// Errors loading or storing the master cursor.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cursor file has {0} bytes, expected {CURSOR_LEN}")]
    BadLength(usize),
}

/// Persisted resume point: the highest committed transaction id and the
/// schema generation it was processed under, plus a hash of the module
/// directory list last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterCursor {
    pub notifier_id: u64,
    pub schema_id: u64,
    pub modules_hash: [u8; MODULES_HASH_LEN],
}

impl Default for MasterCursor {
    fn default() -> Self {
        Self { notifier_id: 0, schema_id: 0, modules_hash: [0; MODULES_HASH_LEN] }
    }
}

impl MasterCursor {
    /// Load the cursor, or the zero cursor when the file does not exist yet
    /// (first start on an empty data directory).
    pub fn load(path: &Path) -> Result<Self, CursorError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.len() != CURSOR_LEN {
            return Err(CursorError::BadLength(bytes.len()));
        }
        let mut notifier_id = [0u8; 8];
        notifier_id.copy_from_slice(&bytes[0..8]);
        let mut schema_id = [0u8; 8];
        schema_id.copy_from_slice(&bytes[8..16]);
        let mut modules_hash = [0u8; MODULES_HASH_LEN];
        modules_hash.copy_from_slice(&bytes[16..CURSOR_LEN]);
        Ok(Self {
            notifier_id: u64::from_le_bytes(notifier_id),
            schema_id: u64::from_le_bytes(schema_id),
            modules_hash,
        })
    }

    /// Atomically persist the cursor.
    pub fn store(&self, path: &Path) -> Result<(), CursorError> {
        let mut bytes = Vec::with_capacity(CURSOR_LEN);
        bytes.extend_from_slice(&self.notifier_id.to_le_bytes());
        bytes.extend_from_slice(&self.schema_id.to_le_bytes());
        bytes.extend_from_slice(&self.modules_hash);

        let tmp_path = path.with_extension("state.tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&bytes)?;
        tmp.sync_data()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "cursor_tests.rs"]
mod tests;
