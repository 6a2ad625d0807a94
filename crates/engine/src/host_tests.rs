// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host tests run without real shared objects: loading garbage files and
//! scanning empty or missing directories must degrade to empty results.

use super::*;
use tempfile::tempdir;

#[test]
fn missing_directory_yields_nothing() {
    let modules = scan_dirs(&[PathBuf::from("/nonexistent/shadow-modules")]);
    assert!(modules.is_empty());
}

#[test]
fn empty_directory_yields_nothing() {
    let dir = tempdir().unwrap();
    let modules = scan_dirs(&[dir.path().to_path_buf()]);
    assert!(modules.is_empty());
}

#[test]
fn non_module_files_are_ignored() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a module").unwrap();
    std::fs::write(dir.path().join("handler.py"), "also not a module").unwrap();
    let modules = scan_dirs(&[dir.path().to_path_buf()]);
    assert!(modules.is_empty());
}

#[test]
fn garbage_dylib_is_skipped_not_fatal() {
    let dir = tempdir().unwrap();
    let name = format!("broken.{}", std::env::consts::DLL_EXTENSION);
    std::fs::write(dir.path().join(name), b"\x7fELF not really").unwrap();
    // Partial loads are permitted: the bad file is logged and skipped
    let modules = scan_dirs(&[dir.path().to_path_buf()]);
    assert!(modules.is_empty());
}
