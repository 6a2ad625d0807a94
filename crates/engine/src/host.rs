// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared-object module host.
//!
//! Handler modules are platform dynamic libraries that export a
//! [`ModuleDecl`] under the [`MODULE_ENTRYPOINT`] symbol:
//!
//! ```ignore
//! #[no_mangle]
//! pub static shadow_module_decl: ModuleDecl =
//!     ModuleDecl { api_version: MODULE_API_VERSION, create: || Box::new(MyHandler) };
//! ```
//!
//! Directories are scanned in the configured order; files without the
//! platform dylib extension are ignored. A module that fails to load is
//! logged and skipped; partial loads are permitted.

use std::path::{Path, PathBuf};

use libloading::Library;
use thiserror::Error;
use tracing::warn;

use crate::handler::Handler;

/// Symbol a module must export.
pub const MODULE_ENTRYPOINT: &[u8] = b"shadow_module_decl\0";

/// Bumped on any breaking change to the [`Handler`] contract.
pub const MODULE_API_VERSION: u32 = 1;

/// Exported module descriptor.
#[repr(C)]
pub struct ModuleDecl {
    pub api_version: u32,
    pub create: fn() -> Box<dyn Handler>,
}

/// Errors loading one module file.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("library error: {0}")]
    Library(#[from] libloading::Error),

    #[error("module API {module_api} does not match host API {host_api}")]
    ApiMismatch { module_api: u32, host_api: u32 },
}

/// A handler instantiated from a shared object. The library handle must
/// outlive the handler and is kept alongside it.
pub struct LoadedModule {
    pub path: PathBuf,
    pub handler: Box<dyn Handler>,
    pub library: Library,
}

/// Scan `dirs` in order and instantiate every loadable module.
pub fn scan_dirs(dirs: &[PathBuf]) -> Vec<LoadedModule> {
    let mut modules = Vec::new();
    for dir in dirs {
        let mut paths = match module_files(dir) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot scan module directory");
                continue;
            }
        };
        paths.sort();
        for path in paths {
            match load_module(&path) {
                Ok(module) => modules.push(module),
                Err(e) => warn!(path = %path.display(), error = %e, "cannot load module"),
            }
        }
    }
    modules
}

fn module_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for dirent in std::fs::read_dir(dir)? {
        let path = dirent?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(std::env::consts::DLL_EXTENSION) {
            paths.push(path);
        }
    }
    Ok(paths)
}

fn load_module(path: &Path) -> Result<LoadedModule, HostError> {
    // Loading foreign code is inherently unsafe; the entrypoint contract is
    // guarded by api_version below.
    let library = unsafe { Library::new(path)? };
    let (module_api, create) = {
        let decl = unsafe { library.get::<*const ModuleDecl>(MODULE_ENTRYPOINT)? };
        let decl = unsafe { &**decl };
        (decl.api_version, decl.create)
    };
    if module_api != MODULE_API_VERSION {
        return Err(HostError::ApiMismatch { module_api, host_api: MODULE_API_VERSION });
    }
    let handler = create();
    Ok(LoadedModule { path: path.to_path_buf(), handler, library })
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
