// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The ordered set of loaded handlers.
//!
//! Handlers run in ascending priority with ties broken by load order; the
//! `replication` handler is pinned first. Each handler carries its durable
//! state (READY bit, set once `initialize` has succeeded) and a lazy prerun
//! flag that resets at postrun. Every hook invocation goes through the
//! privilege guard.

use std::collections::HashSet;
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use shadow_core::{ChangeKind, Dn, Entry, HandlerInfo, HandlerState};
use shadow_storage::HandlerStateStore;

use crate::handler::{Handler, HandlerError};
use crate::host::{self, LoadedModule};
use crate::privileges::PrivilegeGuard;

struct LoadedHandler {
    info: HandlerInfo,
    handler: Box<dyn Handler>,
    state: HandlerState,
    load_order: u32,
    prerun_done: bool,
    /// Origin path for dynamically loaded modules; feeds the modules hash.
    path: Option<PathBuf>,
    /// Keeps the shared object mapped for as long as the handler lives.
    _library: Option<libloading::Library>,
}

/// Priority-ordered handler container with a per-handler durable state
/// store.
pub struct ModuleRegistry {
    handlers: Vec<LoadedHandler>,
    state_store: HandlerStateStore,
    privileges: PrivilegeGuard,
    load_counter: u32,
}

impl ModuleRegistry {
    pub fn new(state_store: HandlerStateStore, privileges: PrivilegeGuard) -> Self {
        Self { handlers: Vec::new(), state_store, privileges, load_counter: 0 }
    }

    /// Register a statically linked handler. Duplicate names are rejected
    /// with a warning; the first load wins.
    pub fn register(&mut self, handler: Box<dyn Handler>) {
        self.insert(handler, None, None);
    }

    /// Load every module from `dirs`, skipping names already registered.
    /// Also used by the SIGHUP rescan.
    pub fn load_from_dirs(&mut self, dirs: &[PathBuf]) {
        for LoadedModule { path, handler, library } in host::scan_dirs(dirs) {
            self.insert(handler, Some(path), Some(library));
        }
    }

    fn insert(
        &mut self,
        handler: Box<dyn Handler>,
        path: Option<PathBuf>,
        library: Option<libloading::Library>,
    ) {
        let info = handler.info();
        if self.handlers.iter().any(|h| h.info.name == info.name) {
            warn!(handler = %info.name, "duplicate handler name, keeping the first");
            return;
        }
        let state = match self.state_store.load(&info.name) {
            Ok(state) => state,
            Err(e) => {
                warn!(handler = %info.name, error = %e, "cannot read handler state, assuming empty");
                HandlerState::empty()
            }
        };
        info!(
            handler = %info.name,
            priority = info.priority,
            dynamic = path.is_some(),
            "registered handler"
        );
        self.handlers.push(LoadedHandler {
            info,
            handler,
            state,
            load_order: self.load_counter,
            prerun_done: false,
            path,
            _library: library,
        });
        self.load_counter += 1;
        self.handlers.sort_by(|a, b| {
            let rank = |h: &LoadedHandler| u8::from(!h.info.is_replication());
            rank(a)
                .cmp(&rank(b))
                .then(a.info.priority.total_cmp(&b.info.priority))
                .then(a.load_order.cmp(&b.load_order))
        });
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn info(&self, index: usize) -> Option<&HandlerInfo> {
        self.handlers.get(index).map(|h| &h.info)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.info.name.clone()).collect()
    }

    /// Whether the handler at `index` may receive transactions.
    pub fn is_ready(&self, index: usize) -> bool {
        self.handlers.get(index).is_some_and(|h| h.state.contains(HandlerState::READY))
    }

    /// Run `initialize` for every handler that is not READY yet; successful
    /// handlers get their READY bit persisted.
    pub fn initialize_all(&mut self) {
        let privileges = self.privileges;
        let state_store = &self.state_store;
        for h in &mut self.handlers {
            if h.state.contains(HandlerState::READY) {
                continue;
            }
            let result = h.handler.initialize();
            privileges.restore();
            match result {
                Ok(()) => {
                    h.state.insert(HandlerState::READY);
                    if let Err(e) = state_store.store(&h.info.name, h.state) {
                        warn!(handler = %h.info.name, error = %e, "cannot persist handler state");
                    }
                }
                Err(e) => {
                    warn!(handler = %h.info.name, error = %e, "handler initialize failed");
                }
            }
        }
    }

    /// Invoke `handle` at `index`, ensuring `prerun` ran first in this run.
    pub fn invoke_handle(
        &mut self,
        index: usize,
        dn: &Dn,
        new: Option<&Entry>,
        old: Option<&Entry>,
        kind: ChangeKind,
    ) -> Result<(), HandlerError> {
        let privileges = self.privileges;
        let Some(h) = self.handlers.get_mut(index) else {
            return Err(HandlerError::new(format!("no handler at index {index}")));
        };
        if !h.prerun_done {
            let result = h.handler.prerun();
            privileges.restore();
            result?;
            h.prerun_done = true;
        }
        let result = h.handler.handle(dn, new, old, kind);
        privileges.restore();
        result
    }

    /// Idle notification; also ends the current "run" so the next dispatch
    /// calls `prerun` again.
    pub fn postrun_all(&mut self) {
        let privileges = self.privileges;
        for h in &mut self.handlers {
            if h.prerun_done {
                if let Err(e) = h.handler.postrun() {
                    warn!(handler = %h.info.name, error = %e, "handler postrun failed");
                }
                privileges.restore();
                h.prerun_done = false;
            }
        }
    }

    /// Shutdown notification; persists every handler's state.
    pub fn clean_all(&mut self) {
        let privileges = self.privileges;
        let state_store = &self.state_store;
        for h in &mut self.handlers {
            if let Err(e) = h.handler.clean() {
                warn!(handler = %h.info.name, error = %e, "handler clean failed");
            }
            privileges.restore();
            if let Err(e) = state_store.store(&h.info.name, h.state) {
                warn!(handler = %h.info.name, error = %e, "cannot persist handler state");
            }
        }
    }

    /// Broadcast one configuration key/value to every handler.
    pub fn setdata_all(&mut self, key: &str, value: &[u8]) {
        let privileges = self.privileges;
        for h in &mut self.handlers {
            if let Err(e) = h.handler.setdata(key, value) {
                warn!(handler = %h.info.name, key, error = %e, "handler setdata failed");
            }
            privileges.restore();
        }
    }

    /// Rescan module directories (SIGHUP): new module files are loaded,
    /// already-registered names are left untouched.
    pub fn rescan(&mut self, dirs: &[PathBuf]) {
        let known: HashSet<PathBuf> =
            self.handlers.iter().filter_map(|h| h.path.clone()).collect();
        for LoadedModule { path, handler, library } in host::scan_dirs(dirs) {
            if known.contains(&path) {
                continue;
            }
            self.insert(handler, Some(path), Some(library));
        }
        self.initialize_all();
    }

    /// Hash over the loaded module set (names and origin paths), persisted
    /// in the master cursor so operators can see when the set changed.
    pub fn modules_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        let mut lines: Vec<String> = self
            .handlers
            .iter()
            .map(|h| match &h.path {
                Some(path) => format!("{}={}", h.info.name, path.display()),
                None => h.info.name.clone(),
            })
            .collect();
        lines.sort();
        for line in lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
