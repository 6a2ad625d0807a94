// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests: a recording handler and a runtime
//! builder wired to the fake adapters.

use parking_lot::Mutex;
use std::sync::Arc;

use shadow_adapters::{FakeDirectory, FakeNotifier};
use shadow_core::{ChangeKind, Dn, Entry, FakeClock, HandlerInfo};
use shadow_storage::HandlerStateStore;

use crate::handler::{Handler, HandlerError};
use crate::privileges::PrivilegeGuard;
use crate::registry::ModuleRegistry;
use crate::runtime::{EngineConfig, Runtime};

/// Shared hook journal: `"<handler>:<hook>"`, with DN and kind appended for
/// `handle` calls.
#[derive(Clone, Default)]
pub struct HookLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl HookLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Only `handle` invocations, as `"<handler>:<dn>:<kind>"`.
    pub fn handles(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("handle/").map(str::to_string))
            .collect()
    }

    pub fn count_of(&self, needle: &str) -> usize {
        self.events().iter().filter(|e| e.contains(needle)).count()
    }
}

/// Scriptable handler that records every hook invocation.
pub struct TestHandler {
    info: HandlerInfo,
    log: HookLog,
    fail_handles: Arc<Mutex<u32>>,
    fail_initialize: bool,
}

impl TestHandler {
    pub fn new(info: HandlerInfo, log: HookLog) -> Self {
        Self { info, log, fail_handles: Arc::new(Mutex::new(0)), fail_initialize: false }
    }

    /// Handle for scripting failures after the handler moved into the
    /// registry.
    pub fn failure_switch(&self) -> Arc<Mutex<u32>> {
        self.fail_handles.clone()
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }
}

impl Handler for TestHandler {
    fn info(&self) -> HandlerInfo {
        self.info.clone()
    }

    fn initialize(&mut self) -> Result<(), HandlerError> {
        self.log.push(format!("{}:initialize", self.info.name));
        if self.fail_initialize {
            return Err(HandlerError::new("initialize scripted to fail"));
        }
        Ok(())
    }

    fn prerun(&mut self) -> Result<(), HandlerError> {
        self.log.push(format!("{}:prerun", self.info.name));
        Ok(())
    }

    fn handle(
        &mut self,
        dn: &Dn,
        _new: Option<&Entry>,
        _old: Option<&Entry>,
        kind: ChangeKind,
    ) -> Result<(), HandlerError> {
        self.log.push(format!("handle/{}:{}:{}", self.info.name, dn, kind));
        let mut remaining = self.fail_handles.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(HandlerError::new("handle scripted to fail"));
        }
        Ok(())
    }

    fn postrun(&mut self) -> Result<(), HandlerError> {
        self.log.push(format!("{}:postrun", self.info.name));
        Ok(())
    }

    fn clean(&mut self) -> Result<(), HandlerError> {
        self.log.push(format!("{}:clean", self.info.name));
        Ok(())
    }

    fn setdata(&mut self, key: &str, _value: &[u8]) -> Result<(), HandlerError> {
        self.log.push(format!("{}:setdata:{}", self.info.name, key));
        Ok(())
    }
}

/// A runtime over fake adapters plus the handles tests assert against.
pub struct Fixture {
    pub runtime: Runtime<FakeNotifier, FakeDirectory, FakeClock>,
    pub notifier: FakeNotifier,
    pub directory: FakeDirectory,
    pub clock: FakeClock,
    pub log: HookLog,
}

/// Build a fixture with the given handlers registered in order.
pub fn fixture(
    data_dir: &std::path::Path,
    log: HookLog,
    config_tweak: impl FnOnce(&mut EngineConfig),
    handlers: Vec<TestHandler>,
) -> Fixture {
    let mut config = EngineConfig::new(data_dir);
    config_tweak(&mut config);

    let state_store = HandlerStateStore::open(&config.handler_state_dir()).expect("state dir");
    let mut registry = ModuleRegistry::new(state_store, PrivilegeGuard::none());
    for handler in handlers {
        registry.register(Box::new(handler));
    }

    let notifier = FakeNotifier::new();
    let directory = FakeDirectory::new();
    let clock = FakeClock::new();
    let runtime = Runtime::new(
        config,
        notifier.clone(),
        directory.clone(),
        clock.clone(),
        registry,
    )
    .expect("runtime");
    Fixture { runtime, notifier, directory, clock, log }
}

pub fn entry_with(dn: &str, attrs: &[(&str, &[&[u8]])]) -> Entry {
    let mut entry = Entry::new(Dn::new(dn));
    for (name, values) in attrs {
        entry.set(*name, values.iter().map(|v| v.to_vec()).collect());
    }
    entry
}
