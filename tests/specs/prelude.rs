//! Shared spec fixtures: a recording handler and a listener built over the
//! fake adapters with real on-disk state.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

use shadow_adapters::{FakeDirectory, FakeNotifier};
use shadow_core::{ChangeKind, Dn, Entry, FakeClock, HandlerInfo};
use shadow_engine::{EngineConfig, Handler, HandlerError, ModuleRegistry, PrivilegeGuard, Runtime};
use shadow_storage::HandlerStateStore;

pub type SpecRuntime = Runtime<FakeNotifier, FakeDirectory, FakeClock>;

/// Records every `handle` invocation as `"<name>:<dn>:<kind>"`.
pub struct RecordingHandler {
    info: HandlerInfo,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingHandler {
    pub fn new(info: HandlerInfo, calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self { info, calls }
    }
}

impl Handler for RecordingHandler {
    fn info(&self) -> HandlerInfo {
        self.info.clone()
    }

    fn handle(
        &mut self,
        dn: &Dn,
        _new: Option<&Entry>,
        _old: Option<&Entry>,
        kind: ChangeKind,
    ) -> Result<(), HandlerError> {
        self.calls.lock().push(format!("{}:{}:{}", self.info.name, dn, kind));
        Ok(())
    }
}

pub struct Listener {
    pub runtime: SpecRuntime,
    pub notifier: FakeNotifier,
    pub directory: FakeDirectory,
    pub clock: FakeClock,
    pub calls: Arc<Mutex<Vec<String>>>,
}

/// Build a listener over `data_dir` with the given handler manifests.
pub fn listener(data_dir: &Path, infos: Vec<HandlerInfo>) -> Listener {
    listener_with(data_dir, infos, |_| {})
}

pub fn listener_with(
    data_dir: &Path,
    infos: Vec<HandlerInfo>,
    tweak: impl FnOnce(&mut EngineConfig),
) -> Listener {
    let mut config = EngineConfig::new(data_dir);
    tweak(&mut config);

    let calls = Arc::new(Mutex::new(Vec::new()));
    let state_store =
        HandlerStateStore::open(&config.handler_state_dir()).expect("handler state dir");
    let mut registry = ModuleRegistry::new(state_store, PrivilegeGuard::none());
    for info in infos {
        registry.register(Box::new(RecordingHandler::new(info, calls.clone())));
    }

    let notifier = FakeNotifier::new();
    let directory = FakeDirectory::new();
    let clock = FakeClock::new();
    let runtime =
        Runtime::new(config, notifier.clone(), directory.clone(), clock.clone(), registry)
            .expect("runtime");
    Listener { runtime, notifier, directory, clock, calls }
}

pub fn entry(dn: &str, attrs: &[(&str, &str)]) -> Entry {
    let mut entry = Entry::new(Dn::new(dn));
    for (name, value) in attrs {
        entry.set(*name, vec![value.as_bytes().to_vec()]);
    }
    entry
}
