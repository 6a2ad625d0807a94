// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The listener runtime: one control flow that owns every component.
//!
//! [`Runtime::run`] loops over [`Runtime::tick`]: check the supervisor
//! guards, ask the notifier for the transaction after the cursor, fence on
//! schema advances, then drive the dispatcher. Signals are observed between
//! ticks and between transactions of a batch, never inside one: a
//! transaction past its cache commit always completes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use shadow_adapters::{DirectoryAdapter, NotifierAdapter};
use shadow_core::{Clock, Transaction};
use shadow_storage::{EntryCache, MasterCursor, MetaTable, TransactionLog};

use crate::error::RuntimeError;
use crate::registry::ModuleRegistry;
use crate::supervisor;

/// Engine settings; paths are derived from `data_dir`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub module_dirs: Vec<PathBuf>,
    /// Idle interval after which handlers get `postrun`.
    pub postrun_idle: Duration,
    /// Idle interval after which the notifier keepalive fires.
    pub alive_idle: Duration,
    /// Free-space floor per monitored filesystem; 0 disables the watchdog.
    pub min_free_mib: u64,
    pub monitored_paths: Vec<PathBuf>,
    pub write_transaction_file: bool,
    /// Upper bound on one notifier wait; idle bookkeeping runs between
    /// waits, so this stays well below the idle intervals.
    pub poll_interval: Duration,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            module_dirs: Vec::new(),
            postrun_idle: Duration::from_secs(300),
            alive_idle: Duration::from_secs(300),
            min_free_mib: 0,
            monitored_paths: vec![data_dir.clone()],
            write_transaction_file: false,
            poll_interval: Duration::from_secs(5),
            data_dir,
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.cache_dir().join("master.state")
    }

    pub fn handler_state_dir(&self) -> PathBuf {
        self.cache_dir().join("handlers")
    }
}

/// Cooperative stop request, set from signal tasks.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// SIGHUP request to rescan module directories.
#[derive(Clone, Default)]
pub struct ReloadFlag(Arc<AtomicBool>);

impl ReloadFlag {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// All announced transactions up to `through` are committed.
    Processed { through: u64 },
    /// Nothing announced within the poll interval.
    Idle,
    /// The notifier re-announced the already-committed cursor id.
    Duplicate,
}

/// The single-writer replication engine.
pub struct Runtime<N, D, C> {
    pub(crate) config: EngineConfig,
    pub(crate) notifier: N,
    pub(crate) directory: D,
    clock: C,
    pub(crate) registry: ModuleRegistry,
    pub(crate) cache: EntryCache,
    pub(crate) meta: MetaTable,
    pub(crate) txlog: Option<TransactionLog>,
    pub(crate) cursor: MasterCursor,
    cursor_path: PathBuf,
    shutdown: ShutdownFlag,
    reload: ReloadFlag,
    last_activity: Instant,
    last_alive: Instant,
    postrun_fired: bool,
}

impl<N, D, C> Runtime<N, D, C>
where
    N: NotifierAdapter,
    D: DirectoryAdapter,
    C: Clock,
{
    /// Open the durable state under `config.data_dir`, initialize handlers,
    /// and position on the persisted cursor.
    pub fn new(
        config: EngineConfig,
        notifier: N,
        directory: D,
        clock: C,
        mut registry: ModuleRegistry,
    ) -> Result<Self, RuntimeError> {
        let cache_dir = config.cache_dir();
        let cache = EntryCache::open(&cache_dir)?;
        let meta = MetaTable::open(&cache_dir)?;
        let cursor_path = config.cursor_path();
        let mut cursor = MasterCursor::load(&cursor_path)?;
        let txlog = if config.write_transaction_file {
            Some(TransactionLog::open(
                &config.data_dir.join("transaction"),
                &config.data_dir.join("transaction.index"),
            )?)
        } else {
            None
        };

        registry.initialize_all();
        let modules_hash = registry.modules_hash();
        if cursor.notifier_id != 0 && cursor.modules_hash != modules_hash {
            info!("module set changed since the last run");
        }
        cursor.modules_hash = modules_hash;
        cursor.store(&cursor_path)?;

        let now = clock.now();
        Ok(Self {
            config,
            notifier,
            directory,
            clock,
            registry,
            cache,
            meta,
            txlog,
            cursor,
            cursor_path,
            shutdown: ShutdownFlag::default(),
            reload: ReloadFlag::default(),
            last_activity: now,
            last_alive: now,
            postrun_fired: false,
        })
    }

    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    pub fn reload_flag(&self) -> ReloadFlag {
        self.reload.clone()
    }

    /// Highest committed transaction id.
    pub fn cursor_id(&self) -> u64 {
        self.cursor.notifier_id
    }

    pub fn schema_id(&self) -> u64 {
        self.cursor.schema_id
    }

    /// Broadcast a configuration pair to every handler.
    pub fn setdata(&mut self, key: &str, value: &[u8]) {
        self.registry.setdata_all(key, value);
    }

    /// The entry cache (exposed for resync tooling and tests; the runtime
    /// remains the only writer).
    pub fn cache(&mut self) -> &mut EntryCache {
        &mut self.cache
    }

    pub fn txlog(&mut self) -> Option<&mut TransactionLog> {
        self.txlog.as_mut()
    }

    /// Run until shutdown is requested or a fatal error surfaces. Handlers
    /// get `clean` on the way out either way.
    pub async fn run(&mut self) -> Result<(), RuntimeError> {
        info!(
            cursor = self.cursor.notifier_id,
            schema = self.cursor.schema_id,
            handlers = self.registry.len(),
            "listener running"
        );
        let result = self.run_loop().await;
        self.registry.clean_all();
        match &result {
            Ok(()) => info!("listener stopped"),
            Err(e) => error!(error = %e, "pipeline halted"),
        }
        result
    }

    async fn run_loop(&mut self) -> Result<(), RuntimeError> {
        while !self.shutdown.requested() {
            self.tick().await?;
        }
        Ok(())
    }

    /// One scheduling step: guards, one bounded notifier wait, and the
    /// dispatch of whatever that wait announced.
    pub async fn tick(&mut self) -> Result<Tick, RuntimeError> {
        supervisor::check_quarantine(&self.config.data_dir)?;
        supervisor::check_free_space(&self.config.monitored_paths, self.config.min_free_mib)?;
        if self.reload.take() {
            info!("rescanning module directories");
            self.registry.rescan(&self.config.module_dirs);
            self.cursor.modules_hash = self.registry.modules_hash();
            self.cursor.store(&self.cursor_path)?;
        }

        let expected = self.cursor.notifier_id + 1;
        let change = match self.notifier.get_next_id(expected, self.config.poll_interval).await? {
            Some(change) => change,
            None => {
                self.handle_idle().await?;
                return Ok(Tick::Idle);
            }
        };

        self.mark_activity();
        if change.id == self.cursor.notifier_id {
            debug!(id = change.id, "announcement for already-committed transaction");
            return Ok(Tick::Duplicate);
        }
        self.schema_fence().await?;

        match (change.dn.clone(), change.kind) {
            (Some(dn), Some(kind)) => {
                // Legacy protocol: details inline, ids must not skip.
                if change.id != expected {
                    return Err(RuntimeError::Ordering { expected, got: change.id });
                }
                self.process(Transaction::new(change.id, dn, kind)).await?;
                Ok(Tick::Processed { through: change.id })
            }
            _ => {
                // Modern protocol: the notifier announces the newest id;
                // details come from the change log, one id at a time.
                if change.id < expected {
                    return Err(RuntimeError::Ordering { expected, got: change.id });
                }
                let mut through = self.cursor.notifier_id;
                for id in expected..=change.id {
                    if self.shutdown.requested() {
                        break;
                    }
                    let (dn, kind) = self.directory.read_change(id).await?;
                    self.process(Transaction::new(id, dn, kind)).await?;
                    through = id;
                }
                Ok(Tick::Processed { through })
            }
        }
    }

    fn mark_activity(&mut self) {
        self.last_activity = self.clock.now();
        self.postrun_fired = false;
    }

    async fn handle_idle(&mut self) -> Result<(), RuntimeError> {
        let now = self.clock.now();
        let idle = now.duration_since(self.last_activity);
        if !self.postrun_fired && idle >= self.config.postrun_idle {
            debug!("pipeline idle, running postrun hooks");
            self.registry.postrun_all();
            self.postrun_fired = true;
        }
        if idle >= self.config.alive_idle
            && now.duration_since(self.last_alive) >= self.config.alive_idle
        {
            self.last_alive = now;
            if !self.notifier.alive().await? {
                warn!("notifier keepalive failed, tearing down connections");
                self.notifier.disconnect().await;
                self.directory.disconnect().await;
            }
        }
        Ok(())
    }

    /// Reinitialize the directory binding when the authoritative schema
    /// generation has advanced past the persisted one.
    async fn schema_fence(&mut self) -> Result<(), RuntimeError> {
        let schema = self.notifier.get_schema_id().await?;
        if schema > self.cursor.schema_id {
            info!(
                from = self.cursor.schema_id,
                to = schema,
                "schema generation advanced, rebinding directory"
            );
            self.directory.reconnect().await?;
            self.cursor.schema_id = schema;
            self.cursor.store(&self.cursor_path)?;
            self.meta.set_u64("schema_id", schema)?;
        }
        Ok(())
    }

    pub(crate) fn advance_cursor(&mut self, id: u64) -> Result<(), RuntimeError> {
        self.cursor.notifier_id = id;
        self.cursor.store(&self.cursor_path)?;
        self.meta.set_u64("notifier_id", id)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
