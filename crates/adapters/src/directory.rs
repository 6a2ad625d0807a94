// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory client: base-scope reads against the authoritative LDAP
//! directory and its change-log subtree.
//!
//! The listener never writes to the directory. Server-down class failures
//! reconnect and retry the same operation under the attempt budget;
//! `NO_SUCH_OBJECT` on an entry read is a normal outcome (the entry vanished
//! between announcement and fetch) and surfaces as `None`.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapError, Scope, SearchEntry};
use thiserror::Error;
use tracing::{info, warn};

use std::time::Duration;

use shadow_core::{ChangeKind, Dn, Entry};

use crate::retry::Backoff;

const NO_SUCH_OBJECT: u32 = 32;

/// Errors surfaced to the dispatcher.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unreachable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("directory error: {0}")]
    Ldap(String),

    #[error("change log has no record for transaction {0}")]
    MissingChangeEntry(u64),

    #[error("malformed change log record: {0}")]
    BadChangeEntry(String),
}

/// Read access to the authoritative directory.
#[async_trait]
pub trait DirectoryAdapter: Send {
    /// Fetch one entry with all attributes; `None` when it does not exist.
    async fn read(&mut self, dn: &Dn) -> Result<Option<Entry>, DirectoryError>;

    /// Fetch the `(dn, command)` pair for a change-log id. Used when the
    /// notifier reply omits the details.
    async fn read_change(&mut self, id: u64) -> Result<(Dn, ChangeKind), DirectoryError>;

    /// Tear down and rebind (schema fence, keepalive failure).
    async fn reconnect(&mut self) -> Result<(), DirectoryError>;

    /// Tear down only; the next read rebinds.
    async fn disconnect(&mut self);
}

/// Connection settings for [`LdapDirectory`].
#[derive(Debug, Clone)]
pub struct LdapDirectoryConfig {
    pub url: String,
    pub bind_dn: String,
    pub password: String,
    /// Reconnect/retry attempt budget; 0 = unlimited.
    pub max_attempts: u32,
    /// Per-operation timeout.
    pub op_timeout: Duration,
}

impl LdapDirectoryConfig {
    pub fn new(
        url: impl Into<String>,
        bind_dn: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            bind_dn: bind_dn.into(),
            password: password.into(),
            max_attempts: 0,
            op_timeout: Duration::from_secs(300),
        }
    }
}

/// The production directory client.
pub struct LdapDirectory {
    config: LdapDirectoryConfig,
    ldap: Option<Ldap>,
}

impl LdapDirectory {
    pub fn new(config: LdapDirectoryConfig) -> Self {
        Self { config, ldap: None }
    }

    async fn ensure_bound(&mut self) -> Result<(), DirectoryError> {
        if self.ldap.is_some() {
            return Ok(());
        }
        let mut backoff = Backoff::new(self.config.max_attempts);
        loop {
            match open_and_bind(&self.config).await {
                Ok(ldap) => {
                    info!(url = %self.config.url, "bound to directory");
                    self.ldap = Some(ldap);
                    return Ok(());
                }
                Err(e) if is_transient(&e) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            url = %self.config.url,
                            error = %e,
                            delay_secs = delay.as_secs(),
                            "directory bind failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(DirectoryError::Exhausted {
                            attempts: backoff.attempts(),
                            last: e.to_string(),
                        });
                    }
                },
                Err(e) => return Err(DirectoryError::Ldap(e.to_string())),
            }
        }
    }

    /// Base-scope search with the server-down retry envelope.
    async fn search_base(
        &mut self,
        base: &str,
        attrs: Vec<&'static str>,
    ) -> Result<Option<Entry>, DirectoryError> {
        let mut attempts = 0u32;
        loop {
            self.ensure_bound().await?;
            let Some(ldap) = self.ldap.as_mut() else {
                return Err(DirectoryError::Ldap("not bound".to_string()));
            };
            let result = ldap
                .with_timeout(self.config.op_timeout)
                .search(base, Scope::Base, "(objectClass=*)", attrs.clone())
                .await
                .and_then(|r| r.success());
            match result {
                Ok((entries, _res)) => {
                    return Ok(entries
                        .into_iter()
                        .next()
                        .map(|re| to_entry(SearchEntry::construct(re))));
                }
                Err(e) if result_code(&e) == Some(NO_SUCH_OBJECT) => return Ok(None),
                Err(e) if is_transient(&e) => {
                    attempts += 1;
                    warn!(base, error = %e, "directory read failed, reconnecting");
                    self.ldap = None;
                    if self.config.max_attempts != 0 && attempts >= self.config.max_attempts {
                        return Err(DirectoryError::Exhausted {
                            attempts,
                            last: e.to_string(),
                        });
                    }
                }
                Err(e) => return Err(DirectoryError::Ldap(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl DirectoryAdapter for LdapDirectory {
    async fn read(&mut self, dn: &Dn) -> Result<Option<Entry>, DirectoryError> {
        // "+" asks for operational attributes as well
        self.search_base(dn.as_str(), vec!["*", "+"]).await
    }

    async fn read_change(&mut self, id: u64) -> Result<(Dn, ChangeKind), DirectoryError> {
        let base = format!("reqSession={id},cn=translog");
        let entry = self
            .search_base(&base, vec!["reqDN", "reqType"])
            .await?
            .ok_or(DirectoryError::MissingChangeEntry(id))?;
        change_from_entry(id, &entry)
    }

    async fn reconnect(&mut self) -> Result<(), DirectoryError> {
        self.disconnect().await;
        self.ensure_bound().await
    }

    async fn disconnect(&mut self) {
        if let Some(mut ldap) = self.ldap.take() {
            let _ = ldap.unbind().await;
        }
    }
}

async fn open_and_bind(config: &LdapDirectoryConfig) -> Result<Ldap, LdapError> {
    let (conn, mut ldap) = LdapConnAsync::new(&config.url).await?;
    ldap3::drive!(conn);
    ldap.with_timeout(config.op_timeout)
        .simple_bind(&config.bind_dn, &config.password)
        .await?
        .success()?;
    Ok(ldap)
}

fn is_transient(e: &LdapError) -> bool {
    matches!(
        e,
        LdapError::Io { .. }
            | LdapError::EndOfStream
            | LdapError::Timeout { .. }
            | LdapError::OpSend { .. }
            | LdapError::ResultRecv { .. }
    )
}

fn result_code(e: &LdapError) -> Option<u32> {
    match e {
        LdapError::LdapResult { result } => Some(result.rc),
        _ => None,
    }
}

fn to_entry(se: SearchEntry) -> Entry {
    let mut entry = Entry::new(Dn::new(&se.dn));
    for (name, values) in se.attrs {
        entry.set(&name, values.into_iter().map(String::into_bytes).collect());
    }
    for (name, values) in se.bin_attrs {
        for value in values {
            entry.add_value(&name, value);
        }
    }
    entry
}

/// Map a change-log entry (`reqDN`, `reqType`) to the transaction details.
fn change_from_entry(id: u64, entry: &Entry) -> Result<(Dn, ChangeKind), DirectoryError> {
    let req_dn = entry
        .first_str("reqDN")
        .ok_or_else(|| DirectoryError::BadChangeEntry(format!("record {id} lacks reqDN")))?;
    let req_type = entry
        .first_str("reqType")
        .ok_or_else(|| DirectoryError::BadChangeEntry(format!("record {id} lacks reqType")))?;
    let mut chars = req_type.chars();
    let kind = match (chars.next(), chars.next()) {
        (Some(c), None) => ChangeKind::from_char(c)
            .map_err(|e| DirectoryError::BadChangeEntry(format!("record {id}: {e}")))?,
        _ => {
            return Err(DirectoryError::BadChangeEntry(format!(
                "record {id} has reqType {req_type:?}"
            )));
        }
    };
    Ok((Dn::new(req_dn), kind))
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeState {
        entries: HashMap<Dn, Entry>,
        changes: HashMap<u64, (Dn, ChangeKind)>,
        reads: Vec<Dn>,
        reconnects: u32,
        disconnects: u32,
    }

    /// In-memory directory for engine tests. Clones share state so tests
    /// mutate the tree while the runtime holds its own handle.
    #[derive(Clone, Default)]
    pub struct FakeDirectory {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, entry: Entry) {
            self.inner.lock().entries.insert(entry.dn().clone(), entry);
        }

        pub fn remove(&self, dn: &Dn) {
            self.inner.lock().entries.remove(dn);
        }

        pub fn set_change(&self, id: u64, dn: Dn, kind: ChangeKind) {
            self.inner.lock().changes.insert(id, (dn, kind));
        }

        pub fn reads(&self) -> Vec<Dn> {
            self.inner.lock().reads.clone()
        }

        pub fn reconnects(&self) -> u32 {
            self.inner.lock().reconnects
        }

        pub fn disconnects(&self) -> u32 {
            self.inner.lock().disconnects
        }
    }

    #[async_trait]
    impl DirectoryAdapter for FakeDirectory {
        async fn read(&mut self, dn: &Dn) -> Result<Option<Entry>, DirectoryError> {
            let mut state = self.inner.lock();
            state.reads.push(dn.clone());
            Ok(state.entries.get(dn).cloned())
        }

        async fn read_change(&mut self, id: u64) -> Result<(Dn, ChangeKind), DirectoryError> {
            let state = self.inner.lock();
            state.changes.get(&id).cloned().ok_or(DirectoryError::MissingChangeEntry(id))
        }

        async fn reconnect(&mut self) -> Result<(), DirectoryError> {
            self.inner.lock().reconnects += 1;
            Ok(())
        }

        async fn disconnect(&mut self) {
            self.inner.lock().disconnects += 1;
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeDirectory;

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
