// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-transaction dispatch: fetch, diff, gate, invoke, commit, advance.
//!
//! The order is fixed: handlers run before the cache write, the cache write
//! precedes the transaction-log append, and the cursor advances last. A
//! crash anywhere in between replays the transaction on restart; the
//! module-present gating makes the replay a near-no-op.

use tracing::{debug, warn};

use shadow_adapters::{DirectoryAdapter, NotifierAdapter};
use shadow_core::{changed_attributes, ChangeKind, Clock, Entry, EntryRecord, Transaction};

use crate::error::RuntimeError;
use crate::runtime::Runtime;

impl<N, D, C> Runtime<N, D, C>
where
    N: NotifierAdapter,
    D: DirectoryAdapter,
    C: Clock,
{
    /// Drive one transaction end to end. Handler failures are contained;
    /// any error that escapes leaves the cursor untouched.
    pub(crate) async fn process(&mut self, txn: Transaction) -> Result<(), RuntimeError> {
        debug!(id = txn.id, dn = %txn.dn, kind = %txn.kind, "processing transaction");
        let new_entry = if txn.kind.is_delete() {
            None
        } else {
            // A vanished entry on a modify means it was deleted between the
            // announcement and our fetch; the pipeline proceeds as a delete.
            self.directory.read(&txn.dn).await?
        };
        let old_record = self.cache.get(&txn.dn)?;

        match new_entry {
            Some(entry) => self.apply_update(&txn, entry, old_record)?,
            None => self.apply_delete(&txn, old_record)?,
        }

        if let Some(txlog) = self.txlog.as_mut() {
            txlog.append(&txn)?;
        }
        self.advance_cursor(txn.id)
    }

    fn apply_update(
        &mut self,
        txn: &Transaction,
        new_entry: Entry,
        old_record: Option<EntryRecord>,
    ) -> Result<(), RuntimeError> {
        let changed = changed_attributes(old_record.as_ref().map(|r| &r.entry), Some(&new_entry));
        let old_entry = old_record.as_ref().map(|r| &r.entry);
        let mut record = EntryRecord::new(new_entry);

        for index in 0..self.registry.len() {
            if !self.registry.is_ready(index) {
                continue;
            }
            let Some(info) = self.registry.info(index).cloned() else {
                continue;
            };
            let was_present =
                old_record.as_ref().is_some_and(|r| r.is_present(&info.name));

            // Effectively unchanged for this handler: re-assert without
            // invoking. `replication` is exempt.
            if !info.is_replication() && was_present && !info.attributes_relevant(&changed) {
                debug!(handler = %info.name, dn = %txn.dn, "handler up to date");
                record.mark_present(&info.name);
                continue;
            }

            // Filter gate; a previously-present handler that stops matching
            // is removed from the set without notification.
            if !info.is_replication() && !info.filter_matches(&record.entry) {
                debug!(handler = %info.name, dn = %txn.dn, "filter does not match");
                continue;
            }

            let kind = presented_kind(&info, txn.kind);
            match self.registry.invoke_handle(
                index,
                &txn.dn,
                Some(&record.entry),
                old_entry,
                kind,
            ) {
                Ok(()) => record.mark_present(&info.name),
                Err(e) => {
                    warn!(handler = %info.name, dn = %txn.dn, error = %e, "handler failed");
                }
            }
        }

        self.cache.put(&record)?;
        Ok(())
    }

    fn apply_delete(
        &mut self,
        txn: &Transaction,
        old_record: Option<EntryRecord>,
    ) -> Result<(), RuntimeError> {
        let old_entry = old_record.as_ref().map(|r| &r.entry);

        for index in 0..self.registry.len() {
            if !self.registry.is_ready(index) {
                continue;
            }
            let Some(info) = self.registry.info(index).cloned() else {
                continue;
            };
            let was_present =
                old_record.as_ref().is_some_and(|r| r.is_present(&info.name));
            if !(was_present || info.handle_every_delete || info.is_replication()) {
                continue;
            }
            if let Err(e) =
                self.registry.invoke_handle(index, &txn.dn, None, old_entry, ChangeKind::Delete)
            {
                warn!(handler = %info.name, dn = %txn.dn, error = %e, "handler failed on delete");
            }
        }

        self.cache.delete(&txn.dn)?;
        Ok(())
    }
}

/// Handlers that did not opt into the four-argument form never see MODRDN;
/// the change is presented as a modify of the surviving entry.
fn presented_kind(info: &shadow_core::HandlerInfo, kind: ChangeKind) -> ChangeKind {
    if kind == ChangeKind::ModRdn && !info.modrdn {
        ChangeKind::Modify
    } else {
        kind
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
