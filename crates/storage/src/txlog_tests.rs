// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use shadow_core::{ChangeKind, Dn, Transaction};
use std::io::Write as _;
use tempfile::tempdir;

fn txn(id: u64, dn: &str, kind: ChangeKind) -> Transaction {
    Transaction::new(id, Dn::new(dn), kind)
}

fn open(dir: &Path) -> TransactionLog {
    TransactionLog::open(&dir.join("transaction"), &dir.join("transaction.index")).unwrap()
}

#[test]
fn open_creates_both_files() {
    let dir = tempdir().unwrap();
    let log = open(dir.path());
    assert!(log.is_empty());
    assert!(dir.path().join("transaction").exists());
    assert!(dir.path().join("transaction.index").exists());
}

#[test]
fn append_and_lookup() {
    let dir = tempdir().unwrap();
    let mut log = open(dir.path());
    log.append(&txn(43, "cn=alice,ou=p", ChangeKind::Add)).unwrap();
    log.append(&txn(44, "cn=alice,ou=p", ChangeKind::Modify)).unwrap();
    log.append(&txn(45, "cn=bob", ChangeKind::Delete)).unwrap();

    assert_eq!(log.last_id(), Some(45));
    assert_eq!(log.len(), 3);
    assert_eq!(log.lookup(44).unwrap(), Some(txn(44, "cn=alice,ou=p", ChangeKind::Modify)));
    assert_eq!(log.lookup(43).unwrap(), Some(txn(43, "cn=alice,ou=p", ChangeKind::Add)));
    assert_eq!(log.lookup(45).unwrap(), Some(txn(45, "cn=bob", ChangeKind::Delete)));
    assert_eq!(log.lookup(46).unwrap(), None);
    assert_eq!(log.lookup(1).unwrap(), None);
}

#[test]
fn dn_with_spaces_round_trips() {
    let dir = tempdir().unwrap();
    let mut log = open(dir.path());
    let t = txn(1, "cn=smith\\, john,ou=people", ChangeKind::Add);
    log.append(&t).unwrap();
    assert_eq!(log.lookup(1).unwrap(), Some(t));
}

#[test]
fn gaps_and_regressions_are_rejected() {
    let dir = tempdir().unwrap();
    let mut log = open(dir.path());
    log.append(&txn(10, "cn=a", ChangeKind::Add)).unwrap();
    let err = log.append(&txn(12, "cn=a", ChangeKind::Modify)).unwrap_err();
    assert!(matches!(err, TxLogError::OutOfOrder { last: 10, got: 12 }));
    let err = log.append(&txn(9, "cn=a", ChangeKind::Modify)).unwrap_err();
    assert!(matches!(err, TxLogError::OutOfOrder { last: 10, got: 9 }));
}

#[test]
fn reappending_the_last_id_is_a_noop() {
    // Crash-replay case: the append committed but the cursor advance did not
    let dir = tempdir().unwrap();
    let mut log = open(dir.path());
    log.append(&txn(10, "cn=a", ChangeKind::Add)).unwrap();
    log.append(&txn(10, "cn=a", ChangeKind::Add)).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log.last_id(), Some(10));
}

#[test]
fn reopen_resumes_after_last_id() {
    let dir = tempdir().unwrap();
    {
        let mut log = open(dir.path());
        log.append(&txn(1, "cn=a", ChangeKind::Add)).unwrap();
        log.append(&txn(2, "cn=b", ChangeKind::Add)).unwrap();
    }
    let mut log = open(dir.path());
    assert_eq!(log.last_id(), Some(2));
    log.append(&txn(3, "cn=c", ChangeKind::Add)).unwrap();
    assert_eq!(log.lookup(3).unwrap(), Some(txn(3, "cn=c", ChangeKind::Add)));
}

#[test]
fn unindexed_log_tail_is_truncated() {
    let dir = tempdir().unwrap();
    {
        let mut log = open(dir.path());
        log.append(&txn(1, "cn=a", ChangeKind::Add)).unwrap();
    }
    // Crash between log write and index write: a trailing line with no entry
    {
        let mut f = OpenOptions::new().append(true).open(dir.path().join("transaction")).unwrap();
        f.write_all(b"2 a cn=b\n").unwrap();
    }
    let mut log = open(dir.path());
    assert_eq!(log.last_id(), Some(1));
    assert_eq!(log.len(), 1);
    // The truncated id can be re-appended cleanly
    log.append(&txn(2, "cn=b", ChangeKind::Add)).unwrap();
    assert_eq!(log.lookup(2).unwrap(), Some(txn(2, "cn=b", ChangeKind::Add)));
}

#[test]
fn partial_index_entry_is_truncated() {
    let dir = tempdir().unwrap();
    {
        let mut log = open(dir.path());
        log.append(&txn(1, "cn=a", ChangeKind::Add)).unwrap();
    }
    {
        let mut f = OpenOptions::new()
            .append(true)
            .open(dir.path().join("transaction.index"))
            .unwrap();
        f.write_all(&[0u8; 7]).unwrap();
    }
    let log = open(dir.path());
    assert_eq!(log.last_id(), Some(1));
    assert_eq!(log.len(), 1);
}

#[test]
fn indexed_line_without_newline_is_dropped() {
    let dir = tempdir().unwrap();
    {
        let mut log = open(dir.path());
        log.append(&txn(1, "cn=a", ChangeKind::Add)).unwrap();
    }
    // Simulate a crash that synced the index entry but tore the log line:
    // append the line sans newline plus a matching index entry.
    let offset = std::fs::metadata(dir.path().join("transaction")).unwrap().len();
    {
        let mut f = OpenOptions::new().append(true).open(dir.path().join("transaction")).unwrap();
        f.write_all(b"2 a cn=b").unwrap();
        let mut idx = OpenOptions::new()
            .append(true)
            .open(dir.path().join("transaction.index"))
            .unwrap();
        let mut entry = [0u8; 16];
        entry[..8].copy_from_slice(&2u64.to_le_bytes());
        entry[8..].copy_from_slice(&offset.to_le_bytes());
        idx.write_all(&entry).unwrap();
    }
    let log = open(dir.path());
    assert_eq!(log.last_id(), Some(1));
    assert_eq!(log.len(), 1);
}

#[test]
fn empty_log_after_total_truncation() {
    let dir = tempdir().unwrap();
    {
        let mut f = File::create(dir.path().join("transaction")).unwrap();
        f.write_all(b"1 a cn=a").unwrap(); // no newline, no index
    }
    let mut log = open(dir.path());
    assert!(log.is_empty());
    assert_eq!(log.last_id(), None);
    log.append(&txn(7, "cn=x", ChangeKind::Add)).unwrap();
    assert_eq!(log.lookup(7).unwrap(), Some(txn(7, "cn=x", ChangeKind::Add)));
}
