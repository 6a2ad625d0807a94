//! Crash-recovery specs: the cursor defines the resume point, replays are
//! idempotent, and the quarantine sentinel stops a restart cold.

use super::prelude::*;
use shadow_core::{ChangeKind, Dn, HandlerInfo, REPLICATION_NAME};
use shadow_engine::{RuntimeError, QUARANTINE_SENTINEL};
use shadow_wire::NextChange;
use tempfile::tempdir;

fn handlers() -> Vec<HandlerInfo> {
    vec![HandlerInfo::new(REPLICATION_NAME, "replicates entries")]
}

fn legacy(id: u64, dn: &str, kind: ChangeKind) -> NextChange {
    NextChange { id, dn: Some(Dn::new(dn)), kind: Some(kind) }
}

#[tokio::test]
async fn restart_resumes_exactly_after_the_cursor() {
    let dir = tempdir().unwrap();
    {
        let mut listener = listener(dir.path(), handlers());
        listener.directory.insert(entry("cn=a", &[("uid", "a")]));
        listener.notifier.push_change(legacy(1, "cn=a", ChangeKind::Add));
        listener.runtime.tick().await.unwrap();
        assert_eq!(listener.runtime.cursor_id(), 1);
    }

    // "Crash": state dropped without any teardown; a fresh process resumes
    let mut listener = listener(dir.path(), handlers());
    assert_eq!(listener.runtime.cursor_id(), 1);
    let record = listener.runtime.cache().get(&Dn::new("cn=a")).unwrap().expect("survived");
    assert!(record.is_present(REPLICATION_NAME));

    listener.runtime.tick().await.unwrap();
    assert_eq!(listener.notifier.get_next_calls(), vec![2], "asks for cursor + 1");
}

#[tokio::test]
async fn replaying_the_last_transaction_is_idempotent() {
    let dir = tempdir().unwrap();
    let (first, calls_before) = {
        let mut listener = listener(dir.path(), handlers());
        listener.directory.insert(entry("cn=a", &[("uid", "a")]));
        listener.notifier.push_change(legacy(1, "cn=a", ChangeKind::Add));
        listener.runtime.tick().await.unwrap();
        let calls_len = listener.calls.lock().len();
        (listener.runtime.cache().get(&Dn::new("cn=a")).unwrap(), calls_len)
    };
    assert_eq!(calls_before, 1);

    // The notifier re-announces the committed id after the "crash"
    let mut listener = listener(dir.path(), handlers());
    listener.directory.insert(entry("cn=a", &[("uid", "a")]));
    listener.notifier.push_change(legacy(1, "cn=a", ChangeKind::Add));
    listener.runtime.tick().await.unwrap();

    assert_eq!(listener.runtime.cursor_id(), 1, "cursor does not move");
    assert_eq!(listener.runtime.cache().get(&Dn::new("cn=a")).unwrap(), first);
    assert!(listener.calls.lock().is_empty(), "duplicate announcement invokes nothing");
}

#[tokio::test]
async fn quarantine_sentinel_blocks_restart() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join(QUARANTINE_SENTINEL), "replay failed on txn 7\n").unwrap();

    let mut listener = listener(dir.path(), handlers());
    let err = listener.runtime.tick().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Quarantined(_)));

    // Operator removes the sentinel; the pipeline proceeds
    std::fs::remove_file(dir.path().join(QUARANTINE_SENTINEL)).unwrap();
    listener.runtime.tick().await.unwrap();
}

#[tokio::test]
async fn transaction_log_survives_restart_without_gaps() {
    let dir = tempdir().unwrap();
    {
        let mut listener =
            listener_with(dir.path(), handlers(), |c| c.write_transaction_file = true);
        listener.directory.insert(entry("cn=a", &[("uid", "a")]));
        listener.notifier.push_change(legacy(1, "cn=a", ChangeKind::Add));
        listener.runtime.tick().await.unwrap();
    }
    let mut listener = listener_with(dir.path(), handlers(), |c| c.write_transaction_file = true);
    listener.directory.insert(entry("cn=b", &[("uid", "b")]));
    listener.notifier.push_change(legacy(2, "cn=b", ChangeKind::Add));
    listener.runtime.tick().await.unwrap();

    let txlog = listener.runtime.txlog().expect("enabled");
    assert_eq!(txlog.len(), 2);
    assert_eq!(txlog.last_id(), Some(2));
    assert_eq!(
        txlog.lookup(1).unwrap().map(|t| t.dn.as_str().to_string()),
        Some("cn=a".to_string())
    );
}
