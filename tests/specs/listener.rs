//! Happy-path listener specs: a node coming up cold and following the
//! stream through adds, modifies, and deletes.

use super::prelude::*;
use shadow_core::{ChangeKind, Dn, Filter, HandlerInfo, REPLICATION_NAME};
use shadow_engine::Tick;
use shadow_wire::NextChange;
use tempfile::tempdir;

fn handlers() -> Vec<HandlerInfo> {
    vec![
        HandlerInfo::new(REPLICATION_NAME, "replicates entries to the local store"),
        HandlerInfo::new("home-dir", "creates home directories")
            .priority(10.0)
            .filter(Filter::parse("(uid=*)").expect("filter"))
            .attributes(["uid"]),
    ]
}

fn legacy(id: u64, dn: &str, kind: ChangeKind) -> NextChange {
    NextChange { id, dn: Some(Dn::new(dn)), kind: Some(kind) }
}

#[tokio::test]
async fn follows_the_stream_end_to_end() {
    let dir = tempdir().unwrap();
    let mut listener = listener_with(dir.path(), handlers(), |config| {
        config.write_transaction_file = true;
    });

    // Transaction 1: a user appears
    listener.directory.insert(entry("cn=alice,ou=p", &[("uid", "alice"), ("sn", "Doe")]));
    listener.notifier.push_change(legacy(1, "cn=alice,ou=p", ChangeKind::Add));
    assert_eq!(listener.runtime.tick().await.unwrap(), Tick::Processed { through: 1 });

    // Transaction 2: an irrelevant attribute changes
    listener
        .directory
        .insert(entry("cn=alice,ou=p", &[("uid", "alice"), ("sn", "Doe"), ("description", "x")]));
    listener.notifier.push_change(legacy(2, "cn=alice,ou=p", ChangeKind::Modify));
    assert_eq!(listener.runtime.tick().await.unwrap(), Tick::Processed { through: 2 });

    // Transaction 3: the user is deleted
    listener.directory.remove(&Dn::new("cn=alice,ou=p"));
    listener.notifier.push_change(legacy(3, "cn=alice,ou=p", ChangeKind::Delete));
    assert_eq!(listener.runtime.tick().await.unwrap(), Tick::Processed { through: 3 });

    assert_eq!(
        listener.calls.lock().clone(),
        vec![
            "replication:cn=alice,ou=p:add",
            "home-dir:cn=alice,ou=p:add",
            // modify: home-dir short-circuits on the unchanged uid
            "replication:cn=alice,ou=p:modify",
            // delete: both were module-present
            "replication:cn=alice,ou=p:delete",
            "home-dir:cn=alice,ou=p:delete",
        ]
    );

    assert_eq!(listener.runtime.cursor_id(), 3);
    assert_eq!(listener.runtime.cache().len(), 0, "deleted entry leaves the cache");

    // Downstream tailer contract: every committed transaction, in order
    let txlog = listener.runtime.txlog().expect("transaction file enabled");
    assert_eq!(txlog.len(), 3);
    assert_eq!(txlog.lookup(2).unwrap().map(|t| t.kind), Some(ChangeKind::Modify));
}

#[tokio::test]
async fn modern_notifier_batches_through_the_change_log() {
    let dir = tempdir().unwrap();
    let mut listener = listener(dir.path(), handlers());

    for (id, dn) in [(1, "cn=a"), (2, "cn=b")] {
        listener.directory.set_change(id, Dn::new(dn), ChangeKind::Add);
        listener.directory.insert(entry(dn, &[("uid", dn)]));
    }
    listener.notifier.push_change(NextChange { id: 2, dn: None, kind: None });

    assert_eq!(listener.runtime.tick().await.unwrap(), Tick::Processed { through: 2 });
    assert_eq!(listener.runtime.cursor_id(), 2);
    assert_eq!(listener.runtime.cache().len(), 2);
}

#[tokio::test]
async fn cache_records_module_present_sets() {
    let dir = tempdir().unwrap();
    let mut listener = listener(dir.path(), handlers());

    // No uid: home-dir's filter does not match
    listener.directory.insert(entry("cn=printer", &[("cn", "printer")]));
    listener.notifier.push_change(legacy(1, "cn=printer", ChangeKind::Add));
    listener.runtime.tick().await.unwrap();

    let record = listener.runtime.cache().get(&Dn::new("cn=printer")).unwrap().expect("cached");
    assert!(record.is_present(REPLICATION_NAME));
    assert!(!record.is_present("home-dir"));
}
