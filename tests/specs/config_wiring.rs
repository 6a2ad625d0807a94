//! Daemon configuration wired into an engine runtime: the TOML a node
//! operator writes produces a working listener.

use super::prelude::*;
use shadow_core::{ChangeKind, Dn, HandlerInfo, REPLICATION_NAME};
use shadow_daemon::Config;
use shadow_wire::NextChange;
use tempfile::tempdir;

#[tokio::test]
async fn operator_config_drives_a_listener() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().join("state");
    let toml = format!(
        r#"
data_dir = "{}"
notifier_addr = "primary:6669"
ldap_url = "ldap://primary:7389"
ldap_bind_dn = "cn=listener,dc=example"
ldap_password_file = "/etc/shadowd.secret"
base_dn = "dc=example"
postrun_idle_sec = 60
write_transaction_file = true
"#,
        data_dir.display()
    );
    let config_path = dir.path().join("shadowd.toml");
    std::fs::write(&config_path, toml).unwrap();

    let config = Config::load(&config_path).unwrap();
    let engine_config = config.engine_config();
    assert_eq!(engine_config.postrun_idle.as_secs(), 60);

    // Same construction path as the binary, with fakes for the services
    let mut listener = listener_with(
        &data_dir,
        vec![HandlerInfo::new(REPLICATION_NAME, "replicates entries")],
        move |c| *c = engine_config,
    );
    listener.directory.insert(entry("cn=a,dc=example", &[("uid", "a")]));
    listener
        .notifier
        .push_change(NextChange { id: 1, dn: Some(Dn::new("cn=a,dc=example")), kind: Some(ChangeKind::Add) });
    listener.runtime.tick().await.unwrap();

    assert_eq!(listener.runtime.cursor_id(), 1);
    assert!(data_dir.join("transaction").exists(), "config enabled the transaction file");
    assert!(data_dir.join("cache").join("master.state").exists());
}
