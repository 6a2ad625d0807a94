// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use shadow_core::ChangeKind;
use yare::parameterized;

#[test]
fn splits_msg_id_and_fields() {
    let reply = Reply::parse("12\t43\tcn=alice,ou=p\ta").expect("parse");
    assert_eq!(reply.msg_id, 12);
    assert_eq!(reply.fields, vec!["43", "cn=alice,ou=p", "a"]);
}

#[test]
fn legacy_get_id_reply_carries_details() {
    let change =
        Reply::parse("1\t43\tCN=Alice, OU=P\ta").expect("parse").into_next_change().expect("shape");
    assert_eq!(change.id, 43);
    // The DN is canonicalized on ingest
    assert_eq!(change.dn.as_ref().map(|d| d.as_str()), Some("cn=alice,ou=p"));
    assert_eq!(change.kind, Some(ChangeKind::Add));
    assert!(change.has_details());
}

#[test]
fn modern_get_id_reply_is_id_only() {
    let change = Reply::parse("1\t99").expect("parse").into_next_change().expect("shape");
    assert_eq!(change.id, 99);
    assert_eq!(change.dn, None);
    assert_eq!(change.kind, None);
    assert!(!change.has_details());
}

#[parameterized(
    two_fields = { "1\t43\tcn=x" },
    four_fields = { "1\t43\tcn=x\ta\textra" },
    empty_payload = { "1" },
)]
fn wrong_get_id_shapes_are_rejected(line: &str) {
    let reply = Reply::parse(line).expect("parse");
    assert!(matches!(reply.into_next_change(), Err(ProtocolError::UnexpectedShape { .. })));
}

#[test]
fn bad_command_char_is_rejected() {
    let reply = Reply::parse("1\t43\tcn=x\tz").expect("parse");
    assert!(matches!(reply.into_next_change(), Err(ProtocolError::UnknownCommand(_))));
    let reply = Reply::parse("1\t43\tcn=x\tam").expect("parse");
    assert!(matches!(reply.into_next_change(), Err(ProtocolError::UnknownCommand(_))));
}

#[test]
fn alive_statuses() {
    assert!(Reply::parse("2\tOK").expect("parse").into_alive().expect("status"));
    assert!(!Reply::parse("2\tFAIL").expect("parse").into_alive().expect("status"));
    assert!(matches!(
        Reply::parse("2\tMAYBE").expect("parse").into_alive(),
        Err(ProtocolError::BadAliveStatus(_))
    ));
}

#[test]
fn schema_id_parses() {
    assert_eq!(Reply::parse("3\t17").expect("parse").into_schema_id().expect("shape"), 17);
    assert!(matches!(
        Reply::parse("3\tseventeen").expect("parse").into_schema_id(),
        Err(ProtocolError::BadNumber(_))
    ));
}

#[parameterized(
    empty = { "" },
    non_numeric = { "abc\tOK" },
    negative = { "-1\tOK" },
)]
fn bad_message_ids_are_rejected(line: &str) {
    assert!(Reply::parse(line).is_err());
}
