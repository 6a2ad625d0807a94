// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests: request encoding and reply parsing agree on the line
//! format for every message id and payload.

use proptest::prelude::*;

use super::*;
use shadow_core::ChangeKind;

proptest! {
    #[test]
    fn get_id_requests_parse_back(msg_id in any::<u32>(), txn_id in any::<u64>()) {
        let line = Request::new(msg_id, Command::GetId(txn_id)).encode();
        // A server echoing the request id and payload produces a parseable reply
        let reply = Reply::parse(&line).expect("parse");
        prop_assert_eq!(reply.msg_id, msg_id);
        prop_assert_eq!(reply.fields.len(), 2);
    }

    #[test]
    fn legacy_replies_round_trip(
        msg_id in any::<u32>(),
        txn_id in any::<u64>(),
        dn in "[a-z]{1,8}=[a-z]{1,12}",
        kind in prop::sample::select(vec!['a', 'm', 'd', 'r']),
    ) {
        let line = format!("{msg_id}\t{txn_id}\t{dn}\t{kind}");
        let change = Reply::parse(&line).expect("parse").into_next_change().expect("shape");
        prop_assert_eq!(change.id, txn_id);
        let change_dn = change.dn.expect("dn");
        prop_assert_eq!(change_dn.as_str(), dn.as_str());
        prop_assert_eq!(change.kind.expect("kind"), ChangeKind::from_char(kind).expect("kind"));
    }

    #[test]
    fn modern_replies_round_trip(msg_id in any::<u32>(), txn_id in any::<u64>()) {
        let line = format!("{msg_id}\t{txn_id}");
        let change = Reply::parse(&line).expect("parse").into_next_change().expect("shape");
        prop_assert_eq!(change.id, txn_id);
        prop_assert!(!change.has_details());
    }
}
