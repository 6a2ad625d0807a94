// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    get_id = { Command::GetId(43), "7\tGET_ID\t43" },
    alive = { Command::Alive, "7\tALIVE" },
    schema = { Command::GetSchemaId, "7\tGET_SCHEMA_ID" },
)]
fn encoding(command: Command, expected: &str) {
    assert_eq!(Request::new(7, command).encode(), expected);
}

#[test]
fn encoded_line_has_no_newline() {
    assert!(!Request::new(1, Command::Alive).encode().contains('\n'));
}

#[test]
fn large_ids_encode_in_full() {
    let line = Request::new(u32::MAX, Command::GetId(u64::MAX)).encode();
    assert_eq!(line, format!("{}\tGET_ID\t{}", u32::MAX, u64::MAX));
}
