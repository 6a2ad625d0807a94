// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notifier protocol for the directory listener.
//!
//! Wire format: one line per message, fields separated by tabs.
//! Client → server: `<msg_id>\t<COMMAND>[\t<arg>]`.
//! Server → client: `<msg_id>\t<payload field>...`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod reply;
mod request;
mod wire;

pub use reply::{NextChange, Reply};
pub use request::{Command, Request};
pub use wire::{read_line, write_line, ProtocolError, MAX_LINE_BYTES};

#[cfg(test)]
mod property_tests;
