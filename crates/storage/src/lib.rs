// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shadow-storage: the listener's durable state.
//!
//! The entry cache (shadow copies of directory entries plus the
//! module-present set), the master cursor (resume point), the optional
//! transaction log for downstream tailers, and per-handler state files.

mod cache;
mod codec;
mod cursor;
mod handler_state;
mod txlog;

pub use cache::{CacheError, EntryCache, MetaTable};
pub use codec::{decode_record, encode_record, CodecError, RECORD_VERSION};
pub use cursor::{CursorError, MasterCursor, MODULES_HASH_LEN};
pub use handler_state::{HandlerStateError, HandlerStateStore};
pub use txlog::{TransactionLog, TxLogError};
