// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shadow-engine: handler runtime and transaction dispatcher.
//!
//! Owns the single-writer pipeline: the module registry with its lifecycle
//! hooks and privilege containment, the per-transaction dispatcher, the
//! supervisor guards, and the [`Runtime`] event loop that ties the storage
//! and adapter crates together.

mod dispatcher;
mod error;
mod handler;
mod host;
mod privileges;
mod registry;
mod runtime;
mod supervisor;

pub use error::RuntimeError;
pub use handler::{Handler, HandlerError};
pub use host::{HostError, ModuleDecl, MODULE_API_VERSION, MODULE_ENTRYPOINT};
pub use privileges::PrivilegeGuard;
pub use registry::ModuleRegistry;
pub use runtime::{EngineConfig, ReloadFlag, Runtime, ShutdownFlag, Tick};
pub use supervisor::QUARANTINE_SENTINEL;

#[cfg(test)]
mod test_helpers;
