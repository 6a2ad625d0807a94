// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The handler contract: what a transformation module implements.
//!
//! Modules project directory changes onto local side effects (generated
//! files, service reconfiguration, secondary stores). Only [`Handler::handle`]
//! is required; the remaining hooks default to no-ops. Hooks run on the
//! pipeline's single control flow, so a slow handler stalls the stream;
//! that is the intended backpressure.

use thiserror::Error;

use shadow_core::{ChangeKind, Dn, Entry, HandlerInfo};

/// A failed hook. The dispatcher logs it and withholds the handler's name
/// from the module-present set so the entry is retried on its next touch;
/// it never halts the pipeline.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A loaded transformation module.
pub trait Handler: Send {
    /// Manifest, read once at load.
    fn info(&self) -> HandlerInfo;

    /// Called once per process lifetime, after load.
    fn initialize(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called lazily before the first `handle` of a run.
    fn prerun(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Project one change. `new` is `None` for deletes, `old` is `None`
    /// when the cache had no record of the DN. Handlers whose manifest does
    /// not set `modrdn` never see [`ChangeKind::ModRdn`]; the runtime
    /// presents the change as a modify instead.
    fn handle(
        &mut self,
        dn: &Dn,
        new: Option<&Entry>,
        old: Option<&Entry>,
        kind: ChangeKind,
    ) -> Result<(), HandlerError>;

    /// Called when the pipeline has been idle for the configured interval.
    fn postrun(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called at process shutdown.
    fn clean(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Configuration broadcast from the daemon.
    fn setdata(&mut self, _key: &str, _value: &[u8]) -> Result<(), HandlerError> {
        Ok(())
    }
}
