// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Privilege containment around handler hooks.
//!
//! Handlers may escalate to root for their side effects (chown on home
//! directories, service restarts). The runtime re-drops the effective
//! identity to the configured unprivileged user after every hook return,
//! success or failure.

use nix::unistd::{setegid, seteuid, Gid, Uid};
use tracing::warn;

/// Resets the effective uid/gid after each hook invocation.
#[derive(Debug, Clone, Copy)]
pub struct PrivilegeGuard {
    target: Option<(Uid, Gid)>,
}

impl PrivilegeGuard {
    /// No-op guard for processes that never started elevated.
    pub fn none() -> Self {
        Self { target: None }
    }

    /// Guard that restores the given unprivileged identity.
    pub fn drop_to(uid: u32, gid: u32) -> Self {
        Self { target: Some((Uid::from_raw(uid), Gid::from_raw(gid))) }
    }

    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    /// Re-drop the effective identity. Failures are logged, not fatal: the
    /// next hook runs either way and the real uid never changed.
    pub fn restore(&self) {
        let Some((uid, gid)) = self.target else {
            return;
        };
        if let Err(e) = setegid(gid) {
            warn!(gid = gid.as_raw(), error = %e, "failed to restore effective gid");
        }
        if let Err(e) = seteuid(uid) {
            warn!(uid = uid.as_raw(), error = %e, "failed to restore effective uid");
        }
    }
}

#[cfg(test)]
#[path = "privileges_tests.rs"]
mod tests;
