// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal wiring: SIGTERM/SIGINT drain the current transaction and exit,
//! SIGHUP rescans the module directories.
//!
//! Signals only set flags; the runtime observes them between state-machine
//! transitions, never inside one.

use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use shadow_engine::{ReloadFlag, ShutdownFlag};

pub fn install(shutdown: ShutdownFlag, reload: ReloadFlag) -> std::io::Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut hup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = term.recv() => {
                    info!("SIGTERM received, draining");
                    shutdown.request();
                }
                _ = int.recv() => {
                    info!("SIGINT received, draining");
                    shutdown.request();
                }
                _ = hup.recv() => {
                    info!("SIGHUP received, module directories will be rescanned");
                    reload.request();
                }
            }
        }
    });
    Ok(())
}
