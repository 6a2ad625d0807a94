// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! shadowd: directory listener daemon.
//!
//! Tails the notifier's change stream, keeps the local entry cache in sync
//! with the authoritative directory, and drives the registered handler
//! modules. Exits 0 on a clean drain, 1 on any unrecoverable error.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use shadow_adapters::{LdapDirectory, TcpNotifier};
use shadow_core::SystemClock;
use shadow_daemon::{config::Config, lock, signals};
use shadow_engine::{EngineConfig, ModuleRegistry, PrivilegeGuard, Runtime};
use shadow_storage::HandlerStateStore;

#[derive(Debug, Parser)]
#[command(name = "shadowd", about = "Directory listener: replicates directory changes to local handlers")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "/etc/shadowd/shadowd.toml")]
    config: PathBuf,

    /// Override the data directory from the configuration
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log at debug level (unless RUST_LOG is set)
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // One-line cause on every fatal path
            error!(error = %format!("{e:#}"), "shadowd exiting");
            eprintln!("shadowd: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(&cli.config).context("loading configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    let _log_guard = init_tracing(&config, cli.debug);

    let _lock = lock::lock_data_dir(&config.data_dir).context("locking data directory")?;

    let engine_config: EngineConfig = config.engine_config();
    let notifier = TcpNotifier::new(config.notifier_config());
    let directory =
        LdapDirectory::new(config.directory_config().context("directory configuration")?);

    let privileges = privilege_guard(&config);
    let state_store = HandlerStateStore::open(&engine_config.handler_state_dir())
        .context("opening handler state directory")?;
    let mut registry = ModuleRegistry::new(state_store, privileges);
    registry.load_from_dirs(&engine_config.module_dirs);

    let mut runtime =
        Runtime::new(engine_config, notifier, directory, SystemClock, registry)
            .context("opening listener state")?;
    runtime.setdata("basedn", config.base_dn.as_bytes());
    runtime.setdata("binddn", config.ldap_bind_dn.as_bytes());
    runtime.setdata("data_dir", config.data_dir.display().to_string().as_bytes());

    signals::install(runtime.shutdown_flag(), runtime.reload_flag())
        .context("installing signal handlers")?;

    runtime.run().await.context("pipeline halted")?;
    Ok(())
}

/// Re-drop to the configured identity after every handler hook when the
/// daemon starts elevated.
fn privilege_guard(config: &Config) -> PrivilegeGuard {
    match config.drop_privileges {
        Some(dp) if nix::unistd::geteuid().is_root() => PrivilegeGuard::drop_to(dp.uid, dp.gid),
        _ => PrivilegeGuard::none(),
    }
}

fn init_tracing(config: &Config, debug: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    match &config.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().map(PathBuf::from).unwrap_or_else(|| "shadowd.log".into());
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}
