// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: a TOML file plus defaults.
//!
//! The LDAP password never lives in the config file itself; the file names
//! a root-readable secret file instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use shadow_adapters::{LdapDirectoryConfig, NotifierConfig};
use shadow_engine::EngineConfig;

/// Errors loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("cannot parse {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("cannot read password file {path}: {source}")]
    Password { path: PathBuf, source: std::io::Error },
}

/// Unprivileged identity to re-assume after every handler hook.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DropPrivileges {
    pub uid: u32,
    pub gid: u32,
}

/// Daemon settings, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root of the listener's durable state.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Notifier endpoint, `host:port`.
    pub notifier_addr: String,

    /// Directory endpoint, e.g. `ldap://primary:7389`.
    pub ldap_url: String,

    pub ldap_bind_dn: String,

    /// Root-readable file holding the bind password.
    pub ldap_password_file: PathBuf,

    /// Search base announced to handlers via `setdata`.
    pub base_dn: String,

    #[serde(default)]
    pub module_dirs: Vec<PathBuf>,

    /// Directory reconnect attempts; 0 = unlimited.
    #[serde(default)]
    pub ldap_retries: u32,

    /// Notifier reconnect attempts; 0 = unlimited.
    #[serde(default)]
    pub notifier_retries: u32,

    #[serde(default = "default_idle_sec")]
    pub postrun_idle_sec: u64,

    #[serde(default = "default_idle_sec")]
    pub alive_idle_sec: u64,

    /// Free-space floor in MiB; 0 disables the watchdog.
    #[serde(default)]
    pub min_free_mib: u64,

    /// Extra filesystems for the free-space watchdog (the data dir is
    /// always monitored).
    #[serde(default)]
    pub monitored_paths: Vec<PathBuf>,

    #[serde(default)]
    pub write_transaction_file: bool,

    /// Log file; stderr when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// When the daemon starts as root, the identity to drop back to after
    /// each handler hook.
    #[serde(default)]
    pub drop_privileges: Option<DropPrivileges>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/shadowd")
}

fn default_idle_sec() -> u64 {
    300
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// The bind password, read from the secret file with trailing
    /// whitespace stripped.
    pub fn ldap_password(&self) -> Result<String, ConfigError> {
        let content = std::fs::read_to_string(&self.ldap_password_file).map_err(|source| {
            ConfigError::Password { path: self.ldap_password_file.clone(), source }
        })?;
        Ok(content.trim_end().to_string())
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::new(&self.data_dir);
        engine.module_dirs = self.module_dirs.clone();
        engine.postrun_idle = Duration::from_secs(self.postrun_idle_sec);
        engine.alive_idle = Duration::from_secs(self.alive_idle_sec);
        engine.min_free_mib = self.min_free_mib;
        engine.monitored_paths.extend(self.monitored_paths.iter().cloned());
        engine.write_transaction_file = self.write_transaction_file;
        engine
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        let mut notifier = NotifierConfig::new(&self.notifier_addr);
        notifier.max_attempts = self.notifier_retries;
        notifier.reply_timeout = Duration::from_secs(self.alive_idle_sec);
        notifier
    }

    pub fn directory_config(&self) -> Result<LdapDirectoryConfig, ConfigError> {
        let mut directory = LdapDirectoryConfig::new(
            &self.ldap_url,
            &self.ldap_bind_dn,
            self.ldap_password()?,
        );
        directory.max_attempts = self.ldap_retries;
        Ok(directory)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
