// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler manifest and persisted state types.
//!
//! A handler's manifest ([`HandlerInfo`]) is declared by the module itself;
//! the runtime reads it once at load and uses it for ordering, filtering and
//! changed-attribute gating. [`HandlerState`] is the small durable bit-set
//! kept per handler on disk.

use bitflags::bitflags;

use crate::filter::Filter;

/// The handler that replicates entries to peer stores. It runs first for
/// every transaction and is exempt from the effectively-unchanged
/// short-circuit.
pub const REPLICATION_NAME: &str = "replication";

/// Manifest fields a handler module declares.
#[derive(Debug, Clone)]
pub struct HandlerInfo {
    /// Stable handler name; also the module-present key in the cache.
    pub name: String,
    pub description: String,
    /// Lower runs earlier; ties break by load order.
    pub priority: f64,
    /// Entry filter; `None` matches everything.
    pub filter: Option<Filter>,
    /// Attribute names whose change makes the handler run again.
    /// Empty means any attribute change is relevant.
    pub attributes: Vec<String>,
    /// Whether `handle` accepts the four-argument form with the command.
    pub modrdn: bool,
    /// Run on every delete, even when not module-present.
    pub handle_every_delete: bool,
}

impl HandlerInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            priority: 0.0,
            filter: None,
            attributes: Vec::new(),
            modrdn: false,
            handle_every_delete: false,
        }
    }

    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Declare the relevant attribute list; names are folded to lower case.
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.attributes = names.into_iter().map(|n| n.as_ref().to_ascii_lowercase()).collect();
        self
    }

    pub fn modrdn(mut self, modrdn: bool) -> Self {
        self.modrdn = modrdn;
        self
    }

    pub fn handle_every_delete(mut self, every: bool) -> Self {
        self.handle_every_delete = every;
        self
    }

    pub fn is_replication(&self) -> bool {
        self.name == REPLICATION_NAME
    }

    /// Whether an entry passes this handler's filter ("no filter" = pass).
    pub fn filter_matches(&self, entry: &crate::entry::Entry) -> bool {
        match &self.filter {
            Some(filter) => filter.matches(entry),
            None => true,
        }
    }

    /// Whether any of `changed` intersects the declared attribute list.
    /// An empty declaration means every change is relevant.
    pub fn attributes_relevant(&self, changed: &[String]) -> bool {
        if self.attributes.is_empty() {
            return !changed.is_empty();
        }
        changed.iter().any(|c| self.attributes.iter().any(|a| a == c))
    }
}

bitflags! {
    /// Durable per-handler state, stored as a decimal integer on disk.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HandlerState: u32 {
        /// The handler finished `initialize` and may receive transactions.
        const READY = 1;
    }
}

impl HandlerState {
    /// Parse the decimal file representation. Unknown bits are kept so a
    /// newer writer's state survives a round-trip through an older build.
    pub fn from_decimal(s: &str) -> Option<Self> {
        s.trim().parse::<u32>().ok().map(Self::from_bits_retain)
    }

    pub fn to_decimal(self) -> String {
        self.bits().to_string()
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
