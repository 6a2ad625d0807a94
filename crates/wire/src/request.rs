// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client → notifier request encoding.

/// The notifier commands the listener issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask for the transaction with the given id (the one after the cursor).
    GetId(u64),
    /// Keepalive probe for an idle connection.
    Alive,
    /// Current authoritative schema generation.
    GetSchemaId,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::GetId(_) => "GET_ID",
            Command::Alive => "ALIVE",
            Command::GetSchemaId => "GET_SCHEMA_ID",
        }
    }
}

/// A request tagged with its connection-local message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub msg_id: u32,
    pub command: Command,
}

impl Request {
    pub fn new(msg_id: u32, command: Command) -> Self {
        Self { msg_id, command }
    }

    /// The line representation, without the trailing newline.
    pub fn encode(&self) -> String {
        match self.command {
            Command::GetId(id) => format!("{}\t{}\t{}", self.msg_id, self.command.name(), id),
            Command::Alive | Command::GetSchemaId => {
                format!("{}\t{}", self.msg_id, self.command.name())
            }
        }
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
