// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notifier → client reply parsing.
//!
//! Replies are matched to requests by message id; the payload shape depends
//! on the command that was issued, so a [`Reply`] is first split generically
//! and then interpreted by the caller that knows what it asked for.

use shadow_core::{ChangeKind, Dn};

use crate::wire::ProtocolError;

/// A reply line split into message id and payload fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub msg_id: u32,
    pub fields: Vec<String>,
}

/// Payload of a `GET_ID` reply.
///
/// The legacy protocol carries the DN and command inline; the modern
/// protocol announces only the id and leaves the details to the directory's
/// change log. `dn` and `kind` are always both present or both absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextChange {
    pub id: u64,
    pub dn: Option<Dn>,
    pub kind: Option<ChangeKind>,
}

impl NextChange {
    /// Whether this reply came from the legacy protocol.
    pub fn has_details(&self) -> bool {
        self.dn.is_some()
    }
}

impl Reply {
    /// Split a raw line into message id and payload fields.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut parts = line.split('\t');
        let id_field = parts.next().ok_or(ProtocolError::MissingMessageId)?;
        if id_field.is_empty() {
            return Err(ProtocolError::MissingMessageId);
        }
        let msg_id = id_field
            .parse::<u32>()
            .map_err(|_| ProtocolError::BadMessageId(id_field.to_string()))?;
        let fields = parts.map(str::to_string).collect();
        Ok(Self { msg_id, fields })
    }

    /// Interpret as a `GET_ID` reply: `<id>` (modern) or
    /// `<id>\t<dn>\t<command_char>` (legacy).
    pub fn into_next_change(self) -> Result<NextChange, ProtocolError> {
        match self.fields.len() {
            1 => Ok(NextChange { id: parse_u64(&self.fields[0])?, dn: None, kind: None }),
            3 => {
                let id = parse_u64(&self.fields[0])?;
                let dn = Dn::new(&self.fields[1]);
                let kind_field = &self.fields[2];
                let mut chars = kind_field.chars();
                let (c, rest) = (chars.next(), chars.next());
                if rest.is_some() {
                    return Err(ProtocolError::UnknownCommand(kind_field.clone()));
                }
                let kind = c
                    .ok_or_else(|| ProtocolError::UnknownCommand(kind_field.clone()))
                    .and_then(|c| {
                        ChangeKind::from_char(c)
                            .map_err(|_| ProtocolError::UnknownCommand(kind_field.clone()))
                    })?;
                Ok(NextChange { id, dn: Some(dn), kind: Some(kind) })
            }
            got => Err(ProtocolError::UnexpectedShape { expected: "1 or 3", got }),
        }
    }

    /// Interpret as an `ALIVE` reply: `OK` or `FAIL`.
    pub fn into_alive(self) -> Result<bool, ProtocolError> {
        if self.fields.len() != 1 {
            return Err(ProtocolError::UnexpectedShape { expected: "1", got: self.fields.len() });
        }
        match self.fields[0].as_str() {
            "OK" => Ok(true),
            "FAIL" => Ok(false),
            other => Err(ProtocolError::BadAliveStatus(other.to_string())),
        }
    }

    /// Interpret as a `GET_SCHEMA_ID` reply: a single integer.
    pub fn into_schema_id(self) -> Result<u64, ProtocolError> {
        if self.fields.len() != 1 {
            return Err(ProtocolError::UnexpectedShape { expected: "1", got: self.fields.len() });
        }
        parse_u64(&self.fields[0])
    }
}

fn parse_u64(field: &str) -> Result<u64, ProtocolError> {
    field.parse::<u64>().map_err(|_| ProtocolError::BadNumber(field.to_string()))
}

#[cfg(test)]
#[path = "reply_tests.rs"]
mod tests;
