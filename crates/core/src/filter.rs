// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LDAP search filters (RFC 4515 subset) for per-handler entry gating.
//!
//! Supported: `&`, `|`, `!` composition, equality, presence (`attr=*`) and
//! substring patterns (`attr=a*b*c`). Extensible-match and ordering rules are
//! not used by handler manifests and are rejected at parse time.
//!
//! Evaluation uses ASCII-case-insensitive value comparison (caseIgnoreMatch,
//! the directory default for the attributes handlers filter on).

use thiserror::Error;

use crate::entry::Entry;

/// A parsed search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// `(attr=*)`
    Present(String),
    /// `(attr=value)` with no wildcards
    Equality(String, Vec<u8>),
    /// `(attr=a*b*c)`; any wildcard makes it a substring pattern
    Substrings(String, SubstringPattern),
}

/// Pieces of a substring pattern: `initial*any*...*any*final`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstringPattern {
    pub initial: Option<Vec<u8>>,
    pub any: Vec<Vec<u8>>,
    pub fin: Option<Vec<u8>>,
}

/// Filter syntax error with byte position.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid filter at byte {position}: {message}")]
pub struct FilterError {
    pub message: String,
    pub position: usize,
}

impl Filter {
    /// Parse an RFC 4515 filter string.
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let mut p = Parser { input: input.as_bytes(), pos: 0 };
        p.skip_ws();
        let filter = p.filter()?;
        p.skip_ws();
        if p.pos != p.input.len() {
            return Err(p.error("trailing characters after filter"));
        }
        Ok(filter)
    }

    /// Evaluate this filter against an entry.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(subs) => subs.iter().all(|f| f.matches(entry)),
            Filter::Or(subs) => subs.iter().any(|f| f.matches(entry)),
            Filter::Not(sub) => !sub.matches(entry),
            Filter::Present(attr) => entry.has_attribute(attr),
            Filter::Equality(attr, value) => {
                entry.get(attr).is_some_and(|values| values.iter().any(|v| eq_fold(v, value)))
            }
            Filter::Substrings(attr, pattern) => {
                entry.get(attr).is_some_and(|values| values.iter().any(|v| pattern.matches(v)))
            }
        }
    }
}

impl SubstringPattern {
    fn matches(&self, value: &[u8]) -> bool {
        let mut rest: &[u8] = value;

        if let Some(initial) = &self.initial {
            if rest.len() < initial.len() || !eq_fold(&rest[..initial.len()], initial) {
                return false;
            }
            rest = &rest[initial.len()..];
        }
        if let Some(fin) = &self.fin {
            if rest.len() < fin.len() || !eq_fold(&rest[rest.len() - fin.len()..], fin) {
                return false;
            }
            rest = &rest[..rest.len() - fin.len()];
        }
        for any in &self.any {
            match find_fold(rest, any) {
                Some(idx) => rest = &rest[idx + any.len()..],
                None => return false,
            }
        }
        true
    }
}

fn eq_fold(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

fn find_fold(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| eq_fold(&haystack[i..i + needle.len()], needle))
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> FilterError {
        FilterError { message: message.to_string(), position: self.pos }
    }

    fn skip_ws(&mut self) {
        while matches!(self.input.get(self.pos), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), FilterError> {
        if self.input.get(self.pos) == Some(&byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}", byte as char)))
        }
    }

    fn filter(&mut self) -> Result<Filter, FilterError> {
        self.expect(b'(')?;
        let filter = match self.input.get(self.pos) {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut subs = Vec::new();
        while self.input.get(self.pos) == Some(&b'(') {
            subs.push(self.filter()?);
        }
        if subs.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(subs)
    }

    fn item(&mut self) -> Result<Filter, FilterError> {
        let attr = self.attribute()?;
        match self.input.get(self.pos) {
            Some(b'=') => self.pos += 1,
            Some(b'<') | Some(b'>') | Some(b'~') => {
                return Err(self.error("ordering and approximate matches are not supported"));
            }
            _ => return Err(self.error("expected '='")),
        }
        self.value(attr)
    }

    fn attribute(&mut self) -> Result<String, FilterError> {
        let start = self.pos;
        while let Some(&b) = self.input.get(self.pos) {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'.' || b == b';' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected attribute name"));
        }
        // The accepted byte set is pure ASCII.
        let name = String::from_utf8_lossy(&self.input[start..self.pos]).to_ascii_lowercase();
        Ok(name)
    }

    /// Parse the right-hand side of `attr=`: presence, equality, or
    /// substrings, depending on where the `*`s are.
    fn value(&mut self, attr: String) -> Result<Filter, FilterError> {
        let mut chunks: Vec<Vec<u8>> = vec![Vec::new()];
        loop {
            match self.input.get(self.pos) {
                None | Some(b')') => break,
                Some(b'(') => return Err(self.error("unescaped '(' in value")),
                Some(b'*') => {
                    self.pos += 1;
                    chunks.push(Vec::new());
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let hi = self.hex_digit()?;
                    let lo = self.hex_digit()?;
                    if let Some(chunk) = chunks.last_mut() {
                        chunk.push(hi << 4 | lo);
                    }
                }
                Some(&b) => {
                    self.pos += 1;
                    if let Some(chunk) = chunks.last_mut() {
                        chunk.push(b);
                    }
                }
            }
        }

        if chunks.len() == 1 {
            let only = chunks.remove(0);
            return Ok(Filter::Equality(attr, only));
        }
        // At least one '*': presence if nothing else, substrings otherwise
        if chunks.len() == 2 && chunks[0].is_empty() && chunks[1].is_empty() {
            return Ok(Filter::Present(attr));
        }
        let fin = chunks.pop().filter(|c| !c.is_empty());
        let first = chunks.remove(0);
        let initial = if first.is_empty() { None } else { Some(first) };
        let any = chunks.into_iter().filter(|c| !c.is_empty()).collect();
        Ok(Filter::Substrings(attr, SubstringPattern { initial, any, fin }))
    }

    fn hex_digit(&mut self) -> Result<u8, FilterError> {
        let b = *self.input.get(self.pos).ok_or_else(|| self.error("truncated escape"))?;
        let v = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(self.error("invalid hex escape")),
        };
        self.pos += 1;
        Ok(v)
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
