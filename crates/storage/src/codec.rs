// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary record format for cached entries.
//!
//! Layout (all integers little-endian, fixed width):
//!
//! ```text
//! u8  version
//! u32 dn_len, dn bytes (canonical UTF-8)
//! u32 attribute_count
//!     u32 name_len, name bytes
//!     u32 value_count
//!         u32 value_len, value bytes
//! u32 present_count
//!     u32 name_len, name bytes (sorted)
//! ```
//!
//! Decoding is strict: trailing bytes, bad lengths, or an unknown version
//! byte mean the record (and thus the cache) is corrupt. A format upgrade
//! rewrites the cache offline under a new version byte.

use thiserror::Error;

use shadow_core::{Dn, Entry, EntryRecord};

/// Current record format version.
pub const RECORD_VERSION: u8 = 1;

/// Errors decoding a cache record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported record version: {0}")]
    UnsupportedVersion(u8),

    #[error("record truncated at byte {0}")]
    Truncated(usize),

    #[error("record field is not valid UTF-8")]
    InvalidUtf8,

    #[error("record DN is not canonical: {0:?}")]
    NonCanonicalDn(String),

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

/// Serialize an entry record.
pub fn encode_record(record: &EntryRecord) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.push(RECORD_VERSION);
    put_bytes(&mut out, record.dn().as_str().as_bytes());
    put_u32(&mut out, record.entry.attribute_count() as u32);
    for (name, values) in record.entry.iter() {
        put_bytes(&mut out, name.as_bytes());
        put_u32(&mut out, values.len() as u32);
        for value in values {
            put_bytes(&mut out, value);
        }
    }
    put_u32(&mut out, record.present.len() as u32);
    for name in &record.present {
        put_bytes(&mut out, name.as_bytes());
    }
    out
}

/// Deserialize an entry record; the input must be exactly one record.
pub fn decode_record(bytes: &[u8]) -> Result<EntryRecord, CodecError> {
    let mut r = Reader { bytes, pos: 0 };
    let version = r.u8()?;
    if version != RECORD_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let dn_str = r.string()?;
    if !Dn::is_canonical(&dn_str) {
        return Err(CodecError::NonCanonicalDn(dn_str));
    }
    let mut entry = Entry::new(Dn::new(&dn_str));
    let attr_count = r.u32()?;
    for _ in 0..attr_count {
        let name = r.string()?;
        let value_count = r.u32()?;
        let mut values = Vec::with_capacity(value_count as usize);
        for _ in 0..value_count {
            values.push(r.bytes()?.to_vec());
        }
        entry.set(&name, values);
    }
    let mut record = EntryRecord::new(entry);
    let present_count = r.u32()?;
    for _ in 0..present_count {
        let name = r.string()?;
        record.present.insert(name);
    }
    if r.pos != bytes.len() {
        return Err(CodecError::TrailingBytes(bytes.len() - r.pos));
    }
    Ok(record)
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8, CodecError> {
        let b = *self.bytes.get(self.pos).ok_or(CodecError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let end = self.pos.checked_add(4).ok_or(CodecError::Truncated(self.pos))?;
        let slice = self.bytes.get(self.pos..end).ok_or(CodecError::Truncated(self.pos))?;
        // get() guarantees 4 bytes
        let mut buf = [0u8; 4];
        buf.copy_from_slice(slice);
        self.pos = end;
        Ok(u32::from_le_bytes(buf))
    }

    fn bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32()? as usize;
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated(self.pos))?;
        let slice = self.bytes.get(self.pos..end).ok_or(CodecError::Truncated(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
