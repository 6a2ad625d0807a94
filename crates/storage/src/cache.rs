// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The entry cache: a log-structured, single-writer store from DN to
//! `(entry, module-present set)`.
//!
//! Layout: `entries.db` is a sequence of length-prefixed frames, each a
//! `put` record or a `delete` tombstone. An in-memory DN → offset index is
//! rebuilt by scanning at open. A torn tail frame (crash mid-append) is
//! truncated on recovery; a complete frame that fails to decode is cache
//! corruption and fatal. Every committed frame is fsynced before the
//! transaction that produced it may advance the cursor.
//!
//! External tools may read the file concurrently: frames are only ever
//! appended and the writer never rewrites committed bytes (compaction goes
//! through a temp file + rename).

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use shadow_core::{Dn, EntryRecord};

use crate::codec::{decode_record, encode_record, CodecError};

const ENTRIES_FILE: &str = "entries.db";
const META_FILE: &str = "meta.db";

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// Errors from cache operations. Codec errors on committed frames mean the
/// store is corrupt and are fatal to the pipeline.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache corruption: {0}")]
    Codec(#[from] CodecError),

    #[error("cache corruption: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u64,
    frame_len: u64,
}

/// Durable DN → [`EntryRecord`] store.
pub struct EntryCache {
    file: File,
    path: PathBuf,
    index: HashMap<Dn, Slot>,
    end: u64,
    dead_bytes: u64,
}

impl EntryCache {
    /// Open (or create) the cache under `dir`, rebuilding the index and
    /// truncating a torn tail frame left by a crash.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(ENTRIES_FILE);
        let mut file =
            OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path)?;
        let file_len = file.metadata()?.len();

        let mut index: HashMap<Dn, Slot> = HashMap::new();
        let mut dead_bytes = 0u64;
        let mut offset = 0u64;
        file.seek(SeekFrom::Start(0))?;

        loop {
            let mut len_buf = [0u8; 4];
            match read_exact_or_eof(&mut file, &mut len_buf)? {
                ReadOutcome::Eof => break,
                ReadOutcome::Partial => {
                    truncate_tail(&mut file, &path, offset, file_len)?;
                    break;
                }
                ReadOutcome::Full => {}
            }
            let body_len = u32::from_le_bytes(len_buf) as u64;
            let mut body = vec![0u8; body_len as usize];
            match read_exact_or_eof(&mut file, &mut body)? {
                ReadOutcome::Full => {}
                ReadOutcome::Eof | ReadOutcome::Partial => {
                    truncate_tail(&mut file, &path, offset, file_len)?;
                    break;
                }
            }
            let frame_len = 4 + body_len;
            apply_frame(&body, offset, frame_len, &mut index, &mut dead_bytes)?;
            offset += frame_len;
        }

        let end = file.seek(SeekFrom::Start(offset))?;
        Ok(Self { file, path, index, end, dead_bytes })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes occupied by superseded or deleted frames.
    pub fn garbage_bytes(&self) -> u64 {
        self.dead_bytes
    }

    pub fn get(&mut self, dn: &Dn) -> Result<Option<EntryRecord>, CacheError> {
        let Some(slot) = self.index.get(dn).copied() else {
            return Ok(None);
        };
        let body = self.read_body(slot)?;
        if body.first() != Some(&OP_PUT) {
            return Err(CacheError::Corrupt(format!("indexed frame for {dn} is not a record")));
        }
        Ok(Some(decode_record(&body[1..])?))
    }

    /// Insert or replace the record for its DN. The frame is fsynced before
    /// this returns.
    pub fn put(&mut self, record: &EntryRecord) -> Result<(), CacheError> {
        let mut body = Vec::with_capacity(128);
        body.push(OP_PUT);
        body.extend_from_slice(&encode_record(record));
        let slot = self.append_frame(&body)?;
        if let Some(old) = self.index.insert(record.dn().clone(), slot) {
            self.dead_bytes += old.frame_len;
        }
        Ok(())
    }

    /// Remove the record for `dn`, if any. Appends a tombstone; a missing
    /// DN is a no-op.
    pub fn delete(&mut self, dn: &Dn) -> Result<(), CacheError> {
        let Some(old) = self.index.remove(dn) else {
            return Ok(());
        };
        let mut body = Vec::with_capacity(1 + 4 + dn.as_str().len());
        body.push(OP_DELETE);
        body.extend_from_slice(&(dn.as_str().len() as u32).to_le_bytes());
        body.extend_from_slice(dn.as_str().as_bytes());
        let slot = self.append_frame(&body)?;
        self.dead_bytes += old.frame_len + slot.frame_len;
        Ok(())
    }

    /// All live DNs in sorted order (stable iteration for resync readers).
    pub fn dns(&self) -> Vec<Dn> {
        let mut dns: Vec<Dn> = self.index.keys().cloned().collect();
        dns.sort();
        dns
    }

    /// Materialize every live record in DN order.
    pub fn records(&mut self) -> Result<Vec<EntryRecord>, CacheError> {
        let mut out = Vec::with_capacity(self.index.len());
        for dn in self.dns() {
            if let Some(record) = self.get(&dn)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Rewrite the store with only live records, dropping tombstones and
    /// superseded frames. Crash-safe: the new file is fsynced before it
    /// replaces the old one.
    pub fn compact(&mut self) -> Result<(), CacheError> {
        let tmp_path = self.path.with_extension("db.tmp");
        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut new_index: HashMap<Dn, Slot> = HashMap::with_capacity(self.index.len());
        let mut offset = 0u64;
        for dn in self.dns() {
            let slot = match self.index.get(&dn) {
                Some(slot) => *slot,
                None => continue,
            };
            let body = self.read_body(slot)?;
            let frame_len = write_frame(&mut tmp, &body)?;
            new_index.insert(dn, Slot { offset, frame_len });
            offset += frame_len;
        }
        tmp.sync_data()?;
        fs::rename(&tmp_path, &self.path)?;

        let reclaimed = self.dead_bytes;
        self.file = tmp;
        self.index = new_index;
        self.end = offset;
        self.dead_bytes = 0;
        info!(reclaimed, live = self.index.len(), "compacted entry cache");
        Ok(())
    }

    fn append_frame(&mut self, body: &[u8]) -> Result<Slot, CacheError> {
        self.file.seek(SeekFrom::Start(self.end))?;
        let frame_len = write_frame(&mut self.file, body)?;
        self.file.sync_data()?;
        let slot = Slot { offset: self.end, frame_len };
        self.end += frame_len;
        Ok(slot)
    }

    fn read_body(&mut self, slot: Slot) -> Result<Vec<u8>, CacheError> {
        self.file.seek(SeekFrom::Start(slot.offset + 4))?;
        let mut body = vec![0u8; (slot.frame_len - 4) as usize];
        self.file.read_exact(&mut body)?;
        Ok(body)
    }
}

fn write_frame(file: &mut File, body: &[u8]) -> Result<u64, CacheError> {
    file.write_all(&(body.len() as u32).to_le_bytes())?;
    file.write_all(body)?;
    Ok(4 + body.len() as u64)
}

fn apply_frame(
    body: &[u8],
    offset: u64,
    frame_len: u64,
    index: &mut HashMap<Dn, Slot>,
    dead_bytes: &mut u64,
) -> Result<(), CacheError> {
    match body.first() {
        Some(&OP_PUT) => {
            let record = decode_record(&body[1..])?;
            if let Some(old) = index.insert(record.dn().clone(), Slot { offset, frame_len }) {
                *dead_bytes += old.frame_len;
            }
        }
        Some(&OP_DELETE) => {
            let bad_tombstone =
                || CacheError::Corrupt(format!("malformed tombstone at offset {offset}"));
            let len_bytes = body.get(1..5).ok_or_else(bad_tombstone)?;
            let mut len_buf = [0u8; 4];
            len_buf.copy_from_slice(len_bytes);
            let dn_len = u32::from_le_bytes(len_buf) as usize;
            let dn_bytes = body.get(5..5 + dn_len).ok_or_else(bad_tombstone)?;
            if body.len() != 5 + dn_len {
                return Err(bad_tombstone());
            }
            let dn_str = std::str::from_utf8(dn_bytes)
                .map_err(|_| CacheError::Corrupt("tombstone DN is not UTF-8".to_string()))?;
            if let Some(old) = index.remove(&Dn::new(dn_str)) {
                *dead_bytes += old.frame_len + frame_len;
            }
        }
        other => {
            return Err(CacheError::Corrupt(format!(
                "unknown frame op {other:?} at offset {offset}"
            )));
        }
    }
    Ok(())
}

enum ReadOutcome {
    Full,
    Partial,
    Eof,
}

fn read_exact_or_eof(file: &mut File, buf: &mut [u8]) -> Result<ReadOutcome, CacheError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            return Ok(if filled == 0 { ReadOutcome::Eof } else { ReadOutcome::Partial });
        }
        filled += n;
    }
    Ok(ReadOutcome::Full)
}

fn truncate_tail(
    file: &mut File,
    path: &Path,
    good_end: u64,
    file_len: u64,
) -> Result<(), CacheError> {
    warn!(
        path = %path.display(),
        torn_bytes = file_len - good_end,
        "truncating torn frame at cache tail"
    );
    file.set_len(good_end)?;
    file.sync_data()?;
    Ok(())
}

/// Small typed metadata table kept next to the entry cache
/// (`notifier_id`, `schema_id`, and free-form keys).
///
/// Rewritten atomically on every set; the table stays tiny.
pub struct MetaTable {
    path: PathBuf,
    values: BTreeMap<String, Vec<u8>>,
}

const META_VERSION: u8 = 1;

impl MetaTable {
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(META_FILE);
        let values = match fs::read(&path) {
            Ok(bytes) => parse_meta(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        let bytes = self.values.get(key)?;
        let arr: [u8; 8] = bytes.as_slice().try_into().ok()?;
        Some(u64::from_le_bytes(arr))
    }

    pub fn set(&mut self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.values.insert(key.to_string(), value);
        self.write()
    }

    pub fn set_u64(&mut self, key: &str, value: u64) -> Result<(), CacheError> {
        self.set(key, value.to_le_bytes().to_vec())
    }

    fn write(&self) -> Result<(), CacheError> {
        let mut out = vec![META_VERSION];
        out.extend_from_slice(&(self.values.len() as u32).to_le_bytes());
        for (key, value) in &self.values {
            out.extend_from_slice(&(key.len() as u32).to_le_bytes());
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(value);
        }
        let tmp_path = self.path.with_extension("db.tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&out)?;
        tmp.sync_data()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn parse_meta(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, CacheError> {
    let corrupt = || CacheError::Corrupt("metadata table truncated".to_string());
    let mut values = BTreeMap::new();
    let mut pos = 0usize;
    let version = *bytes.first().ok_or_else(corrupt)?;
    if version != META_VERSION {
        return Err(CacheError::Corrupt(format!("unknown metadata version {version}")));
    }
    pos += 1;
    let count = read_u32(bytes, &mut pos).ok_or_else(corrupt)?;
    for _ in 0..count {
        let key_len = read_u32(bytes, &mut pos).ok_or_else(corrupt)? as usize;
        let key = bytes.get(pos..pos + key_len).ok_or_else(corrupt)?;
        pos += key_len;
        let value_len = read_u32(bytes, &mut pos).ok_or_else(corrupt)? as usize;
        let value = bytes.get(pos..pos + value_len).ok_or_else(corrupt)?;
        pos += value_len;
        let key = String::from_utf8(key.to_vec())
            .map_err(|_| CacheError::Corrupt("metadata key is not UTF-8".to_string()))?;
        values.insert(key, value.to_vec());
    }
    if pos != bytes.len() {
        return Err(CacheError::Corrupt("trailing bytes in metadata table".to_string()));
    }
    Ok(values)
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Option<u32> {
    let slice = bytes.get(*pos..*pos + 4)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(slice);
    *pos += 4;
    Some(u32::from_le_bytes(buf))
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
