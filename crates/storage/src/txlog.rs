// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional append-only transaction log for downstream tailers.
//!
//! `transaction` holds one text line per committed transaction,
//! `<id> <command_char> <dn>`, and `transaction.index` holds fixed-width
//! `(id u64 LE, offset u64 LE)` pairs for random access by id. The log line
//! is written and fsynced before its index entry; recovery walks the index
//! backwards to the last entry whose line is complete and truncates both
//! files there, so a tailer never sees a torn record.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use shadow_core::{ChangeKind, Dn, Transaction};

const INDEX_ENTRY_LEN: u64 = 16;

/// Errors from transaction log operations. All of them halt the pipeline;
/// a log that cannot be written must not fall silently behind the cache.
#[derive(Debug, Error)]
pub enum TxLogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transaction log corrupt: {0}")]
    Corrupt(String),

    #[error("transaction {got} out of order (last committed {last})")]
    OutOfOrder { last: u64, got: u64 },
}

/// Append-only `(id, command, dn)` log plus its sparse offset index.
pub struct TransactionLog {
    log: File,
    index: File,
    log_path: PathBuf,
    log_len: u64,
    count: u64,
    last_id: Option<u64>,
}

impl TransactionLog {
    /// Open the pair of files, truncating any partial tail left by a crash.
    pub fn open(log_path: &Path, index_path: &Path) -> Result<Self, TxLogError> {
        let mut log = open_rw(log_path)?;
        let mut index = open_rw(index_path)?;

        let mut index_len = index.metadata()?.len();
        if index_len % INDEX_ENTRY_LEN != 0 {
            index_len -= index_len % INDEX_ENTRY_LEN;
            warn!(path = %index_path.display(), "truncating partial index entry");
            index.set_len(index_len)?;
        }
        let mut count = index_len / INDEX_ENTRY_LEN;
        let log_len = log.metadata()?.len();

        // Walk back to the newest index entry whose log line is complete.
        let mut good_end = 0u64;
        let mut last_id = None;
        while count > 0 {
            let (id, offset) = read_index_entry(&mut index, count - 1)?;
            if offset < log_len {
                if let Some(line_end) = line_end(&mut log, offset, log_len)? {
                    good_end = line_end;
                    last_id = Some(id);
                    break;
                }
            }
            warn!(id, offset, "dropping transaction with incomplete log line");
            count -= 1;
        }
        if count * INDEX_ENTRY_LEN != index_len {
            index.set_len(count * INDEX_ENTRY_LEN)?;
            index.sync_data()?;
        }
        if good_end != log_len {
            warn!(
                path = %log_path.display(),
                torn_bytes = log_len - good_end,
                "truncating unindexed transaction log tail"
            );
            log.set_len(good_end)?;
            log.sync_data()?;
        }

        Ok(Self {
            log,
            index,
            log_path: log_path.to_path_buf(),
            log_len: good_end,
            count,
            last_id,
        })
    }

    pub fn last_id(&self) -> Option<u64> {
        self.last_id
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append one committed transaction. Both files are fsynced before this
    /// returns. Ids advance by exactly one; re-appending the last committed
    /// id is a no-op so that a crash between the append and the cursor
    /// advance replays cleanly.
    pub fn append(&mut self, txn: &Transaction) -> Result<(), TxLogError> {
        if let Some(last) = self.last_id {
            if txn.id == last {
                return Ok(());
            }
            if txn.id != last + 1 {
                return Err(TxLogError::OutOfOrder { last, got: txn.id });
            }
        }
        let line = format!("{} {} {}\n", txn.id, txn.kind.as_char(), txn.dn);
        self.log.seek(SeekFrom::Start(self.log_len))?;
        self.log.write_all(line.as_bytes())?;
        self.log.sync_data()?;

        let mut entry = [0u8; INDEX_ENTRY_LEN as usize];
        entry[..8].copy_from_slice(&txn.id.to_le_bytes());
        entry[8..].copy_from_slice(&self.log_len.to_le_bytes());
        self.index.seek(SeekFrom::Start(self.count * INDEX_ENTRY_LEN))?;
        self.index.write_all(&entry)?;
        self.index.sync_data()?;

        self.log_len += line.len() as u64;
        self.count += 1;
        self.last_id = Some(txn.id);
        Ok(())
    }

    /// Random access by transaction id via binary search over the index.
    pub fn lookup(&mut self, id: u64) -> Result<Option<Transaction>, TxLogError> {
        let mut lo = 0u64;
        let mut hi = self.count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (entry_id, offset) = read_index_entry(&mut self.index, mid)?;
            match entry_id.cmp(&id) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => {
                    let txn = self.read_line_at(offset)?;
                    if txn.id != id {
                        return Err(TxLogError::Corrupt(format!(
                            "index points id {id} at a line for id {}",
                            txn.id
                        )));
                    }
                    return Ok(Some(txn));
                }
            }
        }
        Ok(None)
    }

    fn read_line_at(&mut self, offset: u64) -> Result<Transaction, TxLogError> {
        let end = line_end(&mut self.log, offset, self.log_len)?.ok_or_else(|| {
            TxLogError::Corrupt(format!("unterminated log line at offset {offset}"))
        })?;
        self.log.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; (end - offset) as usize];
        self.log.read_exact(&mut buf)?;
        let line = std::str::from_utf8(&buf)
            .map_err(|_| TxLogError::Corrupt("log line is not UTF-8".to_string()))?
            .trim_end_matches('\n');
        parse_line(line, &self.log_path)
    }
}

fn parse_line(line: &str, path: &Path) -> Result<Transaction, TxLogError> {
    let corrupt =
        || TxLogError::Corrupt(format!("malformed line in {}: {line:?}", path.display()));
    let mut parts = line.splitn(3, ' ');
    let id = parts.next().and_then(|f| f.parse::<u64>().ok()).ok_or_else(corrupt)?;
    let kind_field = parts.next().ok_or_else(corrupt)?;
    let mut kind_chars = kind_field.chars();
    let kind = match (kind_chars.next(), kind_chars.next()) {
        (Some(c), None) => ChangeKind::from_char(c).map_err(|_| corrupt())?,
        _ => return Err(corrupt()),
    };
    let dn = Dn::new(parts.next().ok_or_else(corrupt)?);
    Ok(Transaction::new(id, dn, kind))
}

fn open_rw(path: &Path) -> Result<File, TxLogError> {
    Ok(OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)?)
}

fn read_index_entry(index: &mut File, position: u64) -> Result<(u64, u64), TxLogError> {
    index.seek(SeekFrom::Start(position * INDEX_ENTRY_LEN))?;
    let mut entry = [0u8; INDEX_ENTRY_LEN as usize];
    index.read_exact(&mut entry)?;
    let mut id = [0u8; 8];
    id.copy_from_slice(&entry[..8]);
    let mut offset = [0u8; 8];
    offset.copy_from_slice(&entry[8..]);
    Ok((u64::from_le_bytes(id), u64::from_le_bytes(offset)))
}

/// Byte offset just past the newline of the line starting at `offset`, or
/// `None` if the line is not newline-terminated within `len`.
fn line_end(log: &mut File, offset: u64, len: u64) -> Result<Option<u64>, TxLogError> {
    log.seek(SeekFrom::Start(offset))?;
    let mut pos = offset;
    let mut buf = [0u8; 256];
    while pos < len {
        let want = ((len - pos).min(buf.len() as u64)) as usize;
        let n = log.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        if let Some(idx) = buf[..n].iter().position(|&b| b == b'\n') {
            return Ok(Some(pos + idx as u64 + 1));
        }
        pos += n as u64;
    }
    Ok(None)
}

#[cfg(test)]
#[path = "txlog_tests.rs"]
mod tests;
