//! Log-structured persistent key-value store.
//!
//! All live pairs are held in memory; durability comes from an append-only
//! record log replayed on open and rewritten compact on close.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::error::{Result, SedgeError};
use crate::kv::{KeyVisitor, KvStore, KvVisitor};

const LOG_FILE: &str = "store.log";
const LOG_TMP_FILE: &str = "store.log.tmp";

const OP_SET: u8 = 1;
const OP_DELETE: u8 = 2;

// Record layout: op(1) key_len(4 LE) value_len(4 LE) key value.
const RECORD_HEADER: usize = 9;

pub struct LogKv {
    dir: PathBuf,
    table: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    writer: Mutex<BufWriter<File>>,
    closed: AtomicBool,
}

impl LogKv {
    /// Open (or create) a store rooted at `dir`, replaying any existing log.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| SedgeError::storage(format!("cannot create {}: {e}", dir.display())))?;

        let log_path = dir.join(LOG_FILE);
        let table = Self::replay(&log_path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| SedgeError::storage(format!("cannot open log: {e}")))?;

        Ok(LogKv {
            dir: dir.to_path_buf(),
            table: RwLock::new(table),
            writer: Mutex::new(BufWriter::new(file)),
            closed: AtomicBool::new(false),
        })
    }

    fn replay(log_path: &Path) -> Result<HashMap<Vec<u8>, Vec<u8>>> {
        let mut table = HashMap::new();
        if !log_path.exists() {
            return Ok(table);
        }
        let data = fs::read(log_path)
            .map_err(|e| SedgeError::storage(format!("cannot read log: {e}")))?;

        let mut offset = 0usize;
        let mut good = 0usize;
        while data.len() - offset >= RECORD_HEADER {
            let op = data[offset];
            let key_len = u32::from_le_bytes([
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
                data[offset + 4],
            ]) as usize;
            let value_len = u32::from_le_bytes([
                data[offset + 5],
                data[offset + 6],
                data[offset + 7],
                data[offset + 8],
            ]) as usize;
            let end = offset + RECORD_HEADER + key_len + value_len;
            if end > data.len() || (op != OP_SET && op != OP_DELETE) {
                break;
            }
            let key = data[offset + RECORD_HEADER..offset + RECORD_HEADER + key_len].to_vec();
            match op {
                OP_SET => {
                    let value = data[offset + RECORD_HEADER + key_len..end].to_vec();
                    table.insert(key, value);
                }
                _ => {
                    table.remove(&key);
                }
            }
            offset = end;
            good = end;
        }

        if good < data.len() {
            // A crash mid-append leaves a ragged tail; drop it so fresh
            // records land on a record boundary.
            warn!(
                discarded = data.len() - good,
                path = %log_path.display(),
                "discarding truncated tail of store log"
            );
            let file = OpenOptions::new()
                .write(true)
                .open(log_path)
                .map_err(|e| SedgeError::storage(format!("cannot truncate log: {e}")))?;
            file.set_len(good as u64)
                .map_err(|e| SedgeError::storage(format!("cannot truncate log: {e}")))?;
        }

        Ok(table)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SedgeError::storage("store is closed"));
        }
        Ok(())
    }

    fn append_record(writer: &mut BufWriter<File>, op: u8, key: &[u8], value: &[u8]) -> Result<()> {
        writer
            .write_all(&[op])
            .and_then(|_| writer.write_all(&(key.len() as u32).to_le_bytes()))
            .and_then(|_| writer.write_all(&(value.len() as u32).to_le_bytes()))
            .and_then(|_| writer.write_all(key))
            .and_then(|_| writer.write_all(value))
            .map_err(|e| SedgeError::storage(format!("log append failed: {e}")))
    }

    fn flush(writer: &mut BufWriter<File>) -> Result<()> {
        writer
            .flush()
            .map_err(|e| SedgeError::storage(format!("log flush failed: {e}")))
    }
}

impl KvStore for LogKv {
    fn path(&self) -> &Path {
        &self.dir
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        let mut writer = self.writer.lock();
        Self::append_record(&mut writer, OP_SET, key, value)?;
        Self::flush(&mut writer)?;
        self.table.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn batch_set(&self, keys: &[Vec<u8>], values: &[Vec<u8>]) -> Result<()> {
        if keys.len() != values.len() {
            return Err(SedgeError::invalid_argument(
                "batch_set keys and values differ in length",
            ));
        }
        self.check_open()?;
        let mut writer = self.writer.lock();
        for (key, value) in keys.iter().zip(values) {
            Self::append_record(&mut writer, OP_SET, key, value)?;
        }
        // The batch is only durable once the final flush succeeds.
        Self::flush(&mut writer)?;
        let mut table = self.table.write();
        for (key, value) in keys.iter().zip(values) {
            table.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.table.read().get(key).cloned())
    }

    fn batch_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        self.check_open()?;
        let table = self.table.read();
        Ok(keys.iter().map(|k| table.get(k).cloned()).collect())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_open()?;
        let mut writer = self.writer.lock();
        Self::append_record(&mut writer, OP_DELETE, key, &[])?;
        Self::flush(&mut writer)?;
        self.table.write().remove(key);
        Ok(())
    }

    fn batch_delete(&self, keys: &[Vec<u8>]) -> Result<()> {
        self.check_open()?;
        let mut writer = self.writer.lock();
        for key in keys {
            Self::append_record(&mut writer, OP_DELETE, key, &[])?;
        }
        Self::flush(&mut writer)?;
        let mut table = self.table.write();
        for key in keys {
            table.remove(key);
        }
        Ok(())
    }

    fn has(&self, key: &[u8]) -> bool {
        self.table.read().contains_key(key)
    }

    fn iter_db(&self, visit: KvVisitor<'_>) -> Result<u64> {
        self.check_open()?;
        // Visit a sorted snapshot so callers never hold the table lock.
        let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = {
            let table = self.table.read();
            table.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut count = 0u64;
        for (key, value) in &pairs {
            visit(key, value)?;
            count += 1;
        }
        Ok(count)
    }

    fn iter_keys(&self, visit: KeyVisitor<'_>) -> Result<u64> {
        self.check_open()?;
        let mut keys: Vec<Vec<u8>> = self.table.read().keys().cloned().collect();
        keys.sort();

        let mut count = 0u64;
        for key in &keys {
            visit(key)?;
            count += 1;
        }
        Ok(count)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        Self::flush(&mut writer)?;

        // Rewrite the log compact: one set record per live pair, then
        // atomically swap it in.
        let tmp_path = self.dir.join(LOG_TMP_FILE);
        let tmp = File::create(&tmp_path)
            .map_err(|e| SedgeError::storage(format!("cannot create compaction file: {e}")))?;
        let mut compact = BufWriter::new(tmp);
        {
            let table = self.table.read();
            for (key, value) in table.iter() {
                Self::append_record(&mut compact, OP_SET, key, value)?;
            }
        }
        Self::flush(&mut compact)?;
        compact
            .get_ref()
            .sync_all()
            .map_err(|e| SedgeError::storage(format!("compaction sync failed: {e}")))?;
        fs::rename(&tmp_path, self.dir.join(LOG_FILE))
            .map_err(|e| SedgeError::storage(format!("compaction rename failed: {e}")))?;
        Ok(())
    }
}
