//! Core DayStore implementation

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{DAY_FORMAT, MONTH_FORMAT, PARTITION_EXT, StoreError};

/// File name of the partition for `day`
pub fn partition_name(prefix: &str, day: NaiveDate) -> String {
    format!("{}_{}.{}", prefix, day.format(DAY_FORMAT), PARTITION_EXT)
}

/// Append-only store with one JSONL file per day
pub struct DayStore<R> {
    /// Base path for storage
    root: PathBuf,
    /// File name prefix shared by all partitions
    prefix: String,
    /// In-process write locks, one per partition
    locks: Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>,
    _record: PhantomData<fn() -> R>,
}

impl<R> DayStore<R>
where
    R: Serialize + DeserializeOwned,
{
    /// Open or create a store rooted at `root`
    pub fn open(root: impl AsRef<Path>, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        let prefix = prefix.into();
        debug!(?root, %prefix, "Opened day store");
        Ok(Self {
            root,
            prefix,
            locks: Mutex::new(HashMap::new()),
            _record: PhantomData,
        })
    }

    /// Full path of the partition holding `day`
    pub fn partition_path(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join(day.format(MONTH_FORMAT).to_string())
            .join(partition_name(&self.prefix, day))
    }

    /// Append one record to the partition for `day`
    ///
    /// The line is written under the partition's in-process lock and an
    /// exclusive advisory file lock, so concurrent appenders never interleave.
    pub fn append(&self, day: NaiveDate, record: &R) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let path = self.partition_path(day);
        let lock = self.partition_lock(day);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;

        FileExt::lock_exclusive(&file).map_err(|e| StoreError::io(&path, e))?;
        let written = file.write_all(line.as_bytes()).and_then(|_| file.flush());
        let unlocked = FileExt::unlock(&file);
        written.map_err(|e| StoreError::io(&path, e))?;
        unlocked.map_err(|e| StoreError::io(&path, e))?;

        debug!(%day, path = %path.display(), "Appended record");
        Ok(())
    }

    /// Read every record of `day` in insertion order
    ///
    /// An absent partition reads as empty. Lines that fail to decode are
    /// skipped with a warning.
    pub fn read_day(&self, day: NaiveDate) -> Result<Vec<R>, StoreError> {
        let path = self.partition_path(day);
        if !path.exists() {
            debug!(%day, "No partition for day");
            return Ok(Vec::new());
        }

        let file = File::open(&path).map_err(|e| StoreError::io(&path, e))?;
        FileExt::lock_shared(&file).map_err(|e| StoreError::io(&path, e))?;
        let records = read_lines(&path, &file);
        let unlocked = FileExt::unlock(&file);
        let records = records?;
        unlocked.map_err(|e| StoreError::io(&path, e))?;

        debug!(%day, count = records.len(), "Read partition");
        Ok(records)
    }

    fn partition_lock(&self, day: NaiveDate) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(day).or_default().clone()
    }
}

fn read_lines<R: DeserializeOwned>(path: &Path, file: &File) -> Result<Vec<R>, StoreError> {
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| StoreError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), line = index + 1, error = %e, "Skipping malformed record"),
        }
    }

    Ok(records)
}
