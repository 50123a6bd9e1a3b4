//! The partition log: an ordered, append-only sequence of records.
//!
//! Positions are assigned on append and start at 1. A file-backed log uses the
//! same length-prefixed MessagePack framing as the state WAL and follows the
//! store's durability mode: in `Sync` mode every append is synced to disk
//! before it returns.
//!
//! Records are also kept in memory for reads. `release_through` drops records
//! the state already covers; the file itself is never truncated, so reopening
//! reads it completely.

use crate::core::{EngineError, PartitionId, Position, Result};
use crate::db::DurabilityMode;
use crate::record::Record;
use log::warn;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const LOG_FILE_NAME: &str = "partition.log";

struct LogInner {
    partition_id: PartitionId,
    /// Position of `records[0]`.
    first_position: Position,
    last_position: Position,
    records: Vec<Record>,
    writer: Option<BufWriter<File>>,
    durability: DurabilityMode,
    read_only: bool,
    path: Option<PathBuf>,
}

impl LogInner {
    fn new(partition_id: PartitionId, records: Vec<Record>) -> Self {
        let last_position = records.last().map_or(0, |record| record.position);
        let first_position = records.first().map_or(1, |record| record.position);
        Self {
            partition_id,
            first_position,
            last_position,
            records,
            writer: None,
            durability: DurabilityMode::None,
            read_only: false,
            path: None,
        }
    }

    fn index_of(&self, position: Position) -> Option<usize> {
        usize::try_from(position - self.first_position).ok()
    }
}

/// Shared handle to a partition log. Clones see the same records, so a log can
/// outlive the processor that wrote it (restart tests, replay).
#[derive(Clone)]
pub struct LogStream {
    inner: Arc<Mutex<LogInner>>,
}

impl LogStream {
    pub fn in_memory(partition_id: PartitionId) -> Self {
        Self::from_inner(LogInner::new(partition_id, Vec::new()))
    }

    fn from_inner(inner: LogInner) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Opens (or creates) the log file in `dir` and reads every complete record.
    /// A torn record at the end of the file is cut off.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        partition_id: PartitionId,
        durability: DurabilityMode,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .map_err(|e| EngineError::IoError(format!("Failed to create log directory: {}", e)))?;
        let path = dir.join(LOG_FILE_NAME);

        let (records, valid_len) = if path.exists() {
            read_frames(&path)?
        } else {
            (Vec::new(), 0)
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| EngineError::IoError(format!("Failed to open log file: {}", e)))?;
        if file.metadata()?.len() > valid_len {
            file.set_len(valid_len)?;
        }

        let mut inner = LogInner::new(partition_id, records);
        inner.writer = Some(BufWriter::new(file));
        inner.durability = durability;
        inner.path = Some(path);
        Ok(Self::from_inner(inner))
    }

    /// Reads the complete records of the log file in `dir` without creating,
    /// truncating or writing anything. Appending to the returned log fails.
    pub fn open_read_only<P: AsRef<Path>>(dir: P, partition_id: PartitionId) -> Result<Self> {
        let path = dir.as_ref().join(LOG_FILE_NAME);
        let records = if path.is_file() {
            read_frames(&path)?.0
        } else {
            Vec::new()
        };

        let mut inner = LogInner::new(partition_id, records);
        inner.read_only = true;
        inner.path = Some(path);
        Ok(Self::from_inner(inner))
    }

    /// Appends records in order, assigning positions and the partition id.
    /// Returns the appended records as written.
    pub fn append(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        let mut inner = self.inner.lock()?;
        if inner.read_only {
            return Err(EngineError::ReadOnly(
                "Expected a writable partition log, but it was opened read-only".to_string(),
            ));
        }
        let mut position = inner.last_position;
        let partition_id = inner.partition_id;

        let mut written = Vec::with_capacity(records.len());
        for mut record in records {
            position += 1;
            record.position = position;
            record.partition_id = partition_id;
            written.push(record);
        }

        let durability = inner.durability;
        if let Some(writer) = inner.writer.as_mut() {
            for record in &written {
                let frame = rmp_serde::to_vec(record)?;
                writer.write_all(&(frame.len() as u32).to_le_bytes())?;
                writer.write_all(&frame)?;
            }
            writer.flush()?;
            if durability == DurabilityMode::Sync {
                writer
                    .get_ref()
                    .sync_data()
                    .map_err(|e| EngineError::IoError(format!("Failed to sync log: {}", e)))?;
            }
        }
        if inner.records.is_empty() {
            inner.first_position = inner.last_position + 1;
        }
        inner.last_position = position;
        inner.records.extend(written.iter().cloned());
        Ok(written)
    }

    pub fn record(&self, position: Position) -> Result<Option<Record>> {
        let inner = self.inner.lock()?;
        Ok(inner
            .index_of(position)
            .and_then(|index| inner.records.get(index).cloned()))
    }

    /// Records at or after `position` that are still held in memory, in position order.
    pub fn read_from(&self, position: Position) -> Result<Vec<Record>> {
        let inner = self.inner.lock()?;
        let start = inner
            .index_of(position.max(inner.first_position))
            .unwrap_or(0)
            .min(inner.records.len());
        Ok(inner.records[start..].to_vec())
    }

    pub fn records(&self) -> Result<Vec<Record>> {
        Ok(self.inner.lock()?.records.clone())
    }

    /// Drops records up to and including `position` from memory. They stay in the file.
    pub fn release_through(&self, position: Position) -> Result<usize> {
        let mut inner = self.inner.lock()?;
        let count = inner
            .index_of(position + 1)
            .unwrap_or(0)
            .min(inner.records.len());
        inner.records.drain(..count);
        inner.first_position += count as Position;
        Ok(count)
    }

    /// Position of the first record held in memory.
    pub fn first_position(&self) -> Result<Position> {
        Ok(self.inner.lock()?.first_position)
    }

    pub fn last_position(&self) -> Result<Position> {
        Ok(self.inner.lock()?.last_position)
    }

    /// Number of records held in memory.
    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.lock()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.inner.lock()?.records.is_empty())
    }

    pub fn partition_id(&self) -> Result<PartitionId> {
        Ok(self.inner.lock()?.partition_id)
    }

    pub fn path(&self) -> Result<Option<PathBuf>> {
        Ok(self.inner.lock()?.path.clone())
    }
}

/// Reads complete frames and returns them with the byte length they cover.
fn read_frames(path: &Path) -> Result<(Vec<Record>, u64)> {
    let file = File::open(path)
        .map_err(|e| EngineError::IoError(format!("Failed to open log for reading: {}", e)))?;
    let mut reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut valid_len = 0u64;
    loop {
        let mut len_bytes = [0u8; 4];
        match reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut data = vec![0u8; len];
        match reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!(
                    "Dropping torn record at the end of {} ({} bytes announced)",
                    path.display(),
                    len
                );
                break;
            }
            Err(e) => return Err(e.into()),
        }
        records.push(rmp_serde::from_slice::<Record>(&data)?);
        valid_len += 4 + len as u64;
    }
    Ok((records, valid_len))
}
