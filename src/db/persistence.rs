//! Write-ahead log and snapshot persistence for the state store

use crate::core::{EngineError, Result};
use im::OrdMap;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

pub type StoreMap = OrdMap<Vec<u8>, Vec<u8>>;

const WAL_FILE_NAME: &str = "state.wal";
const SNAPSHOT_FILE_NAME: &str = "state.snapshot";
const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ============================================================================
// WAL Entry Types
// ============================================================================

/// A single key mutation of a committed transaction; `None` is a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOp {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    Commit { transaction_id: u64, writes: Vec<WriteOp> },
}

pub(crate) fn apply_writes(map: &mut StoreMap, writes: &[WriteOp]) {
    for write in writes {
        match &write.value {
            Some(value) => {
                map.insert(write.key.clone(), value.clone());
            }
            None => {
                map.remove(&write.key);
            }
        }
    }
}

// ============================================================================
// State Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub entries: StoreMap,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: i64,
    pub entry_count: usize,
}

impl StateSnapshot {
    pub fn new(entries: StoreMap) -> Self {
        let entry_count = entries.len();
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            entries,
            metadata: SnapshotMetadata {
                created_at: chrono::Utc::now().timestamp_millis(),
                entry_count,
            },
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DurabilityMode {
    /// fsync the WAL on every commit.
    #[default]
    Sync,
    /// Flush the WAL to the OS on every commit, let the OS decide when to sync.
    Async,
    /// Keep state in memory only.
    None,
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    wal_file: Option<BufWriter<File>>,
    durability_mode: DurabilityMode,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

impl WalManager {
    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode) -> Result<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::IoError(format!("Failed to create WAL directory: {}", e))
            })?;
        }

        let wal_file = if durability_mode != DurabilityMode::None {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&wal_path)
                .map_err(|e| EngineError::IoError(format!("Failed to open WAL file: {}", e)))?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        Ok(Self {
            wal_path,
            wal_file,
            durability_mode,
            entries_since_checkpoint: 0,
            checkpoint_threshold: 1000,
        })
    }

    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let file = self
            .wal_file
            .as_mut()
            .ok_or_else(|| EngineError::IoError("WAL file not initialized".to_string()))?;
        let serialized = rmp_serde::to_vec(entry)?;
        let len = serialized.len() as u32;
        file.write_all(&len.to_le_bytes())
            .map_err(|e| EngineError::IoError(format!("Failed to write WAL: {}", e)))?;
        file.write_all(&serialized)
            .map_err(|e| EngineError::IoError(format!("Failed to write WAL: {}", e)))?;
        file.flush()
            .map_err(|e| EngineError::IoError(format!("Failed to flush WAL: {}", e)))?;
        if self.durability_mode == DurabilityMode::Sync {
            file.get_mut()
                .sync_all()
                .map_err(|e| EngineError::IoError(format!("Failed to sync WAL: {}", e)))?;
        }
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    /// Reads all complete entries. A torn frame at the end of the file (crash during
    /// append) belongs to a transaction that was never acknowledged and is dropped.
    pub fn read_all(&self) -> Result<Vec<WalEntry>> {
        if !self.wal_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.wal_path)
            .map_err(|e| EngineError::IoError(format!("Failed to open WAL for reading: {}", e)))?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(EngineError::IoError(format!(
                        "Failed to read WAL entry length: {}",
                        e
                    )));
                }
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    warn!(
                        "Dropping torn WAL entry at the end of {} ({} bytes announced)",
                        self.wal_path.display(),
                        len
                    );
                    break;
                }
                Err(e) => {
                    return Err(EngineError::IoError(format!(
                        "Failed to read WAL entry data: {}",
                        e
                    )));
                }
            }
            let entry: WalEntry = rmp_serde::from_slice(&data)?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.wal_file = None;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.wal_path)
            .map_err(|e| EngineError::IoError(format!("Failed to truncate WAL: {}", e)))?;
        self.wal_file = Some(BufWriter::new(file));
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold.max(1);
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let parent = self
            .snapshot_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent).map_err(|e| {
            EngineError::IoError(format!("Failed to create snapshot directory: {}", e))
        })?;
        let temp_file = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| EngineError::IoError(format!("Failed to create temp file: {}", e)))?;
        let serialized = rmp_serde::to_vec(snapshot)?;
        {
            let mut writer = BufWriter::new(temp_file.as_file());
            writer
                .write_all(&serialized)
                .map_err(|e| EngineError::IoError(format!("Failed to write snapshot: {}", e)))?;
            writer
                .flush()
                .map_err(|e| EngineError::IoError(format!("Failed to flush snapshot: {}", e)))?;
        }
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| EngineError::IoError(format!("Failed to sync snapshot: {}", e)))?;
        temp_file
            .persist(&self.snapshot_path)
            .map_err(|e| EngineError::IoError(format!("Failed to rename snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StateSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path)
            .map_err(|e| EngineError::IoError(format!("Failed to open snapshot: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| EngineError::IoError(format!("Failed to read snapshot: {}", e)))?;
        let snapshot: StateSnapshot = rmp_serde::from_slice(&data)?;
        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(EngineError::Codec(format!(
                "Unsupported snapshot format version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

// ============================================================================
// Persistence Manager
// ============================================================================

pub struct PersistenceManager {
    wal: WalManager,
    snapshot: SnapshotManager,
    durability_mode: DurabilityMode,
}

impl PersistenceManager {
    pub fn new<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let wal = WalManager::new(data_dir.join(WAL_FILE_NAME), durability_mode)?;
        let snapshot = SnapshotManager::new(data_dir.join(SNAPSHOT_FILE_NAME));
        Ok(Self {
            wal,
            snapshot,
            durability_mode,
        })
    }

    pub fn log(&mut self, entry: &WalEntry) -> Result<()> {
        self.wal.append(entry)
    }

    pub fn checkpoint(&mut self, entries: &StoreMap) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.snapshot.save(&StateSnapshot::new(entries.clone()))?;
        self.wal.clear()
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint()
    }

    /// Rebuilds the committed map from the last snapshot plus every complete WAL entry.
    pub fn recover(&self) -> Result<StoreMap> {
        let mut entries = match self.snapshot.load()? {
            Some(snapshot) => snapshot.entries,
            None => StoreMap::new(),
        };
        for entry in self.wal.read_all()? {
            match entry {
                WalEntry::Commit { writes, .. } => apply_writes(&mut entries, &writes),
            }
        }
        Ok(entries)
    }

    pub fn wal(&self) -> &WalManager {
        &self.wal
    }

    pub fn wal_mut(&mut self) -> &mut WalManager {
        &mut self.wal
    }

    pub fn snapshot(&self) -> &SnapshotManager {
        &self.snapshot
    }

    pub fn durability_mode(&self) -> DurabilityMode {
        self.durability_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put(key: &[u8], value: &[u8]) -> WriteOp {
        WriteOp {
            key: key.to_vec(),
            value: Some(value.to_vec()),
        }
    }

    #[test]
    fn test_wal_append_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut wal =
            WalManager::new(temp_dir.path().join("test.wal"), DurabilityMode::Sync).unwrap();
        wal.append(&WalEntry::Commit {
            transaction_id: 1,
            writes: vec![put(b"a", b"1")],
        })
        .unwrap();
        wal.append(&WalEntry::Commit {
            transaction_id: 2,
            writes: vec![WriteOp { key: b"a".to_vec(), value: None }],
        })
        .unwrap();
        assert_eq!(wal.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_torn_wal_tail_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");
        let mut wal = WalManager::new(&wal_path, DurabilityMode::Sync).unwrap();
        wal.append(&WalEntry::Commit {
            transaction_id: 1,
            writes: vec![put(b"a", b"1")],
        })
        .unwrap();
        drop(wal);

        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(&64_u32.to_le_bytes()).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        drop(file);

        let wal = WalManager::new(&wal_path, DurabilityMode::Sync).unwrap();
        assert_eq!(wal.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_checkpoint_clears_wal_and_recovery_combines_both() {
        let temp_dir = TempDir::new().unwrap();
        let mut persistence =
            PersistenceManager::new(temp_dir.path(), DurabilityMode::Sync).unwrap();
        persistence
            .log(&WalEntry::Commit {
                transaction_id: 1,
                writes: vec![put(b"a", b"1")],
            })
            .unwrap();
        assert_eq!(persistence.wal().entries_since_checkpoint(), 1);

        let mut map = StoreMap::new();
        map.insert(b"a".to_vec(), b"1".to_vec());
        persistence.checkpoint(&map).unwrap();
        assert_eq!(persistence.wal().entries_since_checkpoint(), 0);
        assert!(persistence.snapshot().exists());

        persistence
            .log(&WalEntry::Commit {
                transaction_id: 2,
                writes: vec![put(b"b", b"2")],
            })
            .unwrap();

        let recovered = persistence.recover().unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered.get(b"b".as_slice()), Some(&b"2".to_vec()));
    }

    #[test]
    fn test_in_memory_mode_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut persistence =
            PersistenceManager::new(temp_dir.path(), DurabilityMode::None).unwrap();
        persistence
            .log(&WalEntry::Commit {
                transaction_id: 1,
                writes: vec![put(b"a", b"1")],
            })
            .unwrap();
        assert!(persistence.recover().unwrap().is_empty());
    }
}
