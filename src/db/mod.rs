//! Keyed transactional state store.
//!
//! One ordered key-value map per partition, split into typed column families by
//! a two-byte key prefix. Committed state is an immutable `im::OrdMap`, so
//! taking a snapshot for a transaction or a read-only context is cheap.

pub mod column_family;
pub mod families;
pub mod key;
pub mod persistence;
pub mod transaction;
pub mod value;

pub use column_family::ColumnFamily;
pub use families::ColumnFamilies;
pub use key::DbKey;
pub use persistence::{DurabilityMode, StoreMap};
pub use transaction::{TransactionContext, TransactionId, TransactionState};
pub use value::{DbNil, DbValue};

use crate::core::Result;
use persistence::{PersistenceManager, WalEntry, WriteOp, apply_writes};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{Level, event};

struct DbInner {
    committed: RwLock<StoreMap>,
    persistence: Mutex<Option<PersistenceManager>>,
    next_transaction_id: AtomicU64,
}

/// Handle to one partition's store. Cloning shares the same store.
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

impl Db {
    pub fn in_memory() -> Self {
        Self::with_state(StoreMap::new(), None)
    }

    /// Opens (or creates) a store in `data_dir` and recovers it from snapshot + WAL.
    pub fn open<P: AsRef<Path>>(
        data_dir: P,
        durability_mode: DurabilityMode,
        checkpoint_threshold: usize,
    ) -> Result<Self> {
        let mut persistence = PersistenceManager::new(data_dir.as_ref(), durability_mode)?;
        persistence.wal_mut().set_checkpoint_threshold(checkpoint_threshold);
        let committed = persistence.recover()?;
        event!(
            Level::INFO,
            data_dir = %data_dir.as_ref().display(),
            entries = committed.len(),
            "recovered state store"
        );
        Ok(Self::with_state(committed, Some(persistence)))
    }

    fn with_state(committed: StoreMap, persistence: Option<PersistenceManager>) -> Self {
        Self {
            inner: Arc::new(DbInner {
                committed: RwLock::new(committed),
                persistence: Mutex::new(persistence),
                next_transaction_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn create_context(&self) -> Arc<TransactionContext> {
        Arc::new(TransactionContext::new(self.clone()))
    }

    pub fn create_read_only_context(&self) -> Arc<TransactionContext> {
        Arc::new(TransactionContext::read_only(self.clone()))
    }

    /// Writes a full snapshot and truncates the WAL.
    pub fn checkpoint(&self) -> Result<()> {
        let committed = self.committed()?;
        if let Some(persistence) = self.inner.persistence.lock()?.as_mut() {
            persistence.checkpoint(&committed)?;
            event!(Level::DEBUG, entries = committed.len(), "state checkpoint written");
        }
        Ok(())
    }

    /// Committed entries, including their column-family prefix.
    pub fn contents(&self) -> Result<StoreMap> {
        self.committed()
    }

    pub fn column_family_sizes(&self) -> Result<BTreeMap<ColumnFamilies, usize>> {
        let committed = self.committed()?;
        let mut sizes = BTreeMap::new();
        for key in committed.keys() {
            if key.len() < 2 {
                continue;
            }
            let id = u16::from_be_bytes([key[0], key[1]]);
            if let Some(family) = ColumnFamilies::from_id(id) {
                *sizes.entry(family).or_insert(0) += 1;
            }
        }
        Ok(sizes)
    }

    pub(crate) fn committed(&self) -> Result<StoreMap> {
        Ok(self.inner.committed.read()?.clone())
    }

    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        TransactionId(self.inner.next_transaction_id.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn apply_commit(&self, id: TransactionId, writes: Vec<WriteOp>) -> Result<()> {
        let mut persistence = self.inner.persistence.lock()?;
        if let Some(manager) = persistence.as_mut() {
            manager.log(&WalEntry::Commit {
                transaction_id: id.as_u64(),
                writes: writes.clone(),
            })?;
        }
        let snapshot = {
            let mut committed = self.inner.committed.write()?;
            apply_writes(&mut committed, &writes);
            committed.clone()
        };
        if let Some(manager) = persistence.as_mut() {
            if manager.needs_checkpoint() {
                manager.checkpoint(&snapshot)?;
                event!(
                    Level::DEBUG,
                    entries = snapshot.len(),
                    "automatic state checkpoint written"
                );
            }
        }
        Ok(())
    }
}
