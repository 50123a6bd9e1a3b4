// ============================================================================
// Transaction Context
// ============================================================================
//
// Every mutation of partition state happens inside a transaction that belongs
// to the processing of exactly one record.
//
// - A transaction reads the committed snapshot taken when it began, overlaid
//   with its own uncommitted writes.
// - Writes stay invisible to everybody else until commit.
// - Commit writes the write-set to the WAL first, then publishes it.
//
// A mutable context outside an explicit transaction runs each write in an
// implicit, immediately committed transaction. A read-only context always
// reads the latest committed snapshot and rejects writes.
//
// ============================================================================

use super::Db;
use super::persistence::{StoreMap, WriteOp};
use crate::core::{EngineError, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Unique identifier for a transaction, scoped to one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction lifecycle
///
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[derive(Debug)]
struct Transaction {
    id: TransactionId,
    state: TransactionState,
    /// Committed state as of `begin`.
    base: StoreMap,
    /// Uncommitted writes; `None` marks a delete.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Transaction {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(write) => write.clone(),
            None => self.base.get(key).cloned(),
        }
    }

    fn into_write_ops(self) -> Vec<WriteOp> {
        self.writes
            .into_iter()
            .map(|(key, value)| WriteOp { key, value })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextMode {
    Mutable,
    ReadOnly,
}

pub struct TransactionContext {
    db: Db,
    mode: ContextMode,
    current: Mutex<Option<Transaction>>,
}

impl TransactionContext {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            db,
            mode: ContextMode::Mutable,
            current: Mutex::new(None),
        }
    }

    pub(crate) fn read_only(db: Db) -> Self {
        Self {
            db,
            mode: ContextMode::ReadOnly,
            current: Mutex::new(None),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == ContextMode::ReadOnly
    }

    pub fn in_transaction(&self) -> Result<bool> {
        Ok(self
            .current
            .lock()?
            .as_ref()
            .is_some_and(|txn| txn.state.is_active()))
    }

    pub fn current_transaction_id(&self) -> Result<Option<TransactionId>> {
        Ok(self.current.lock()?.as_ref().map(|txn| txn.id))
    }

    pub fn begin(&self) -> Result<TransactionId> {
        if self.is_read_only() {
            return Err(EngineError::ReadOnly(
                "Cannot begin a transaction on a read-only context".to_string(),
            ));
        }
        let mut current = self.current.lock()?;
        if let Some(txn) = current.as_ref() {
            return Err(EngineError::Transaction(format!(
                "Expected no open transaction, but {} is {}",
                txn.id, txn.state
            )));
        }
        let id = self.db.next_transaction_id();
        *current = Some(Transaction {
            id,
            state: TransactionState::Active,
            base: self.db.committed()?,
            writes: BTreeMap::new(),
        });
        Ok(id)
    }

    pub fn commit(&self) -> Result<()> {
        let mut txn = self.take_active("commit")?;
        let id = txn.id;
        txn.state = TransactionState::Committed;
        if txn.writes.is_empty() {
            return Ok(());
        }
        self.db.apply_commit(id, txn.into_write_ops())
    }

    pub fn rollback(&self) -> Result<()> {
        let mut txn = self.take_active("rollback")?;
        txn.state = TransactionState::Aborted;
        Ok(())
    }

    /// Runs `operation` inside a transaction. Joins an already open transaction,
    /// otherwise begins one, commits on success and rolls back on error.
    pub fn run_in_transaction<T, E>(
        &self,
        operation: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<EngineError>,
    {
        if self.in_transaction()? {
            return operation();
        }
        self.begin()?;
        match operation() {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                self.rollback()?;
                Err(err)
            }
        }
    }

    fn take_active(&self, action: &str) -> Result<Transaction> {
        self.current.lock()?.take().ok_or_else(|| {
            EngineError::Transaction(format!(
                "Expected an open transaction to {}, but none exists",
                action
            ))
        })
    }

    // ------------------------------------------------------------------------
    // Raw access used by column families
    // ------------------------------------------------------------------------

    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.is_read_only() {
            if let Some(txn) = self.current.lock()?.as_ref() {
                return Ok(txn.get(key));
            }
        }
        Ok(self.db.committed()?.get(key).cloned())
    }

    pub(crate) fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.write(key, Some(value))
    }

    pub(crate) fn delete(&self, key: Vec<u8>) -> Result<()> {
        self.write(key, None)
    }

    fn write(&self, key: Vec<u8>, value: Option<Vec<u8>>) -> Result<()> {
        if self.is_read_only() {
            return Err(EngineError::ReadOnly(
                "Cannot write through a read-only context".to_string(),
            ));
        }
        {
            let mut current = self.current.lock()?;
            if let Some(txn) = current.as_mut() {
                txn.writes.insert(key, value);
                return Ok(());
            }
        }
        let id = self.db.next_transaction_id();
        self.db.apply_commit(id, vec![WriteOp { key, value }])
    }

    /// Entries whose key starts with `prefix`, in key order, as seen by this context.
    pub(crate) fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let current = if self.is_read_only() {
            None
        } else {
            self.current.lock()?.as_ref().map(|txn| (txn.base.clone(), txn.writes.clone()))
        };
        let (base, writes) = match current {
            Some(view) => view,
            None => (self.db.committed()?, BTreeMap::new()),
        };

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = base
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, write) in writes
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            match write {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncommitted_writes_are_isolated() {
        let db = Db::in_memory();
        let writer = db.create_context();
        let reader = db.create_read_only_context();

        writer.begin().unwrap();
        writer.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        assert_eq!(writer.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(reader.get(b"k").unwrap(), None);

        writer.commit().unwrap();
        assert_eq!(reader.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let db = Db::in_memory();
        let context = db.create_context();
        context.begin().unwrap();
        context.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        context.rollback().unwrap();
        assert_eq!(context.get(b"k").unwrap(), None);
        assert!(!context.in_transaction().unwrap());
    }

    #[test]
    fn test_run_in_transaction_rolls_back_on_error() {
        let db = Db::in_memory();
        let context = db.create_context();
        let result: Result<()> = context.run_in_transaction(|| {
            context.put(b"k".to_vec(), b"v".to_vec())?;
            Err(EngineError::illegal_state("boom"))
        });
        assert!(result.is_err());
        assert_eq!(context.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_write_outside_transaction_commits_immediately() {
        let db = Db::in_memory();
        let context = db.create_context();
        context.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        assert_eq!(db.contents().unwrap().len(), 1);
    }

    #[test]
    fn test_read_only_context_rejects_writes() {
        let db = Db::in_memory();
        let reader = db.create_read_only_context();
        assert!(matches!(reader.put(b"k".to_vec(), vec![]), Err(EngineError::ReadOnly(_))));
        assert!(matches!(reader.begin(), Err(EngineError::ReadOnly(_))));
    }

    #[test]
    fn test_scan_merges_overlay_in_key_order() {
        let db = Db::in_memory();
        let context = db.create_context();
        context.put(b"pa".to_vec(), b"1".to_vec()).unwrap();
        context.put(b"pc".to_vec(), b"3".to_vec()).unwrap();
        context.put(b"q".to_vec(), b"x".to_vec()).unwrap();

        context.begin().unwrap();
        context.put(b"pb".to_vec(), b"2".to_vec()).unwrap();
        context.delete(b"pc".to_vec()).unwrap();
        let keys: Vec<Vec<u8>> = context
            .scan_prefix(b"p")
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec![b"pa".to_vec(), b"pb".to_vec()]);
    }

    #[test]
    fn test_nested_begin_is_rejected() {
        let db = Db::in_memory();
        let context = db.create_context();
        context.begin().unwrap();
        assert!(matches!(context.begin(), Err(EngineError::Transaction(_))));
    }
}
