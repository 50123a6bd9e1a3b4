use super::families::ColumnFamilies;
use super::key::DbKey;
use super::transaction::TransactionContext;
use super::value::{DbValue, decode_value, encode_value};
use crate::core::{EngineError, Result};
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed view over one logical table of the shared store.
///
/// All reads and writes go through the owning [`TransactionContext`], so a
/// column family sees the uncommitted writes of the transaction that is
/// currently processing a record. Iteration always happens in encoded key order.
pub struct ColumnFamily<K, V> {
    family: ColumnFamilies,
    context: Arc<TransactionContext>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for ColumnFamily<K, V> {
    fn clone(&self) -> Self {
        Self {
            family: self.family,
            context: Arc::clone(&self.context),
            _marker: PhantomData,
        }
    }
}

impl<K: DbKey + Debug, V: DbValue> ColumnFamily<K, V> {
    pub fn new(context: Arc<TransactionContext>, family: ColumnFamilies) -> Self {
        Self {
            family,
            context,
            _marker: PhantomData,
        }
    }

    pub fn family(&self) -> ColumnFamilies {
        self.family
    }

    fn full_key(&self, key: &K) -> Vec<u8> {
        let mut buf = self.family.prefix().to_vec();
        key.write_key(&mut buf);
        buf
    }

    fn not_found(&self, key: &K) -> EngineError {
        EngineError::NotFound {
            column_family: self.family.name().to_string(),
            key: format!("{:?}", key),
        }
    }

    pub fn get(&self, key: &K) -> Result<Option<V>> {
        match self.context.get(&self.full_key(key))? {
            Some(bytes) => Ok(Some(decode_value(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn exists(&self, key: &K) -> Result<bool> {
        Ok(self.context.get(&self.full_key(key))?.is_some())
    }

    /// Fails with `KeyAlreadyExists` if the key is present.
    pub fn insert(&self, key: &K, value: &V) -> Result<()> {
        let full_key = self.full_key(key);
        if self.context.get(&full_key)?.is_some() {
            return Err(EngineError::KeyAlreadyExists {
                column_family: self.family.name().to_string(),
                key: format!("{:?}", key),
            });
        }
        self.context.put(full_key, encode_value(value)?)
    }

    /// Fails with `NotFound` if the key is absent.
    pub fn update(&self, key: &K, value: &V) -> Result<()> {
        let full_key = self.full_key(key);
        if self.context.get(&full_key)?.is_none() {
            return Err(self.not_found(key));
        }
        self.context.put(full_key, encode_value(value)?)
    }

    pub fn upsert(&self, key: &K, value: &V) -> Result<()> {
        self.context.put(self.full_key(key), encode_value(value)?)
    }

    /// Fails with `NotFound` if the key is absent; callers check `exists` when
    /// the delete is conditional.
    pub fn delete_existing(&self, key: &K) -> Result<()> {
        let full_key = self.full_key(key);
        if self.context.get(&full_key)?.is_none() {
            return Err(self.not_found(key));
        }
        self.context.delete(full_key)
    }

    pub fn delete_if_exists(&self, key: &K) -> Result<bool> {
        let full_key = self.full_key(key);
        if self.context.get(&full_key)?.is_none() {
            return Ok(false);
        }
        self.context.delete(full_key)?;
        Ok(true)
    }

    fn decode_entries(&self, raw: Vec<(Vec<u8>, Vec<u8>)>) -> Result<Vec<(K, V)>> {
        let prefix_len = self.family.prefix().len();
        raw.into_iter()
            .map(|(key, value)| Ok((K::from_key_bytes(&key[prefix_len..])?, decode_value(&value)?)))
            .collect()
    }

    /// All entries in key order.
    pub fn entries(&self) -> Result<Vec<(K, V)>> {
        let raw = self.context.scan_prefix(&self.family.prefix())?;
        self.decode_entries(raw)
    }

    /// All entries whose leading key components equal `prefix`, in key order.
    ///
    /// A byte prefix match is not enough: the encoding of `"a"` is also a byte
    /// prefix of `"a\0b"`. A candidate only matches if its leading component
    /// decodes to exactly the prefix bytes.
    pub fn entries_with_prefix<P: DbKey>(&self, prefix: &P) -> Result<Vec<(K, V)>> {
        let family_len = self.family.prefix().len();
        let mut full_prefix = self.family.prefix().to_vec();
        prefix.write_key(&mut full_prefix);
        let component_len = full_prefix.len() - family_len;

        let mut matching = Vec::new();
        for (key, value) in self.context.scan_prefix(&full_prefix)? {
            let (_, consumed) = P::read_key(&key[family_len..])?;
            if consumed == component_len {
                matching.push((key, value));
            }
        }
        self.decode_entries(matching)
    }

    pub fn for_each(&self, mut consumer: impl FnMut(K, V)) -> Result<()> {
        for (key, value) in self.entries()? {
            consumer(key, value);
        }
        Ok(())
    }

    /// Visits entries in key order until the visitor returns `false`.
    pub fn while_true(&self, mut visitor: impl FnMut(K, V) -> bool) -> Result<()> {
        for (key, value) in self.entries()? {
            if !visitor(key, value) {
                break;
            }
        }
        Ok(())
    }

    /// Visits entries sharing the key prefix in key order until the visitor returns `false`.
    pub fn while_equal_prefix<P: DbKey>(
        &self,
        prefix: &P,
        mut visitor: impl FnMut(K, V) -> bool,
    ) -> Result<()> {
        for (key, value) in self.entries_with_prefix(prefix)? {
            if !visitor(key, value) {
                break;
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.context.scan_prefix(&self.family.prefix())?.is_empty())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.context.scan_prefix(&self.family.prefix())?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Db, DbNil};

    fn family<K: DbKey + Debug, V: DbValue>(db: &Db, cf: ColumnFamilies) -> ColumnFamily<K, V> {
        ColumnFamily::new(db.create_context(), cf)
    }

    #[test]
    fn test_get_upsert_and_delete() {
        let db = Db::in_memory();
        let cf: ColumnFamily<i64, String> = family(&db, ColumnFamilies::Default);

        assert_eq!(cf.get(&1).unwrap(), None);
        cf.upsert(&1, &"one".to_string()).unwrap();
        assert_eq!(cf.get(&1).unwrap(), Some("one".to_string()));
        assert!(cf.exists(&1).unwrap());

        cf.delete_existing(&1).unwrap();
        assert!(!cf.exists(&1).unwrap());
    }

    #[test]
    fn test_delete_existing_on_missing_key_fails() {
        let db = Db::in_memory();
        let cf: ColumnFamily<i64, DbNil> = family(&db, ColumnFamilies::BannedInstance);
        let err = cf.delete_existing(&7).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
        assert!(!cf.delete_if_exists(&7).unwrap());
    }

    #[test]
    fn test_insert_and_update_guard_existence() {
        let db = Db::in_memory();
        let cf: ColumnFamily<i64, i64> = family(&db, ColumnFamilies::Default);
        assert!(matches!(cf.update(&1, &1), Err(EngineError::NotFound { .. })));
        cf.insert(&1, &1).unwrap();
        assert!(matches!(cf.insert(&1, &2), Err(EngineError::KeyAlreadyExists { .. })));
        cf.update(&1, &3).unwrap();
        assert_eq!(cf.get(&1).unwrap(), Some(3));
    }

    #[test]
    fn test_families_do_not_see_each_other() {
        let db = Db::in_memory();
        let context = db.create_context();
        let jobs: ColumnFamily<i64, i64> =
            ColumnFamily::new(Arc::clone(&context), ColumnFamilies::Jobs);
        let timers: ColumnFamily<i64, i64> = ColumnFamily::new(context, ColumnFamilies::Timers);
        jobs.upsert(&1, &10).unwrap();
        assert!(timers.is_empty().unwrap());
        assert_eq!(jobs.count().unwrap(), 1);
    }

    #[test]
    fn test_while_equal_prefix_visits_only_matching_keys_in_order() {
        let db = Db::in_memory();
        let cf: ColumnFamily<(String, i64), DbNil> =
            family(&db, ColumnFamilies::SignalSubscriptionByName);
        for (name, key) in [("b", 2), ("a", 3), ("a", 1), ("ab", 9)] {
            cf.upsert(&(name.to_string(), key), &DbNil).unwrap();
        }

        let mut visited = Vec::new();
        cf.while_equal_prefix(&"a".to_string(), |(_, key), _| {
            visited.push(key);
            true
        })
        .unwrap();
        assert_eq!(visited, vec![1, 3]);
    }

    #[test]
    fn test_prefix_scan_skips_names_with_embedded_nul() {
        let db = Db::in_memory();
        let cf: ColumnFamily<(String, i64), DbNil> =
            family(&db, ColumnFamilies::SignalSubscriptionByName);
        for (name, key) in [("a", 1), ("a\0b", 2), ("a\0", 3), ("a", 4)] {
            cf.upsert(&(name.to_string(), key), &DbNil).unwrap();
        }

        let keys = |name: &str| -> Vec<i64> {
            cf.entries_with_prefix(&name.to_string())
                .unwrap()
                .into_iter()
                .map(|((_, key), _)| key)
                .collect()
        };
        assert_eq!(keys("a"), vec![1, 4]);
        assert_eq!(keys("a\0"), vec![3]);
        assert_eq!(keys("a\0b"), vec![2]);
    }

    #[test]
    fn test_while_true_stops_early() {
        let db = Db::in_memory();
        let cf: ColumnFamily<i64, DbNil> = family(&db, ColumnFamilies::TimerDueDates);
        for due in [300, -5, 100, 200] {
            cf.upsert(&due, &DbNil).unwrap();
        }

        let mut visited = Vec::new();
        cf.while_true(|due, _| {
            if due > 150 {
                return false;
            }
            visited.push(due);
            true
        })
        .unwrap();
        assert_eq!(visited, vec![-5, 100]);
    }

    #[test]
    fn test_consumer_may_mutate_during_iteration() {
        let db = Db::in_memory();
        let cf: ColumnFamily<i64, i64> = family(&db, ColumnFamilies::Default);
        cf.upsert(&1, &1).unwrap();
        cf.upsert(&2, &2).unwrap();
        let mut deleted = 0;
        cf.for_each(|key, _| {
            if cf.delete_existing(&key).is_ok() {
                deleted += 1;
            }
        })
        .unwrap();
        assert_eq!(deleted, 2);
        assert!(cf.is_empty().unwrap());
    }
}
